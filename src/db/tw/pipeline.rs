// Run the download -> validate -> load chain for a trailing window of days.

use jiff::{
    civil::{Date, DateTime},
    ToSpan, Zoned,
};
use log::{error, info, warn};
use thiserror::Error;

use crate::config::Config;

use super::{
    lib_ipost::{FetchError, FetchReport, HttpFetcher},
    operational_capacity_archive::{OperationalCapacityArchive, SetupError, StoreError},
    raw_table::{parse_csv, ParseError},
    transform::{transform, TransformError},
    validate::{validate, ValidationFailure, EFFECTIVE_DATE, POST_DATE},
};

/// Why a day was skipped.
#[derive(Error, Debug)]
pub enum DayError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("insert failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Parse,
    Validate,
    Transform,
    Store,
}

impl DayError {
    pub fn stage(&self) -> Stage {
        match self {
            DayError::Fetch(_) => Stage::Fetch,
            DayError::Parse(_) => Stage::Parse,
            DayError::Validation(_) => Stage::Validate,
            DayError::Transform(_) => Stage::Transform,
            DayError::Store(_) => Stage::Store,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    SetupCompleted,
    DayStarted { day: Date },
    Fetched { day: Date, bytes: usize },
    Parsed { day: Date, rows: usize, skipped: usize },
    Validated { day: Date },
    DayCompleted { day: Date, rows: usize, inserted: usize },
    DaySkipped { day: Date, stage: Stage, reason: String },
    RunFinished { days: usize, failed: usize, inserted: usize },
}

/// Receives progress events from the pipeline.
pub trait PipelineObserver {
    fn on_event(&mut self, event: &PipelineEvent);
}

/// Write the pipeline events to the `log` facade.
#[derive(Debug, Default)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn on_event(&mut self, event: &PipelineEvent) {
        use PipelineEvent::*;
        match event {
            SetupCompleted => info!("Storage ready"),
            DayStarted { day } => info!("Processing data for {}", day),
            Fetched { day, bytes } => info!("Downloaded {} bytes for {}", bytes, day),
            Parsed { day, rows, skipped } => {
                info!("Parsed {} rows for {}", rows, day);
                if *skipped > 0 {
                    warn!("Skipped {} malformed lines for {}", skipped, day);
                }
            }
            Validated { day } => info!("Validation passed for {}", day),
            DayCompleted { day, rows, inserted } => {
                info!("Inserted {} new records out of {} for {}", inserted, rows, day)
            }
            DaySkipped { day, stage, reason } => {
                error!("Error processing data for {} at {:?}: {}", day, stage, reason)
            }
            RunFinished {
                days,
                failed,
                inserted,
            } => info!(
                "Processed {} days, {} failed, {} new records",
                days, failed, inserted
            ),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub days: Vec<(Date, Result<usize, DayError>)>,
}

impl RunSummary {
    pub fn inserted(&self) -> usize {
        self.days
            .iter()
            .filter_map(|(_, res)| res.as_ref().ok())
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.days.iter().filter(|(_, res)| res.is_err()).count()
    }
}

pub struct Pipeline<F: FetchReport, O: PipelineObserver> {
    pub archive: OperationalCapacityArchive,
    pub fetcher: F,
    pub observer: O,
}

impl Pipeline<HttpFetcher, LogObserver> {
    /// The production pipeline: http downloads, events go to the log.
    /// Fails only if the http client can't be built.
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Ok(Pipeline {
            archive: OperationalCapacityArchive {
                duckdb_path: config.duckdb_path.clone(),
            },
            fetcher: HttpFetcher::new(config)?,
            observer: LogObserver,
        })
    }
}

impl<F: FetchReport, O: PipelineObserver> Pipeline<F, O> {
    pub fn new(config: &Config, fetcher: F, observer: O) -> Self {
        Pipeline {
            archive: OperationalCapacityArchive {
                duckdb_path: config.duckdb_path.clone(),
            },
            fetcher,
            observer,
        }
    }

    /// Process today and the `days - 1` days before it.
    pub fn run(&mut self, days: u32) -> Result<RunSummary, SetupError> {
        self.run_at(Zoned::now().datetime(), days)
    }

    /// Same as [`Pipeline::run`] with an explicit processing time.
    ///
    /// The DuckDB file is only held while a day is being inserted, so another
    /// job can use it while this one is waiting on a download.
    pub fn run_at(&mut self, now: DateTime, days: u32) -> Result<RunSummary, SetupError> {
        {
            let conn = self.archive.open()?;
            self.archive.setup(&conn)?;
        }
        self.observer.on_event(&PipelineEvent::SetupCompleted);

        let mut summary = RunSummary { days: Vec::new() };
        for days_ago in 0..days {
            let day = match now.date().checked_sub(i64::from(days_ago).days()) {
                Ok(day) => day,
                Err(e) => {
                    error!("Can't go back {} days from {}: {}", days_ago, now, e);
                    break;
                }
            };
            self.observer.on_event(&PipelineEvent::DayStarted { day });
            let res = self.process_day(now, day);
            if let Err(e) = &res {
                self.observer.on_event(&PipelineEvent::DaySkipped {
                    day,
                    stage: e.stage(),
                    reason: e.to_string(),
                });
            }
            summary.days.push((day, res));
        }

        self.observer.on_event(&PipelineEvent::RunFinished {
            days: summary.days.len(),
            failed: summary.failed(),
            inserted: summary.inserted(),
        });
        Ok(summary)
    }

    /// Run all the stages for one gas day and return the number of new rows.
    pub fn process_day(&mut self, now: DateTime, day: Date) -> Result<usize, DayError> {
        let body = self.fetcher.fetch(day)?;
        self.observer.on_event(&PipelineEvent::Fetched {
            day,
            bytes: body.len(),
        });

        let mut table = parse_csv(&body)?;
        self.observer.on_event(&PipelineEvent::Parsed {
            day,
            rows: table.len(),
            skipped: table.skipped,
        });

        table.stamp(POST_DATE, &now.strftime("%Y-%m-%dT%H:%M:%S").to_string());
        table.stamp(EFFECTIVE_DATE, &day.to_string());
        validate(&table)?;
        self.observer.on_event(&PipelineEvent::Validated { day });

        let rows = transform(&table)?;
        let mut conn = self.archive.connect().map_err(StoreError::from)?;
        let inserted = self.archive.insert_rows(&mut conn, &rows)?;
        self.observer.on_event(&PipelineEvent::DayCompleted {
            day,
            rows: rows.len(),
            inserted,
        });
        Ok(inserted)
    }
}
