// Download the daily operationally available capacity report from the
// Energy Transfer iPost portal.

use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};
use jiff::civil::Date;
use log::info;
use reqwest::{
    blocking::Client,
    header::{ACCEPT, USER_AGENT},
    StatusCode,
};
use thiserror::Error;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("download failed with status {0}")]
    Status(StatusCode),
    #[error("failed to archive raw file {path:?}: {source}")]
    Archive { path: PathBuf, source: io::Error },
}

/// Source of the raw CSV report for one gas day.
pub trait FetchReport {
    fn fetch(&self, day: Date) -> Result<Vec<u8>, FetchError>;
}

/// Query parameters the portal expects for one gas day.
pub fn query_params(day: Date, asset: &str, search_type: &str) -> Vec<(&'static str, String)> {
    vec![
        ("f", "csv".to_string()),
        ("extension", "csv".to_string()),
        ("asset", asset.to_string()),
        ("gasDay", day.strftime("%m/%d/%Y").to_string()),
        ("searchType", search_type.to_string()),
    ]
}

/// Path of the archived raw file for a day.  Does not check if the file exists.
pub fn archive_filename(archive_dir: &Path, day: Date) -> PathBuf {
    archive_dir
        .join("Raw")
        .join(day.year().to_string())
        .join(format!("oac_{}.csv.gz", day))
}

pub struct HttpFetcher {
    client: Client,
    endpoint: String,
    asset: String,
    search_type: String,
    archive_dir: Option<PathBuf>,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<HttpFetcher, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(HttpFetcher::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &Config) -> HttpFetcher {
        HttpFetcher {
            client,
            endpoint: config.endpoint.clone(),
            asset: config.asset.clone(),
            search_type: config.search_type.clone(),
            archive_dir: config.archive_dir.clone(),
        }
    }

    fn archive(&self, day: Date, body: &[u8]) -> Result<(), FetchError> {
        let Some(dir) = &self.archive_dir else {
            return Ok(());
        };
        let path = archive_filename(dir, day);
        write_gz(&path, body).map_err(|source| FetchError::Archive {
            path: path.clone(),
            source,
        })?;
        info!("Archived raw file {}", path.display());
        Ok(())
    }
}

impl FetchReport for HttpFetcher {
    fn fetch(&self, day: Date) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&query_params(day, &self.asset, &self.search_type))
            .header(USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36")
            .header(ACCEPT, "text/csv,*/*")
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = response.bytes()?.to_vec();
        self.archive(day, &body)?;
        Ok(body)
    }
}

fn write_gz(path: &Path, body: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut encoder = GzEncoder::new(File::create(path)?, Compression::default());
    encoder.write_all(body)?;
    encoder.finish()?.flush()
}
