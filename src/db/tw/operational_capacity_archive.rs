use std::{collections::HashSet, time::Duration};

use duckdb::{params, params_from_iter, types::Type, AccessMode, Connection};
use jiff::civil::Date;
use log::info;
use thiserror::Error;

use crate::utils::lib_duckdb::open_with_retry;

use super::transform::Row;

pub const TABLE_NAME: &str = "operational_capacity";

const CREATE_TABLE_SQL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS operational_capacity_id_seq;

CREATE TABLE IF NOT EXISTS operational_capacity (
    id BIGINT DEFAULT nextval('operational_capacity_id_seq'),
    post_date DATE NOT NULL,
    effective_date DATE NOT NULL,
    loc VARCHAR NOT NULL,
    loc_zn VARCHAR NOT NULL,
    loc_name VARCHAR,
    loc_purp_desc VARCHAR,
    loc_qti DOUBLE,
    flow_ind VARCHAR,
    dc VARCHAR,
    opc VARCHAR,
    tsq DOUBLE,
    oac DOUBLE,
    it VARCHAR,
    auth_overrun_ind VARCHAR,
    nom_cap_exceed_ind VARCHAR,
    all_qty_avail VARCHAR,
    qty_reason VARCHAR,
    created_at TIMESTAMP DEFAULT current_timestamp,
    PRIMARY KEY (effective_date, loc)
);
"#;

// Rows whose (effective_date, loc) already exist are dropped by the primary key.
const INSERT_SQL: &str = r#"
INSERT OR IGNORE INTO operational_capacity (
    post_date, effective_date, loc, loc_zn, loc_name, loc_purp_desc, loc_qti,
    flow_ind, dc, opc, tsq, oac, it, auth_overrun_ind, nom_cap_exceed_ind,
    all_qty_avail, qty_reason
) VALUES (
    CAST(? AS DATE), CAST(? AS DATE), ?, ?, ?, ?, ?,
    ?, ?, ?, ?, ?, ?, ?, ?,
    ?, ?
);
"#;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: duckdb::Error },
    #[error("failed to create table operational_capacity: {0}")]
    Schema(duckdb::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
}

#[derive(Debug, Default)]
pub struct QueryCapacity {
    pub loc: Option<String>,
    pub loc_zn: Option<String>,
    pub effective_date_gte: Option<Date>,
    pub effective_date_lte: Option<Date>,
}

#[derive(Default)]
pub struct QueryCapacityBuilder {
    inner: QueryCapacity,
}

impl QueryCapacityBuilder {
    pub fn new() -> Self {
        Self {
            inner: QueryCapacity::default(),
        }
    }

    pub fn loc<S: Into<String>>(mut self, loc: S) -> Self {
        self.inner.loc = Some(loc.into());
        self
    }

    pub fn loc_zn<S: Into<String>>(mut self, zone: S) -> Self {
        self.inner.loc_zn = Some(zone.into());
        self
    }

    pub fn effective_date(mut self, date: Date) -> Self {
        self.inner.effective_date_gte = Some(date);
        self.inner.effective_date_lte = Some(date);
        self
    }

    pub fn effective_date_gte(mut self, date: Date) -> Self {
        self.inner.effective_date_gte = Some(date);
        self
    }

    pub fn effective_date_lte(mut self, date: Date) -> Self {
        self.inner.effective_date_lte = Some(date);
        self
    }

    pub fn build(self) -> QueryCapacity {
        self.inner
    }
}

#[derive(Clone)]
pub struct OperationalCapacityArchive {
    pub duckdb_path: String,
}

impl OperationalCapacityArchive {
    /// Open the DuckDB file for writing.  Waits a little if another process
    /// holds the lock.
    pub fn connect(&self) -> Result<Connection, duckdb::Error> {
        open_with_retry(
            &self.duckdb_path,
            8,
            Duration::from_millis(25),
            AccessMode::ReadWrite,
        )
    }

    /// Same as [`OperationalCapacityArchive::connect`], for the start of a run
    /// where not being able to open the file is fatal.
    pub fn open(&self) -> Result<Connection, SetupError> {
        self.connect().map_err(|source| SetupError::Open {
            path: self.duckdb_path.clone(),
            source,
        })
    }

    /// Create the table if it doesn't exist.  Safe to call on every run.
    pub fn setup(&self, conn: &Connection) -> Result<(), SetupError> {
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(SetupError::Schema)?;
        info!("DuckDB table {} setup completed", TABLE_NAME);
        Ok(())
    }

    pub fn count_rows(&self, conn: &Connection) -> Result<usize, StoreError> {
        let n: i64 = conn.query_row(
            &format!("SELECT count(*) FROM {}", TABLE_NAME),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Insert the rows whose natural key `(effective_date, loc)` is not in the
    /// table yet.  Return the number of rows actually inserted.
    pub fn insert_rows(&self, conn: &mut Connection, rows: &[Row]) -> Result<usize, StoreError> {
        let mut seen: HashSet<(Date, &str)> = HashSet::new();
        let tx = conn.transaction()?;
        let before = self.count_rows(&tx)?;
        {
            let mut stmt = tx.prepare(INSERT_SQL)?;
            for row in rows {
                if !seen.insert((row.effective_date, row.loc.as_str())) {
                    continue;
                }
                stmt.execute(params![
                    row.post_date.to_string(),
                    row.effective_date.to_string(),
                    row.loc,
                    row.loc_zn,
                    row.loc_name,
                    row.loc_purp_desc,
                    row.loc_qti,
                    row.flow_ind,
                    row.dc,
                    row.opc,
                    row.tsq,
                    row.oac,
                    row.it,
                    row.auth_overrun_ind,
                    row.nom_cap_exceed_ind,
                    row.all_qty_avail,
                    row.qty_reason,
                ])?;
            }
        }
        let inserted = self.count_rows(&tx)? - before;
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get_data(&self, conn: &Connection, query: QueryCapacity) -> Result<Vec<Row>, StoreError> {
        let mut sql = String::from(
            r#"
SELECT
    post_date::VARCHAR, effective_date::VARCHAR, loc, loc_zn, loc_name,
    loc_purp_desc, loc_qti, flow_ind, dc, opc, tsq, oac, it, auth_overrun_ind,
    nom_cap_exceed_ind, all_qty_avail, qty_reason
FROM operational_capacity
WHERE 1=1"#,
        );
        let mut values: Vec<String> = Vec::new();
        if let Some(loc) = query.loc {
            sql.push_str(" AND loc = ?");
            values.push(loc);
        }
        if let Some(zone) = query.loc_zn {
            sql.push_str(" AND loc_zn = ?");
            values.push(zone);
        }
        if let Some(gte) = query.effective_date_gte {
            sql.push_str(" AND effective_date >= CAST(? AS DATE)");
            values.push(gte.to_string());
        }
        if let Some(lte) = query.effective_date_lte {
            sql.push_str(" AND effective_date <= CAST(? AS DATE)");
            values.push(lte.to_string());
        }
        sql.push_str("\nORDER BY effective_date, loc;");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(Row {
                    post_date: parse_date(0, row.get::<usize, String>(0)?)?,
                    effective_date: parse_date(1, row.get::<usize, String>(1)?)?,
                    loc: row.get::<usize, String>(2)?,
                    loc_zn: row.get::<usize, String>(3)?,
                    loc_name: row.get::<usize, Option<String>>(4)?,
                    loc_purp_desc: row.get::<usize, Option<String>>(5)?,
                    loc_qti: row.get::<usize, Option<f64>>(6)?,
                    flow_ind: row.get::<usize, Option<String>>(7)?,
                    dc: row.get::<usize, Option<String>>(8)?,
                    opc: row.get::<usize, Option<String>>(9)?,
                    tsq: row.get::<usize, Option<f64>>(10)?,
                    oac: row.get::<usize, Option<f64>>(11)?,
                    it: row.get::<usize, Option<String>>(12)?,
                    auth_overrun_ind: row.get::<usize, Option<String>>(13)?,
                    nom_cap_exceed_ind: row.get::<usize, Option<String>>(14)?,
                    all_qty_avail: row.get::<usize, Option<String>>(15)?,
                    qty_reason: row.get::<usize, Option<String>>(16)?,
                })
            })?
            .collect::<Result<Vec<Row>, duckdb::Error>>()?;
        Ok(rows)
    }
}

fn parse_date(idx: usize, value: String) -> Result<Date, duckdb::Error> {
    value
        .parse::<Date>()
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
