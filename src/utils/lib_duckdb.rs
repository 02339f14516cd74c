use std::time::Duration;

use duckdb::{AccessMode, Config, Connection};
use log::warn;

/// Open a DuckDB file, waiting for another process to release its lock.
/// The wait doubles after each failed attempt.
/// Suggested `max_attempts = 8`, `initial_wait = Duration::from_millis(25)`.
pub fn open_with_retry(
    duckdb_path: &str,
    max_attempts: u32,
    initial_wait: Duration,
    access_mode: AccessMode,
) -> Result<Connection, duckdb::Error> {
    let mut attempts = 0;
    let mut wait_duration = initial_wait;

    loop {
        // `AccessMode` does not implement `Clone`; copy it variant by variant.
        let mode = match access_mode {
            AccessMode::Automatic => AccessMode::Automatic,
            AccessMode::ReadOnly => AccessMode::ReadOnly,
            AccessMode::ReadWrite => AccessMode::ReadWrite,
        };
        let config = Config::default().access_mode(mode)?;
        match Connection::open_with_flags(duckdb_path, config) {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                attempts += 1;
                if attempts >= max_attempts {
                    return Err(e);
                }
                warn!(
                    "Failed to open {} ({}), retrying in {:?} (attempt {}/{})",
                    duckdb_path, e, wait_duration, attempts, max_attempts
                );
                std::thread::sleep(wait_duration);
                wait_duration *= 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn open_new_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test.duckdb");
        let conn = open_with_retry(
            path.to_str().ok_or("bad path")?,
            3,
            Duration::from_millis(5),
            AccessMode::ReadWrite,
        )?;
        let n: i64 = conn.query_row("SELECT 40 + 2", [], |row| row.get(0))?;
        assert_eq!(n, 42);
        Ok(())
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let res = open_with_retry(
            "/nonexistent/dir/test.duckdb",
            2,
            Duration::from_millis(1),
            AccessMode::ReadWrite,
        );
        assert!(res.is_err());
    }
}
