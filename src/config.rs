use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str =
    "https://twtransfer.energytransfer.com/ipost/TW/capacity/operationally-available";
pub const DEFAULT_DUCKDB_PATH: &str = "energy_data.duckdb";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the ingest pipeline needs to know about the outside world.
#[derive(Debug, Clone)]
pub struct Config {
    /// Report endpoint, without query parameters
    pub endpoint: String,
    /// Pipeline asset identifier sent as `asset=`
    pub asset: String,
    /// Sent as `searchType=`
    pub search_type: String,
    pub duckdb_path: String,
    /// When set, every fetched payload is kept under `<archive_dir>/Raw/<year>/`
    pub archive_dir: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            asset: "TW".to_string(),
            search_type: "NOM".to_string(),
            duckdb_path: DEFAULT_DUCKDB_PATH.to_string(),
            archive_dir: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Build the configuration from `TW_*` environment variables, falling back
    /// to the defaults for anything unset.  Call `dotenvy::dotenv()` first if
    /// the variables live in a `.env` file.
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(endpoint) = lookup("TW_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(asset) = lookup("TW_ASSET") {
            config.asset = asset;
        }
        if let Some(search_type) = lookup("TW_SEARCH_TYPE") {
            config.search_type = search_type;
        }
        if let Some(path) = lookup("TW_DUCKDB_PATH") {
            config.duckdb_path = path;
        }
        config.archive_dir = lookup("TW_ARCHIVE_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);
        if let Some(secs) = lookup("TW_REQUEST_TIMEOUT_SECS") {
            let n = secs
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: "TW_REQUEST_TIMEOUT_SECS",
                    value: secs.clone(),
                    reason: e.to_string(),
                })?;
            config.request_timeout = Duration::from_secs(n);
        }
        Ok(config)
    }
}
