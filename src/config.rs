use std::env;
use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_TOP_N: usize = 50;

/// Settings for a batch run, read from `.env` and the process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct OfiConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub top_n: usize,
    pub log_level: String,
}

impl OfiConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("OFI_DATA_DIR").unwrap_or_else(|| "data".to_string());
        let output_dir = lookup("OFI_OUTPUT_DIR").unwrap_or_else(|| "outputs/ofi".to_string());
        let top_n = match lookup("OFI_TOP_N") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidTopN { value })?,
            None => DEFAULT_TOP_N,
        };
        let log_level = lookup("OFI_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            output_dir: PathBuf::from(output_dir),
            top_n,
            log_level,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OFI_TOP_N must be a non-negative integer, got '{value}'")]
    InvalidTopN { value: String },
}
