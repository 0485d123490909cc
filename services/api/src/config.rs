//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub blob_dir: PathBuf,
    /// Prefix for the content URLs handed to the browser viewer.
    pub public_base_url: String,
    pub cors_origin: String,
    pub max_upload_bytes: usize,
    /// `None` writes the reading position on every page change.
    pub progress_debounce: Option<Duration>,
}

const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let blob_dir = lookup("BLOB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/blobs"));

        let public_base_url = lookup("PUBLIC_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(raw) => raw.parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue("MAX_UPLOAD_BYTES".to_string(), e.to_string())
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let debounce_ms = match lookup("PROGRESS_DEBOUNCE_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("PROGRESS_DEBOUNCE_MS".to_string(), e.to_string())
            })?,
            None => 0,
        };
        let progress_debounce = (debounce_ms > 0).then(|| Duration::from_millis(debounce_ms));

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            blob_dir,
            public_base_url,
            cors_origin,
            max_upload_bytes,
            progress_debounce,
        })
    }
}
