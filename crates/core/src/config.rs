//! Environment-driven configuration for the gateway
//!
//! Configuration is read once at startup from the process environment (with
//! optional `.env` support via `dotenvy`). Startup aborts only when a
//! required value is missing or fails validation; every optional value has a
//! default.
//!
//! # Environment variables
//!
//! - `DATABASE_URL` (required): PostgreSQL connection URL
//! - `CACHE_URL` (required): Redis connection URL
//! - `METADATA_API_KEY` (required): API key for the metadata provider
//! - `INDEX_DIR` (optional): directory for vector index files (default: `./index`)
//! - `HOST` / `PORT` (optional): HTTP bind address (default: `0.0.0.0:8000`)
//! - `SCHEDULE_HOUR` / `SCHEDULE_MINUTE` (optional): daily job fire time (default: 03:00)
//! - `SCHEDULE_MOVIE_BATCH_PAGES` / `SCHEDULE_TV_BATCH_PAGES` (optional): ingestion batch sizes (default: 25)
//! - `ENABLE_SCHEDULER` (optional): `true` to run the daily jobs (default: `false`)
//! - `EMBEDDING_MODEL_PATH` (optional): ONNX encoder model path (default: `models/minilm-384.onnx`)

use crate::error::GatewayError;
use std::path::PathBuf;
use url::Url;

/// Load a `.env` file if one is present. Safe to call multiple times.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn required(name: &str) -> Result<String, GatewayError> {
    std::env::var(name).map_err(|_| GatewayError::Configuration(format!("{} must be set", name)))
}

fn optional_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, GatewayError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| GatewayError::Configuration(format!("{} is not a valid value", name))),
        Err(_) => Ok(default),
    }
}

/// Daily scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
    pub movie_batch_pages: u32,
    pub tv_batch_pages: u32,
}

/// Top-level gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub database_url: String,
    pub cache_url: String,
    pub metadata_api_key: String,
    pub index_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub embedding_model_path: PathBuf,
    pub scheduler: SchedulerConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        let config = Self {
            database_url: required("DATABASE_URL")?,
            cache_url: required("CACHE_URL")?,
            metadata_api_key: required("METADATA_API_KEY")?,
            index_dir: PathBuf::from(
                std::env::var("INDEX_DIR").unwrap_or_else(|_| "./index".to_string()),
            ),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: optional_parsed("PORT", 8000u16)?,
            embedding_model_path: PathBuf::from(
                std::env::var("EMBEDDING_MODEL_PATH")
                    .unwrap_or_else(|_| "models/minilm-384.onnx".to_string()),
            ),
            scheduler: SchedulerConfig {
                enabled: std::env::var("ENABLE_SCHEDULER")
                    .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                    .unwrap_or(false),
                hour: optional_parsed("SCHEDULE_HOUR", 3u32)?,
                minute: optional_parsed("SCHEDULE_MINUTE", 0u32)?,
                movie_batch_pages: optional_parsed("SCHEDULE_MOVIE_BATCH_PAGES", 25u32)?,
                tv_batch_pages: optional_parsed("SCHEDULE_TV_BATCH_PAGES", 25u32)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        Url::parse(&self.database_url)
            .map_err(|_| GatewayError::Configuration("DATABASE_URL is not a valid URL".into()))?;
        Url::parse(&self.cache_url)
            .map_err(|_| GatewayError::Configuration("CACHE_URL is not a valid URL".into()))?;

        if self.metadata_api_key.trim().is_empty() {
            return Err(GatewayError::Configuration(
                "METADATA_API_KEY must not be empty".into(),
            ));
        }
        if self.scheduler.hour > 23 {
            return Err(GatewayError::Configuration(
                "SCHEDULE_HOUR must be in 0..=23".into(),
            ));
        }
        if self.scheduler.minute > 59 {
            return Err(GatewayError::Configuration(
                "SCHEDULE_MINUTE must be in 0..=59".into(),
            ));
        }
        if self.scheduler.movie_batch_pages == 0 || self.scheduler.tv_batch_pages == 0 {
            return Err(GatewayError::Configuration(
                "SCHEDULE_*_BATCH_PAGES must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> GatewayConfig {
        GatewayConfig {
            database_url: "postgresql://localhost/mood_gateway".into(),
            cache_url: "redis://localhost:6379".into(),
            metadata_api_key: "test-key".into(),
            index_dir: PathBuf::from("./index"),
            host: "0.0.0.0".into(),
            port: 8000,
            embedding_model_path: PathBuf::from("models/minilm-384.onnx"),
            scheduler: SchedulerConfig {
                enabled: false,
                hour: 3,
                minute: 0,
                movie_batch_pages: 25,
                tv_batch_pages: 25,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_urls_rejected() {
        let mut config = base_config();
        config.database_url = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.cache_url = "".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_schedule_bounds() {
        let mut config = base_config();
        config.scheduler.hour = 24;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.scheduler.minute = 60;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.scheduler.movie_batch_pages = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let mut config = base_config();
        config.metadata_api_key = "  ".into();
        assert!(config.validate().is_err());
    }
}
