use crate::domains::export::types::{ExportConfig, DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_SIZE, DEFAULT_SINK_CAPACITY};
use crate::errors::{ServiceError, ServiceResult};
use crate::validation::Validate;
use log::debug;
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://uploads.db?mode=rwc";
pub const DEFAULT_LOCAL_STORAGE_PATH: &str = "./storage";

/// Where export documents are stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local {
        path: String,
        public_url: Option<String>,
    },
    Http {
        endpoint: String,
        bucket: String,
        access_token: Option<String>,
        public_url: Option<String>,
    },
}

/// Process configuration, read from the environment (and `.env` when present)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub storage: StorageBackend,
    pub export: ExportConfig,
}

impl Config {
    /// Load `.env` if there is one, then read the process environment.
    pub fn from_env() -> ServiceResult<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ServiceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = get("STORAGE_BACKEND").unwrap_or_else(|| "local".to_string());
        let public_url = get("STORAGE_PUBLIC_URL");
        let storage = match backend.to_ascii_lowercase().as_str() {
            "local" => StorageBackend::Local {
                path: get("LOCAL_STORAGE_PATH").unwrap_or_else(|| DEFAULT_LOCAL_STORAGE_PATH.to_string()),
                public_url,
            },
            "http" => StorageBackend::Http {
                endpoint: get("STORAGE_ENDPOINT").ok_or_else(|| missing("STORAGE_ENDPOINT"))?,
                bucket: get("STORAGE_BUCKET").ok_or_else(|| missing("STORAGE_BUCKET"))?,
                access_token: get("STORAGE_ACCESS_TOKEN"),
                public_url,
            },
            other => {
                return Err(ServiceError::Configuration(format!(
                    "STORAGE_BACKEND must be local or http, got {:?}",
                    other
                )))
            }
        };

        let export = ExportConfig {
            batch_size: parse_or(get("EXPORT_BATCH_SIZE"), "EXPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            chunk_size: parse_or(get("EXPORT_CHUNK_SIZE"), "EXPORT_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            sink_capacity: parse_or(get("EXPORT_SINK_CAPACITY"), "EXPORT_SINK_CAPACITY", DEFAULT_SINK_CAPACITY)?,
        };
        export
            .validate()
            .map_err(|e| ServiceError::Configuration(format!("Invalid export settings: {}", e)))?;

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            storage,
            export,
        })
    }
}

fn missing(key: &str) -> ServiceError {
    ServiceError::Configuration(format!("{} is required for the http storage backend", key))
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> ServiceResult<T> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| ServiceError::Configuration(format!("{} is not a valid number: {:?}", key, raw))),
        None => Ok(default),
    }
}
