use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("platform {key} not found")]
    NotFound { key: String },
    #[error("invalid platform url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
