use std::path::PathBuf;

use thiserror::Error;

use crate::browser::BrowserError;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("failed to read seed list {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse seed list {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("unsupported seed list format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;
