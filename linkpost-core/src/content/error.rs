use std::time::Duration;

use thiserror::Error;

use super::validate::Rejection;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider returned no text")]
    Empty,
    #[error("environment variable {env} holding the api key is not set")]
    MissingKey { env: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("circuit open")]
    CircuitOpen,
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("provider {provider} failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },
    #[error("provider {provider} output rejected: {reason}")]
    Rejected { provider: String, reason: Rejection },
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
pub type ContentResult<T> = std::result::Result<T, ContentError>;
