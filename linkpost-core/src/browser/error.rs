use std::time::Duration;

use chromiumoxide::error::CdpError;
use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

/// Failures raised while driving a page. None of them are retried here;
/// callers turn them into attempt outcomes.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("could not start chromium: {0}")]
    Launch(String),
    #[error("devtools protocol: {0}")]
    Cdp(#[from] CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },
    #[error("invalid browser configuration: {0}")]
    Configuration(String),
    #[error("profile error: {0}")]
    Profile(String),
    #[error("no element matches {0}")]
    ElementNotFound(String),
    #[error("page error: {0}")]
    Page(String),
}

impl BrowserError {
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        BrowserError::Timeout {
            what: what.into(),
            after,
        }
    }
}

impl From<tokio::task::JoinError> for BrowserError {
    fn from(err: tokio::task::JoinError) -> Self {
        BrowserError::Page(format!("browser task failed: {err}"))
    }
}
