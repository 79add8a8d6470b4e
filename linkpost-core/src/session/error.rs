use std::path::PathBuf;

use thiserror::Error;

use super::models::SessionStatus;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("session {session_id} not found")]
    NotFound { session_id: String },
    #[error("campaign {campaign_id} not found")]
    CampaignNotFound { campaign_id: String },
    #[error("session {session_id} progress cannot move from {current}% back to {requested}%")]
    ProgressRegression {
        session_id: String,
        current: u8,
        requested: u8,
    },
    #[error("progress {0}% is outside 0..=100")]
    ProgressOutOfRange(u8),
    #[error("session {session_id} is {status}, not running")]
    NotRunning {
        session_id: String,
        status: SessionStatus,
    },
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
