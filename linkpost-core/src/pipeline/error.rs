use thiserror::Error;

use crate::registry::RegistryError;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("session store error: {0}")]
    Session(#[from] SessionError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("session {0} is not running in this process")]
    UnknownSession(String),
    #[error("session worker for {session_id} ended abnormally: {reason}")]
    Worker { session_id: String, reason: String },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
