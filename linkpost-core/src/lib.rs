pub mod browser;
pub mod config;
pub mod content;
pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod posting;
pub mod registry;
pub mod session;
mod sqlite;

pub use config::{load_pipeline_config, BrowserConfig, PipelineConfig};
pub use error::{ConfigError, Result};
pub use pipeline::{Pipeline, PipelineError, PipelineResult, PlatformGate, SessionRunner};
pub use registry::{
    Platform, PlatformCandidate, PlatformCategory, PlatformRegistry, SelectionCriteria,
    SelectionOutcome, SqlitePlatformStore,
};
pub use session::{
    AttemptOutcome, Campaign, PlatformCriteria, PostingAttempt, Session, SessionReport,
    SessionStatus, SessionTracker, SqliteSessionStore,
};
