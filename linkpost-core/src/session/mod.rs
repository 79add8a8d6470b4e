pub mod error;
pub mod models;
pub mod store;
pub mod tracker;

pub use error::{SessionError, SessionResult};
pub use models::{
    AttemptOutcome, Campaign, PlatformCriteria, PosterIdentity, PostingAttempt, Session,
    SessionReport, SessionStatus, Termination,
};
pub use store::{SqliteSessionStore, SqliteSessionStoreBuilder, Transition};
pub use tracker::SessionTracker;
