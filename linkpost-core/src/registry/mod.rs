pub mod error;
pub mod models;
pub mod selection;
pub mod service;
pub mod store;

pub use error::{RegistryError, RegistryResult};
pub use models::{
    platform_key, updated_success_rate, AutomationMechanism, Capabilities, Difficulty, Platform,
    PlatformCandidate, PlatformCategory, PlatformFilter, PlatformTrust, RegistryStats,
    SelectionCriteria, SelectionOutcome, UpsertOutcome,
};
pub use service::{KeyLocks, PlatformRegistry};
pub use store::{OutcomeUpdate, SqlitePlatformStore, SqlitePlatformStoreBuilder};
