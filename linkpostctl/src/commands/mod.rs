pub mod campaign;
pub mod discover;
pub mod platform;
pub mod session;

pub use campaign::{CampaignCommands, CampaignCreateArgs};
pub use discover::DiscoverArgs;
pub use platform::{PlatformCommands, PlatformListArgs};
pub use session::{SessionCommands, SessionRunArgs};
