mod automation;
mod error;
mod human;
mod metrics;
mod page;
mod profile;

pub use automation::{BrowserLauncher, ChromiumBrowser, ChromiumPage};
pub use error::{BrowserError, BrowserResult};
pub use human::HumanPacing;
pub use metrics::BrowserMetrics;
pub use page::{BrowserContextFactory, BrowserPage, PageElement};
pub use profile::{BrowserProfile, ProfileManager};
