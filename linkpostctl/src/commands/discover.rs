use clap::Args;
use linkpost_core::discovery::DiscoveryStats;
use linkpost_core::registry::PlatformCategory;

use super::platform::parse_category;
use crate::DisplayFallback;

/// Runs one discovery pass for a category.
#[derive(Args, Debug, Clone)]
pub struct DiscoverArgs {
    #[arg(long, value_parser = parse_category)]
    pub category: PlatformCategory,
    /// Maximum candidates pulled from the sources
    #[arg(long, default_value_t = 20)]
    pub depth: usize,
    /// Report what would change without writing to the registry
    #[arg(long)]
    pub dry_run: bool,
    /// Check each candidate for a usable form in a real browser
    #[arg(long)]
    pub probe: bool,
}

impl DisplayFallback for DiscoveryStats {
    fn display(&self) -> String {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        let mut lines = vec![
            format!(
                "Discovery {}{mode}: {} seen, {} new, {} refreshed, {} rejected",
                self.category, self.seen, self.inserted, self.refreshed, self.rejected
            ),
            format!(
                "  took {}s, {} ms waiting between probes",
                self.duration_secs, self.total_wait_ms
            ),
        ];
        for error in &self.errors {
            lines.push(format!("  error: {error}"));
        }
        lines.join("\n")
    }
}
