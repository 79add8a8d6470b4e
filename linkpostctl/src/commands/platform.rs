use std::path::PathBuf;

use clap::{Args, Subcommand};
use linkpost_core::registry::{Platform, PlatformCategory, PlatformFilter, RegistryStats};
use serde::Serialize;

use crate::{format_timestamp, DisplayFallback};

#[derive(Subcommand, Debug)]
pub enum PlatformCommands {
    /// List registered platforms, best candidates first
    List(PlatformListArgs),
    /// Show one platform by key
    Show { key: String },
    /// Import a seed list (toml, yaml or json) as trusted platforms
    Import { file: PathBuf },
    /// Remove a platform from selection
    Deactivate { key: String },
    /// Return a deactivated platform to selection
    Reactivate { key: String },
    /// Registry totals per category
    Stats,
}

#[derive(Args, Debug)]
pub struct PlatformListArgs {
    /// Only platforms of this category
    #[arg(long, value_parser = parse_category)]
    pub category: Option<PlatformCategory>,
    /// Include deactivated platforms
    #[arg(long)]
    pub inactive: bool,
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

impl PlatformListArgs {
    pub fn filter(&self) -> PlatformFilter {
        PlatformFilter {
            category: self.category,
            include_inactive: self.inactive,
            limit: Some(self.limit),
        }
    }
}

pub fn parse_category(raw: &str) -> Result<PlatformCategory, String> {
    raw.parse().map_err(|err| format!("{err}"))
}

#[derive(Debug, Serialize)]
pub struct PlatformList {
    pub rows: Vec<Platform>,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub file: String,
    pub records: usize,
    pub inserted: usize,
}

impl DisplayFallback for Platform {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("{} ({})", self.key, if self.active { "active" } else { "inactive" }),
            format!("  url: {}", self.url),
            format!(
                "  category: {} via {}",
                self.category,
                self.mechanism.as_str()
            ),
            format!(
                "  authority: {} | difficulty: {} | trust: {}",
                self.authority,
                self.difficulty.as_str(),
                self.trust.as_str()
            ),
            format!(
                "  success rate: {:.1}% over {} uses (last {})",
                self.success_rate,
                self.times_used,
                format_timestamp(self.last_used_at)
            ),
        ];
        if self.below_floor_streak > 0 {
            lines.push(format!("  below floor streak: {}", self.below_floor_streak));
        }
        if let Some(at) = self.deactivated_at {
            lines.push(format!("  deactivated: {}", format_timestamp(Some(at))));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for PlatformList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No platforms registered".to_string();
        }
        self.rows
            .iter()
            .map(|platform| {
                format!(
                    "{} | {} | auth={} | rate={:.1}% | used={}{}",
                    platform.key,
                    platform.category,
                    platform.authority,
                    platform.success_rate,
                    platform.times_used,
                    if platform.active { "" } else { " | inactive" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for ImportSummary {
    fn display(&self) -> String {
        format!(
            "Imported {}: {} records, {} new",
            self.file, self.records, self.inserted
        )
    }
}

impl DisplayFallback for RegistryStats {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("Platforms: {} ({} active)", self.total, self.active),
            format!("Average success rate: {:.1}%", self.average_success_rate),
        ];
        let mut categories: Vec<_> = self.by_category.iter().collect();
        categories.sort();
        for (category, count) in categories {
            lines.push(format!("  - {category}: {count}"));
        }
        lines.join("\n")
    }
}
