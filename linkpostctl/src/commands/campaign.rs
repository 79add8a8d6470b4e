use clap::{Args, Subcommand};
use linkpost_core::registry::PlatformCategory;
use linkpost_core::session::{Campaign, PosterIdentity};

use super::platform::parse_category;
use crate::{format_timestamp, DisplayFallback};

#[derive(Subcommand, Debug)]
pub enum CampaignCommands {
    /// Register a campaign for a target url
    Create(CampaignCreateArgs),
    /// Show a campaign and its running totals
    Show { campaign_id: String },
    /// List every campaign
    List,
}

#[derive(Args, Debug)]
pub struct CampaignCreateArgs {
    /// Page the backlinks point at
    #[arg(long)]
    pub url: String,
    /// Keyword used to build content; repeat for more
    #[arg(long = "keyword", required = true)]
    pub keywords: Vec<String>,
    /// Anchor text for the link; repeat for more
    #[arg(long = "anchor", required = true)]
    pub anchors: Vec<String>,
    /// Platform categories to post on; defaults to all
    #[arg(long = "category", value_parser = parse_category)]
    pub categories: Vec<PlatformCategory>,
    #[arg(long, default_value_t = 10)]
    pub quota: u32,
    #[arg(long)]
    pub daily_quota: Option<u32>,
    /// Name entered on forms that ask for one
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub website: Option<String>,
}

impl CampaignCreateArgs {
    pub fn to_campaign(&self) -> Campaign {
        let mut campaign = Campaign::new(self.url.clone(), self.quota);
        campaign.keywords = self.keywords.clone();
        campaign.anchors = self.anchors.clone();
        campaign.categories = self.categories.clone();
        campaign.daily_quota = self.daily_quota;
        if self.name.is_some() || self.email.is_some() || self.website.is_some() {
            campaign.identity = Some(PosterIdentity {
                name: self.name.clone(),
                email: self.email.clone(),
                website: self.website.clone(),
            });
        }
        campaign
    }
}

impl DisplayFallback for Campaign {
    fn display(&self) -> String {
        let categories = if self.categories.is_empty() {
            "all".to_string()
        } else {
            self.categories
                .iter()
                .map(|category| category.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut lines = vec![
            format!("{} -> {}", self.campaign_id, self.target_url),
            format!("  keywords: {}", self.keywords.join(", ")),
            format!("  anchors: {}", self.anchors.join(", ")),
            format!("  categories: {categories}"),
            format!(
                "  quota: {}/{} posted ({} found)",
                self.links_posted, self.total_quota, self.links_found
            ),
        ];
        if let Some(daily) = self.daily_quota {
            lines.push(format!("  daily quota: {daily}"));
        }
        lines.push(format!("  created: {}", format_timestamp(self.created_at)));
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<Campaign> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "No campaigns".to_string();
        }
        self.iter()
            .map(|campaign| {
                format!(
                    "{} | {} | {}/{} posted",
                    campaign.campaign_id,
                    campaign.target_url,
                    campaign.links_posted,
                    campaign.total_quota
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
