use serde::{Deserialize, Serialize};

use crate::config::ContentSection;
use crate::registry::{Platform, PlatformCategory};
use crate::session::Campaign;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkStyle {
    /// Clickable HTML anchor.
    Anchor,
    PlainText,
}

impl LinkStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStyle::Anchor => "anchor",
            LinkStyle::PlainText => "plain_text",
        }
    }
}

/// What the text must reference and how it is keyed for template selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentContext {
    pub campaign_id: String,
    pub target_url: String,
    pub anchor: String,
    pub keyword: String,
    /// Distinguishes repeated generations within one campaign.
    pub variation: u32,
}

impl ContentContext {
    pub fn from_campaign(campaign: &Campaign, variation: u32) -> Self {
        let anchor = if campaign.anchors.is_empty() {
            String::new()
        } else {
            campaign.anchors[variation as usize % campaign.anchors.len()].clone()
        };
        let keyword = if campaign.keywords.is_empty() {
            String::new()
        } else {
            campaign.keywords[variation as usize % campaign.keywords.len()].clone()
        };
        Self {
            campaign_id: campaign.campaign_id.clone(),
            target_url: campaign.target_url.clone(),
            anchor,
            keyword,
            variation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLimits {
    pub min_chars: usize,
    pub max_chars: usize,
    pub supports_html: bool,
}

impl ContentLimits {
    pub fn for_category(category: PlatformCategory, settings: &ContentSection) -> Self {
        Self {
            min_chars: settings.min_chars,
            max_chars: settings.max_chars.max(settings.min_chars),
            supports_html: category == PlatformCategory::ArticleApi,
        }
    }

    /// Platform bounds narrow the configured ones where known.
    pub fn for_platform(platform: &Platform, settings: &ContentSection) -> Self {
        let min_chars = platform
            .min_content_chars
            .map_or(settings.min_chars, |value| value.max(settings.min_chars));
        let max_chars = platform
            .max_content_chars
            .map_or(settings.max_chars, |value| value.min(settings.max_chars));
        Self {
            min_chars,
            max_chars: max_chars.max(min_chars),
            supports_html: platform.capabilities.supports_html,
        }
    }

    pub fn link_style(&self) -> LinkStyle {
        if self.supports_html {
            LinkStyle::Anchor
        } else {
            LinkStyle::PlainText
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedContent {
    pub text: String,
    pub link_style: LinkStyle,
    /// Name of the provider that produced the text, `template` for the
    /// built-in fallback.
    pub provider: String,
}
