use std::fmt;

use crate::browser::{BrowserPage, BrowserResult};
use crate::config::ActorSection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeSignal {
    Selector(String),
    Marker(String),
}

impl fmt::Display for ChallengeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeSignal::Selector(selector) => write!(f, "challenge element {selector}"),
            ChallengeSignal::Marker(marker) => write!(f, "challenge text \"{marker}\""),
        }
    }
}

/// Human-verification detection from element selectors and text markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeDetector {
    selectors: Vec<String>,
    markers: Vec<String>,
}

impl ChallengeDetector {
    pub fn new(selectors: Vec<String>, markers: Vec<String>) -> Self {
        Self {
            selectors,
            markers: markers
                .into_iter()
                .map(|marker| marker.trim().to_lowercase())
                .filter(|marker| !marker.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ActorSection) -> Self {
        Self::new(
            config.challenge_selectors.clone(),
            config.challenge_markers.clone(),
        )
    }

    pub fn match_text(&self, page_text: &str) -> Option<ChallengeSignal> {
        let text = page_text.to_lowercase();
        self.markers
            .iter()
            .find(|marker| text.contains(marker.as_str()))
            .map(|marker| ChallengeSignal::Marker(marker.clone()))
    }

    pub async fn detect(&self, page: &dyn BrowserPage) -> BrowserResult<Option<ChallengeSignal>> {
        for selector in &self.selectors {
            if page.find(selector).await?.is_some() {
                return Ok(Some(ChallengeSignal::Selector(selector.clone())));
            }
        }
        let text = page.page_text().await?;
        Ok(self.match_text(&text))
    }
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        Self::from_config(&ActorSection::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_match_case_insensitively() {
        let detector = ChallengeDetector::default();
        assert_eq!(
            detector.match_text("Please VERIFY YOU ARE HUMAN to continue"),
            Some(ChallengeSignal::Marker("verify you are human".into()))
        );
        assert_eq!(detector.match_text("Leave a reply"), None);
    }
}
