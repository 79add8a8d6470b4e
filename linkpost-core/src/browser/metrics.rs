use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrowserMetrics {
    pub pages_opened: u64,
    pub navigation_failures: u64,
    pub fields_filled: u64,
    pub forms_filled: u64,
    pub submissions: u64,
    pub challenges_seen: u64,
    pub screenshots: u64,
}

impl BrowserMetrics {
    pub fn record_page_open(&mut self) {
        self.pages_opened = self.pages_opened.saturating_add(1);
    }

    pub fn record_navigation_failure(&mut self) {
        self.navigation_failures = self.navigation_failures.saturating_add(1);
    }

    pub fn record_fields(&mut self, count: u64) {
        self.fields_filled = self.fields_filled.saturating_add(count);
        self.forms_filled = self.forms_filled.saturating_add(1);
    }

    pub fn record_submission(&mut self) {
        self.submissions = self.submissions.saturating_add(1);
    }

    pub fn record_challenge(&mut self) {
        self.challenges_seen = self.challenges_seen.saturating_add(1);
    }

    pub fn record_screenshot(&mut self) {
        self.screenshots = self.screenshots.saturating_add(1);
    }

    pub fn challenge_rate(&self) -> f64 {
        if self.pages_opened == 0 {
            0.0
        } else {
            (self.challenges_seen as f64 / self.pages_opened as f64) * 100.0
        }
    }
}
