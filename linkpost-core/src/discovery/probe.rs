use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::warn;

use crate::browser::{BrowserContextFactory, BrowserError, BrowserPage};
use crate::config::FormsSection;
use crate::posting::FormSignature;
use crate::registry::PlatformCandidate;

use super::error::DiscoveryResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    Compatible,
    Incompatible(String),
}

/// Checks a candidate is actually automatable before it enters the registry.
#[async_trait]
pub trait PlatformProbe: Send + Sync {
    async fn check(&self, candidate: &PlatformCandidate) -> DiscoveryResult<ProbeVerdict>;
}

/// Loads the candidate in an isolated page and looks for its category's
/// submission form.
pub struct BrowserProbe {
    factory: Arc<dyn BrowserContextFactory>,
    forms: FormsSection,
    deadline: Duration,
}

impl BrowserProbe {
    pub fn new(
        factory: Arc<dyn BrowserContextFactory>,
        forms: FormsSection,
        deadline: Duration,
    ) -> Self {
        Self {
            factory,
            forms,
            deadline,
        }
    }

    async fn inspect(&self, page: &dyn BrowserPage, candidate: &PlatformCandidate) -> DiscoveryResult<ProbeVerdict> {
        page.navigate(&candidate.url).await?;
        let signature = FormSignature::for_category(candidate.category, &self.forms);
        Ok(match signature.locate(page).await? {
            Some(_) => ProbeVerdict::Compatible,
            None => ProbeVerdict::Incompatible("form not found".into()),
        })
    }
}

#[async_trait]
impl PlatformProbe for BrowserProbe {
    async fn check(&self, candidate: &PlatformCandidate) -> DiscoveryResult<ProbeVerdict> {
        let page = self.factory.open_page().await?;
        let verdict = match timeout(self.deadline, self.inspect(page.as_ref(), candidate)).await {
            Ok(verdict) => verdict,
            Err(_) => Err(BrowserError::timeout(format!("probe of {}", candidate.url), self.deadline).into()),
        };
        if let Err(err) = page.close().await {
            warn!(url = %candidate.url, error = %err, "failed to close probe page");
        }
        verdict
    }
}
