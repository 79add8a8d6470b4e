mod error;
mod pattern;
mod probe;
mod seed;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use rand::Rng;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::DiscoverySection;
use crate::registry::{
    platform_key, PlatformCandidate, PlatformCategory, PlatformRegistry, UpsertOutcome,
};

pub use error::{DiscoveryError, DiscoveryResult};
pub use pattern::PatternSource;
pub use probe::{BrowserProbe, PlatformProbe, ProbeVerdict};
pub use seed::{load_seed_file, parse_seed_list, SeedFormat, SeedListSource};

/// Yields candidate platforms for one category.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;

    async fn candidates(
        &self,
        category: PlatformCategory,
        limit: usize,
    ) -> DiscoveryResult<Vec<PlatformCandidate>>;
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub probe_delay_ms: (u64, u64),
    pub stop_on_first_error: bool,
    pub dry_run: bool,
}

impl DiscoveryConfig {
    pub fn from_section(section: &DiscoverySection) -> Self {
        Self {
            probe_delay_ms: (section.probe_delay_ms[0], section.probe_delay_ms[1]),
            stop_on_first_error: section.stop_on_first_error,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct DiscoveryStats {
    pub category: String,
    pub depth: usize,
    pub seen: usize,
    pub inserted: usize,
    pub refreshed: usize,
    pub rejected: usize,
    pub errors: Vec<String>,
    pub dry_run: bool,
    pub total_wait_ms: u64,
    pub duration_secs: u64,
}

/// Grows the registry from configured sources. Only ever adds or refreshes
/// platforms; it never deactivates one.
pub struct DiscoveryEngine {
    registry: Arc<PlatformRegistry>,
    sources: Vec<Box<dyn CandidateSource>>,
    probe: Option<Arc<dyn PlatformProbe>>,
    config: DiscoveryConfig,
    rate_limiter: RateLimiter,
}

impl DiscoveryEngine {
    pub fn new(registry: Arc<PlatformRegistry>, config: DiscoveryConfig) -> Self {
        let rate_limiter = RateLimiter::new(config.probe_delay_ms);
        Self {
            registry,
            sources: Vec::new(),
            probe: None,
            config,
            rate_limiter,
        }
    }

    /// Seed files first, then patterns.
    pub fn from_config(
        registry: Arc<PlatformRegistry>,
        section: &DiscoverySection,
    ) -> DiscoveryResult<Self> {
        let mut engine = Self::new(registry, DiscoveryConfig::from_section(section));
        for path in &section.seed_files {
            engine = engine.with_source(SeedListSource::new(path));
        }
        if !section.patterns.is_empty() {
            engine = engine.with_source(PatternSource::new(section.patterns.clone())?);
        }
        Ok(engine)
    }

    pub fn with_source(mut self, source: impl CandidateSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn PlatformProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    /// Lazy, finite sequence of at most `depth` candidates. Later sources
    /// are only asked once earlier ones run dry.
    pub fn candidates(
        &self,
        category: PlatformCategory,
        depth: usize,
    ) -> BoxStream<'_, DiscoveryResult<PlatformCandidate>> {
        stream::iter(self.sources.iter())
            .then(move |source| async move {
                let batch = source.candidates(category, depth).await;
                debug!(
                    source = source.name(),
                    category = category.as_str(),
                    ok = batch.is_ok(),
                    "discovery source queried"
                );
                batch
            })
            .flat_map(|batch| match batch {
                Ok(candidates) => stream::iter(candidates.into_iter().map(Ok)).boxed(),
                Err(err) => stream::once(async move { Err(err) }).boxed(),
            })
            .take(depth)
            .boxed()
    }

    pub async fn discover(
        &self,
        category: PlatformCategory,
        depth: usize,
    ) -> DiscoveryResult<DiscoveryStats> {
        let start = Instant::now();
        let mut stats = DiscoveryStats {
            category: category.as_str().to_string(),
            depth,
            dry_run: self.config.dry_run,
            ..DiscoveryStats::default()
        };
        let mut keys = HashSet::new();
        let mut probed = 0usize;
        let mut candidates = self.candidates(category, depth);

        while let Some(next) = candidates.next().await {
            let candidate = match next {
                Ok(candidate) => candidate,
                Err(err) => {
                    warn!(category = category.as_str(), error = %err, "discovery source failed");
                    stats.errors.push(err.to_string());
                    if self.config.stop_on_first_error {
                        return Err(err);
                    }
                    continue;
                }
            };
            stats.seen += 1;

            let key = match platform_key(&candidate.url) {
                Ok(key) => key,
                Err(err) => {
                    debug!(url = %candidate.url, error = %err, "candidate rejected");
                    stats.rejected += 1;
                    continue;
                }
            };
            if candidate.category != category || !keys.insert(key.clone()) {
                stats.rejected += 1;
                continue;
            }

            if let Some(probe) = &self.probe {
                if probed > 0 {
                    stats.total_wait_ms += self.rate_limiter.wait().await;
                }
                probed += 1;
                match probe.check(&candidate).await {
                    Ok(ProbeVerdict::Compatible) => {}
                    Ok(ProbeVerdict::Incompatible(reason)) => {
                        debug!(url = %candidate.url, reason = %reason, "candidate failed probe");
                        stats.rejected += 1;
                        continue;
                    }
                    Err(err) => {
                        warn!(url = %candidate.url, error = %err, "candidate probe failed");
                        stats.errors.push(format!("{}: {err}", candidate.url));
                        if self.config.stop_on_first_error {
                            return Err(err);
                        }
                        continue;
                    }
                }
            }

            let outcome = if self.config.dry_run {
                match self.registry.store().fetch(&key) {
                    Ok(Some(_)) => Ok(UpsertOutcome::Refreshed),
                    Ok(None) => Ok(UpsertOutcome::Inserted),
                    Err(err) => Err(err),
                }
            } else {
                self.registry.upsert_discovered(&candidate).await
            };
            match outcome {
                Ok(UpsertOutcome::Inserted) => stats.inserted += 1,
                Ok(UpsertOutcome::Refreshed) => stats.refreshed += 1,
                Err(err) => {
                    warn!(platform = %key, error = %err, "discovered platform not stored");
                    stats.errors.push(format!("{key}: {err}"));
                    if self.config.stop_on_first_error {
                        return Err(err.into());
                    }
                }
            }
        }

        stats.duration_secs = start.elapsed().as_secs();
        info!(
            category = %stats.category,
            depth,
            seen = stats.seen,
            inserted = stats.inserted,
            refreshed = stats.refreshed,
            rejected = stats.rejected,
            errors = stats.errors.len(),
            dry_run = stats.dry_run,
            "discovery pass finished"
        );
        Ok(stats)
    }
}

struct RateLimiter {
    range: (u64, u64),
}

impl RateLimiter {
    fn new(range: (u64, u64)) -> Self {
        Self { range }
    }

    async fn wait(&self) -> u64 {
        if self.range.0 == 0 && self.range.1 == 0 {
            return 0;
        }
        let lower = self.range.0.min(self.range.1);
        let upper = self.range.0.max(self.range.1);
        let delay = rand::thread_rng().gen_range(lower..=upper);
        sleep(Duration::from_millis(delay)).await;
        delay
    }
}
