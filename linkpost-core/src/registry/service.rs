use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::config::RegistrySection;
use crate::session::AttemptOutcome;

use super::models::{
    Platform, PlatformCandidate, PlatformFilter, PlatformTrust, RegistryStats, SelectionCriteria,
    SelectionOutcome, UpsertOutcome,
};
use super::selection::select_from;
use super::store::{OutcomeUpdate, SqlitePlatformStore};
use super::{RegistryError, RegistryResult};

/// Async lock per platform key. Every mutation of a platform row runs while
/// holding its key's lock, on top of the store's immediate transaction.
#[derive(Debug, Default)]
pub struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn handle(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            guard
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }
}

#[derive(Debug)]
pub struct PlatformRegistry {
    store: SqlitePlatformStore,
    config: RegistrySection,
    locks: KeyLocks,
}

impl PlatformRegistry {
    pub fn new(store: SqlitePlatformStore, config: RegistrySection) -> Self {
        Self {
            store,
            config,
            locks: KeyLocks::default(),
        }
    }

    pub fn store(&self) -> &SqlitePlatformStore {
        &self.store
    }

    pub fn config(&self) -> &RegistrySection {
        &self.config
    }

    pub async fn select_platform(
        &self,
        criteria: &SelectionCriteria,
    ) -> RegistryResult<SelectionOutcome> {
        let candidates = self.store.eligible(criteria.min_authority)?;
        let outcome = select_from(candidates, criteria);
        match &outcome {
            SelectionOutcome::Selected(platform) => debug!(
                target: "registry",
                platform = %platform.key,
                authority = platform.authority,
                success_rate = platform.success_rate,
                excluded = criteria.exclude.len(),
                "platform selected"
            ),
            SelectionOutcome::Exhausted => info!(
                target: "registry",
                excluded = criteria.exclude.len(),
                "eligible platforms exhausted"
            ),
            SelectionOutcome::NoneAvailable => info!(
                target: "registry",
                min_authority = criteria.min_authority,
                "no platform matches selection criteria"
            ),
        }
        Ok(outcome)
    }

    /// Folds a completed attempt into the platform's statistics. Only a
    /// posted attempt counts as a success.
    pub async fn record_outcome(
        &self,
        key: &str,
        outcome: AttemptOutcome,
    ) -> RegistryResult<OutcomeUpdate> {
        let lock = self.locks.handle(key);
        let _guard = lock.lock().await;
        let update = self.store.apply_outcome(
            key,
            outcome == AttemptOutcome::Posted,
            self.config.deactivation_floor,
            self.config.deactivation_window,
            Utc::now(),
        )?;
        debug!(
            target: "registry",
            platform = %key,
            outcome = %outcome,
            previous_rate = update.previous_rate,
            success_rate = update.platform.success_rate,
            times_used = update.platform.times_used,
            "platform outcome recorded"
        );
        if update.deactivated {
            warn!(
                target: "registry",
                platform = %key,
                success_rate = update.platform.success_rate,
                streak = update.platform.below_floor_streak,
                "platform deactivated after persistent low success rate"
            );
        }
        Ok(update)
    }

    pub async fn deactivate(&self, key: &str) -> RegistryResult<Platform> {
        let lock = self.locks.handle(key);
        let _guard = lock.lock().await;
        let platform = self.store.set_active(key, false, Utc::now())?;
        info!(target: "registry", platform = %key, "platform deactivated");
        Ok(platform)
    }

    pub async fn reactivate(&self, key: &str) -> RegistryResult<Platform> {
        let lock = self.locks.handle(key);
        let _guard = lock.lock().await;
        let platform = self.store.set_active(key, true, Utc::now())?;
        info!(target: "registry", platform = %key, "platform reactivated");
        Ok(platform)
    }

    /// Discovery upsert path: refreshes verification metadata of a known key,
    /// inserts an unknown one with seed statistics.
    pub async fn upsert_discovered(
        &self,
        candidate: &PlatformCandidate,
    ) -> RegistryResult<UpsertOutcome> {
        let platform = self.seed_platform(candidate)?;
        let lock = self.locks.handle(&platform.key);
        let _guard = lock.lock().await;
        let outcome = self.store.insert_or_refresh(&platform, Utc::now())?;
        debug!(
            target: "registry",
            platform = %platform.key,
            outcome = ?outcome,
            trust = platform.trust.as_str(),
            "discovered platform upserted"
        );
        Ok(outcome)
    }

    pub fn import_seed(&self, candidates: &[PlatformCandidate]) -> RegistryResult<usize> {
        let platforms = candidates
            .iter()
            .map(|candidate| {
                let mut trusted = candidate.clone();
                trusted.trust = PlatformTrust::Trusted;
                self.seed_platform(&trusted)
            })
            .collect::<RegistryResult<Vec<_>>>()?;
        let inserted = self.store.import(&platforms, Utc::now())?;
        info!(
            target: "registry",
            records = platforms.len(),
            inserted,
            "seed list imported"
        );
        Ok(inserted)
    }

    /// Builds the row inserted for a previously unknown candidate. Provisional
    /// candidates get the conservative seed values regardless of what the
    /// source estimated.
    pub fn seed_platform(&self, candidate: &PlatformCandidate) -> RegistryResult<Platform> {
        let mut platform = Platform::new(&candidate.url, candidate.category, candidate.mechanism)?;
        platform.difficulty = candidate.difficulty;
        platform.capabilities = candidate.capabilities;
        platform.min_content_chars = candidate.min_content_chars;
        platform.max_content_chars = candidate.max_content_chars;
        platform.trust = candidate.trust;
        let now = Utc::now();
        platform.created_at = Some(now);
        platform.last_checked_at = Some(now);
        match candidate.trust {
            PlatformTrust::Trusted => {
                platform.authority = candidate.authority_estimate.unwrap_or(0).min(100);
                platform.success_rate = self.config.seed_success_rate.clamp(0.0, 100.0);
            }
            PlatformTrust::Provisional => {
                let cap = self.config.provisional_authority_cap.min(100);
                platform.authority = candidate.authority_estimate.unwrap_or(cap / 2).min(cap);
                platform.success_rate = self.config.provisional_success_rate.clamp(0.0, 100.0);
            }
        }
        Ok(platform)
    }

    pub fn get(&self, key: &str) -> RegistryResult<Platform> {
        self.store
            .fetch(key)?
            .ok_or_else(|| RegistryError::NotFound {
                key: key.to_string(),
            })
    }

    pub fn list(&self, filter: &PlatformFilter) -> RegistryResult<Vec<Platform>> {
        self.store.list(filter)
    }

    pub fn stats(&self) -> RegistryResult<RegistryStats> {
        self.store.stats()
    }
}
