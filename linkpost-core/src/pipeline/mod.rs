mod error;
mod gate;
mod runner;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::session::{PlatformCriteria, Session, SessionTracker};

pub use error::{PipelineError, PipelineResult};
pub use gate::PlatformGate;
pub use runner::SessionRunner;

struct ActiveSession {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<PipelineResult<Session>>>,
}

/// Fire-and-forget entry point: sessions start immediately and run on
/// background workers, bounded by a process-wide concurrency ceiling.
pub struct Pipeline {
    runner: SessionRunner,
    slots: Arc<Semaphore>,
    active: Mutex<HashMap<String, ActiveSession>>,
}

impl Pipeline {
    pub fn new(runner: SessionRunner, max_concurrent_sessions: usize) -> Self {
        Self {
            runner,
            slots: Arc::new(Semaphore::new(max_concurrent_sessions.max(1))),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracker(&self) -> &SessionTracker {
        self.runner.tracker()
    }

    /// Records a running session and returns its id without waiting for any
    /// attempt. Criteria without categories take the campaign's category
    /// mix. Must be called inside a tokio runtime.
    pub fn start_session(
        &self,
        campaign_id: &str,
        mut criteria: PlatformCriteria,
    ) -> PipelineResult<String> {
        let tracker = self.runner.tracker();
        let campaign = tracker.campaign(campaign_id)?;
        if criteria.categories.is_empty() {
            criteria.categories = campaign.categories.clone();
        }
        let session = tracker.start(&campaign, criteria)?;
        let session_id = session.session_id.clone();
        let (stop_tx, stop_rx) = watch::channel(false);

        let runner = self.runner.clone();
        let slots = Arc::clone(&self.slots);
        let worker_id = session_id.clone();
        let handle = tokio::spawn(async move {
            let Ok(_slot) = slots.acquire_owned().await else {
                return runner
                    .tracker()
                    .fail(&worker_id, "pipeline shut down")
                    .map_err(PipelineError::from);
            };
            if let Err(err) = runner.tracker().report_progress(&worker_id, 0, "running") {
                warn!(session = %worker_id, error = %err, "failed to mark session running");
            }
            runner.run(session, campaign, stop_rx).await
        });

        let mut active = self.lock_active();
        active.retain(|_, entry| !entry.stop.is_closed());
        active.insert(
            session_id.clone(),
            ActiveSession {
                stop: stop_tx,
                handle: Some(handle),
            },
        );
        info!(session = %session_id, campaign = %campaign_id, "session queued");
        Ok(session_id)
    }

    pub fn get_session(&self, session_id: &str) -> PipelineResult<Session> {
        Ok(self.runner.tracker().get(session_id)?)
    }

    /// Asks a session to stop launching attempts. In-flight attempts run to
    /// their terminal state and the session ends paused.
    pub fn stop(&self, session_id: &str) -> PipelineResult<()> {
        let active = self.lock_active();
        let entry = active
            .get(session_id)
            .ok_or_else(|| PipelineError::UnknownSession(session_id.to_string()))?;
        entry.stop.send_replace(true);
        info!(session = %session_id, "session stop requested");
        Ok(())
    }

    /// Waits for a session worker started by this pipeline to finish; for
    /// any other session returns the stored snapshot.
    pub async fn wait(&self, session_id: &str) -> PipelineResult<Session> {
        let handle = self
            .lock_active()
            .get_mut(session_id)
            .and_then(|entry| entry.handle.take());
        match handle {
            Some(handle) => handle.await.map_err(|err| PipelineError::Worker {
                session_id: session_id.to_string(),
                reason: err.to_string(),
            })?,
            None => self.get_session(session_id),
        }
    }

    /// Stops every known session and closes the slot pool, so queued
    /// sessions never start.
    pub fn shutdown(&self) {
        self.slots.close();
        for entry in self.lock_active().values() {
            entry.stop.send_replace(true);
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActiveSession>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
