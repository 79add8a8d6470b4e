use chrono::Utc;
use tracing::{debug, info, warn};

use super::error::{SessionError, SessionResult};
use super::models::{
    Campaign, PlatformCriteria, PostingAttempt, Session, SessionReport, SessionStatus,
};
use super::store::{SqliteSessionStore, Transition};

/// Durable lifecycle of posting sessions and their attempt history.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    store: SqliteSessionStore,
}

impl SessionTracker {
    pub fn new(store: SqliteSessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SqliteSessionStore {
        &self.store
    }

    pub fn start(&self, campaign: &Campaign, criteria: PlatformCriteria) -> SessionResult<Session> {
        if self.store.fetch_campaign(&campaign.campaign_id)?.is_none() {
            return Err(SessionError::CampaignNotFound {
                campaign_id: campaign.campaign_id.clone(),
            });
        }
        let session = Session::new(&campaign.campaign_id, criteria);
        self.store.insert_session(&session)?;
        info!(
            target: "session",
            session = %session.session_id,
            campaign = %campaign.campaign_id,
            "session started"
        );
        Ok(session)
    }

    pub fn report_progress(
        &self,
        session_id: &str,
        percent: u8,
        step: &str,
    ) -> SessionResult<Session> {
        let session = self.store.update_progress(session_id, percent, step)?;
        debug!(
            target: "session",
            session = %session_id,
            progress = percent,
            step,
            "session progress"
        );
        Ok(session)
    }

    pub fn complete(&self, session_id: &str, report: &SessionReport) -> SessionResult<Session> {
        self.finish(session_id, SessionStatus::Completed, Some(report), None)
    }

    pub fn fail(&self, session_id: &str, error: &str) -> SessionResult<Session> {
        self.finish(session_id, SessionStatus::Failed, None, Some(error))
    }

    /// Fails the session while keeping the structured report of what it did.
    pub fn fail_with_report(
        &self,
        session_id: &str,
        error: &str,
        report: &SessionReport,
    ) -> SessionResult<Session> {
        self.finish(session_id, SessionStatus::Failed, Some(report), Some(error))
    }

    pub fn pause(&self, session_id: &str, report: &SessionReport) -> SessionResult<Session> {
        self.finish(session_id, SessionStatus::Paused, Some(report), None)
    }

    fn finish(
        &self,
        session_id: &str,
        status: SessionStatus,
        report: Option<&SessionReport>,
        error: Option<&str>,
    ) -> SessionResult<Session> {
        match self
            .store
            .finish(session_id, status, report, error, Utc::now())?
        {
            Transition::Applied(session) => {
                info!(
                    target: "session",
                    session = %session_id,
                    status = %status,
                    error = error.unwrap_or(""),
                    "session finished"
                );
                Ok(session)
            }
            Transition::AlreadyTerminal(session) => {
                warn!(
                    target: "session",
                    session = %session_id,
                    current = %session.status,
                    requested = %status,
                    "ignoring transition of finished session"
                );
                Ok(session)
            }
        }
    }

    pub fn get(&self, session_id: &str) -> SessionResult<Session> {
        self.store
            .fetch_session(session_id)?
            .ok_or_else(|| SessionError::NotFound {
                session_id: session_id.to_string(),
            })
    }

    pub fn list(&self, campaign_id: Option<&str>) -> SessionResult<Vec<Session>> {
        self.store.list_sessions(campaign_id)
    }

    pub fn append_attempt(&self, attempt: &PostingAttempt) -> SessionResult<PostingAttempt> {
        let stored = self.store.append_attempt(attempt)?;
        debug!(
            target: "session",
            session = %stored.session_id,
            sequence = stored.sequence,
            platform = %stored.platform_key,
            outcome = %stored.outcome,
            "attempt recorded"
        );
        Ok(stored)
    }

    pub fn attempts(&self, session_id: &str) -> SessionResult<Vec<PostingAttempt>> {
        self.store.list_attempts(session_id)
    }

    pub fn create_campaign(&self, campaign: &Campaign) -> SessionResult<Campaign> {
        let stored = self.store.create_campaign(campaign)?;
        info!(
            target: "session",
            campaign = %stored.campaign_id,
            target_url = %stored.target_url,
            total_quota = stored.total_quota,
            "campaign created"
        );
        Ok(stored)
    }

    pub fn campaign(&self, campaign_id: &str) -> SessionResult<Campaign> {
        self.store.campaign(campaign_id)
    }

    /// Posts made for the campaign since midnight UTC.
    pub fn posted_today(&self, campaign_id: &str) -> SessionResult<u32> {
        self.store.posted_on(campaign_id, Utc::now().date_naive())
    }

    pub fn record_session_totals(
        &self,
        campaign_id: &str,
        report: &SessionReport,
    ) -> SessionResult<Campaign> {
        self.store
            .record_campaign_totals(campaign_id, report.posts_found, report.posts_posted)
    }
}
