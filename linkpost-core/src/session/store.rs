use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};

use crate::sqlite::open_connection;

use super::error::{SessionError, SessionResult};
use super::models::{
    AttemptOutcome, Campaign, PostingAttempt, Session, SessionReport, SessionStatus,
};

const SESSION_SCHEMA: &str = include_str!("../../../sql/sessions.sql");

#[derive(Debug, Clone)]
pub struct SqliteSessionStoreBuilder {
    path: Option<PathBuf>,
    create_if_missing: bool,
}

impl Default for SqliteSessionStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
        }
    }
}

impl SqliteSessionStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> SessionResult<SqliteSessionStore> {
        let path = self.path.ok_or_else(|| SessionError::InvalidValue {
            field: "path",
            value: "session store path not configured".into(),
        })?;
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteSessionStore { path, flags })
    }
}

/// Result of a guarded status transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Applied(Session),
    AlreadyTerminal(Session),
}

#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteSessionStore {
    pub fn builder() -> SqliteSessionStoreBuilder {
        SqliteSessionStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> SessionResult<Self> {
        SqliteSessionStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> SessionResult<Connection> {
        open_connection(&self.path, self.flags).map_err(|source| SessionError::OpenDatabase {
            path: self.path.clone(),
            source,
        })
    }

    pub fn initialize(&self) -> SessionResult<()> {
        let conn = self.open()?;
        conn.execute_batch(SESSION_SCHEMA)?;
        Ok(())
    }

    pub fn create_campaign(&self, campaign: &Campaign) -> SessionResult<Campaign> {
        let conn = self.open()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO campaigns (
                campaign_id, target_url, keywords, anchors, categories, identity,
                daily_quota, total_quota, links_found, links_posted, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                campaign.campaign_id,
                campaign.target_url,
                serde_json::to_string(&campaign.keywords)?,
                serde_json::to_string(&campaign.anchors)?,
                serde_json::to_string(&campaign.categories)?,
                campaign
                    .identity
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                campaign.daily_quota.map(|value| value as i64),
                campaign.total_quota as i64,
                campaign.links_found as i64,
                campaign.links_posted as i64,
                now,
            ],
        )?;
        drop(conn);
        self.campaign(&campaign.campaign_id)
    }

    pub fn fetch_campaign(&self, campaign_id: &str) -> SessionResult<Option<Campaign>> {
        let conn = self.open()?;
        let campaign = conn
            .query_row(
                "SELECT * FROM campaigns WHERE campaign_id = ?1",
                [campaign_id],
                |row| Campaign::from_row(row),
            )
            .optional()?;
        Ok(campaign)
    }

    pub fn campaign(&self, campaign_id: &str) -> SessionResult<Campaign> {
        self.fetch_campaign(campaign_id)?
            .ok_or_else(|| SessionError::CampaignNotFound {
                campaign_id: campaign_id.to_string(),
            })
    }

    pub fn list_campaigns(&self) -> SessionResult<Vec<Campaign>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT * FROM campaigns ORDER BY created_at ASC")?;
        let rows = stmt
            .query_map([], |row| Campaign::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Adds a finished session's counts to the campaign totals.
    pub fn record_campaign_totals(
        &self,
        campaign_id: &str,
        found: u32,
        posted: u32,
    ) -> SessionResult<Campaign> {
        let conn = self.open()?;
        let affected = conn.execute(
            "UPDATE campaigns
             SET links_found = links_found + ?2,
                 links_posted = links_posted + ?3,
                 updated_at = ?4
             WHERE campaign_id = ?1",
            params![
                campaign_id,
                found as i64,
                posted as i64,
                Utc::now().to_rfc3339()
            ],
        )?;
        if affected == 0 {
            return Err(SessionError::CampaignNotFound {
                campaign_id: campaign_id.to_string(),
            });
        }
        drop(conn);
        self.campaign(campaign_id)
    }

    /// Posted attempts recorded for the campaign on the given UTC day.
    pub fn posted_on(&self, campaign_id: &str, day: NaiveDate) -> SessionResult<u32> {
        let conn = self.open()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*)
             FROM posting_attempts a
             JOIN sessions s ON s.session_id = a.session_id
             WHERE s.campaign_id = ?1
               AND a.outcome = ?2
               AND substr(a.recorded_at, 1, 10) = ?3",
            params![
                campaign_id,
                AttemptOutcome::Posted.as_str(),
                day.format("%Y-%m-%d").to_string()
            ],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u32)
    }

    pub fn insert_session(&self, session: &Session) -> SessionResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO sessions (
                session_id, campaign_id, status, progress, current_step, criteria,
                result, error, started_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session.session_id,
                session.campaign_id,
                session.status.as_str(),
                session.progress as i64,
                session.current_step,
                serde_json::to_string(&session.criteria)?,
                session
                    .result
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                session.error,
                session.started_at.to_rfc3339(),
                session.completed_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn fetch_session(&self, session_id: &str) -> SessionResult<Option<Session>> {
        let conn = self.open()?;
        fetch_session_with(&conn, session_id)
    }

    pub fn list_sessions(&self, campaign_id: Option<&str>) -> SessionResult<Vec<Session>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM sessions
             WHERE (?1 IS NULL OR campaign_id = ?1)
             ORDER BY started_at DESC, session_id ASC",
        )?;
        let rows = stmt
            .query_map([campaign_id], |row| Session::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Moves progress forward. Refuses to go backwards or to touch a session
    /// that has already left `running`.
    pub fn update_progress(
        &self,
        session_id: &str,
        percent: u8,
        step: &str,
    ) -> SessionResult<Session> {
        if percent > 100 {
            return Err(SessionError::ProgressOutOfRange(percent));
        }
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = require_session(&tx, session_id)?;
        if current.status.terminal() {
            return Err(SessionError::NotRunning {
                session_id: session_id.to_string(),
                status: current.status,
            });
        }
        if percent < current.progress {
            return Err(SessionError::ProgressRegression {
                session_id: session_id.to_string(),
                current: current.progress,
                requested: percent,
            });
        }
        tx.execute(
            "UPDATE sessions SET progress = ?2, current_step = ?3 WHERE session_id = ?1",
            params![session_id, percent as i64, step],
        )?;
        let updated = require_session(&tx, session_id)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Moves a running session into a terminal status. A session that is
    /// already terminal is returned untouched.
    pub fn finish(
        &self,
        session_id: &str,
        status: SessionStatus,
        report: Option<&SessionReport>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> SessionResult<Transition> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = require_session(&tx, session_id)?;
        if current.status.terminal() {
            return Ok(Transition::AlreadyTerminal(current));
        }
        tx.execute(
            "UPDATE sessions
             SET status = ?2,
                 progress = 100,
                 current_step = ?3,
                 result = ?4,
                 error = ?5,
                 completed_at = ?6
             WHERE session_id = ?1",
            params![
                session_id,
                status.as_str(),
                status.as_str(),
                report.map(serde_json::to_string).transpose()?,
                error,
                now.to_rfc3339(),
            ],
        )?;
        let updated = require_session(&tx, session_id)?;
        tx.commit()?;
        Ok(Transition::Applied(updated))
    }

    /// Appends an attempt, assigning the next sequence number for its
    /// session. Returns the stored record.
    pub fn append_attempt(&self, attempt: &PostingAttempt) -> SessionResult<PostingAttempt> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        require_session(&tx, &attempt.session_id)?;
        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM posting_attempts WHERE session_id = ?1",
            [attempt.session_id.as_str()],
            |row| row.get(0),
        )?;
        let mut stored = attempt.clone();
        stored.sequence = next.max(1) as u32;
        tx.execute(
            "INSERT INTO posting_attempts (
                attempt_id, session_id, sequence, platform_key, target_url, content,
                content_provider, outcome, reason, evidence_url, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                stored.attempt_id,
                stored.session_id,
                stored.sequence as i64,
                stored.platform_key,
                stored.target_url,
                stored.content,
                stored.content_provider,
                stored.outcome.as_str(),
                stored.reason,
                stored.evidence_url,
                stored.recorded_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(stored)
    }

    pub fn list_attempts(&self, session_id: &str) -> SessionResult<Vec<PostingAttempt>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM posting_attempts WHERE session_id = ?1 ORDER BY sequence ASC",
        )?;
        let rows = stmt
            .query_map([session_id], |row| PostingAttempt::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn fetch_session_with(conn: &Connection, session_id: &str) -> SessionResult<Option<Session>> {
    let session = conn
        .query_row(
            "SELECT * FROM sessions WHERE session_id = ?1",
            [session_id],
            |row| Session::from_row(row),
        )
        .optional()?;
    Ok(session)
}

fn require_session(conn: &Connection, session_id: &str) -> SessionResult<Session> {
    fetch_session_with(conn, session_id)?.ok_or_else(|| SessionError::NotFound {
        session_id: session_id.to_string(),
    })
}
