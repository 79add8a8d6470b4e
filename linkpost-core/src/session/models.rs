use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::models::parse_timestamp;
use crate::registry::{PlatformCategory, SelectionCriteria};

use super::error::SessionError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Paused,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Paused => "paused",
        }
    }

    pub fn terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            "paused" => Ok(SessionStatus::Paused),
            other => Err(SessionError::InvalidValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Posted,
    Failed,
    NeedsReview,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Posted => "posted",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::NeedsReview => "needs_review",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptOutcome {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posted" => Ok(AttemptOutcome::Posted),
            "failed" => Ok(AttemptOutcome::Failed),
            "needs_review" => Ok(AttemptOutcome::NeedsReview),
            other => Err(SessionError::InvalidValue {
                field: "outcome",
                value: other.to_string(),
            }),
        }
    }
}

/// Identity used to fill name/email/website fields on target forms.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PosterIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub campaign_id: String,
    pub target_url: String,
    pub keywords: Vec<String>,
    pub anchors: Vec<String>,
    pub categories: Vec<PlatformCategory>,
    pub identity: Option<PosterIdentity>,
    pub daily_quota: Option<u32>,
    pub total_quota: u32,
    pub links_found: u64,
    pub links_posted: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Campaign {
    pub fn new(target_url: impl Into<String>, total_quota: u32) -> Self {
        Self {
            campaign_id: format!("cmp-{}", Uuid::new_v4().simple()),
            target_url: target_url.into(),
            keywords: Vec::new(),
            anchors: Vec::new(),
            categories: Vec::new(),
            identity: None,
            daily_quota: None,
            total_quota,
            links_found: 0,
            links_posted: 0,
            created_at: None,
            updated_at: None,
        }
    }

    /// Posts still owed to the campaign. With a daily quota set, posts
    /// already made on the current UTC day count against it.
    pub fn remaining_quota(&self, posted_today: u32) -> u32 {
        let remaining = (self.total_quota as u64).saturating_sub(self.links_posted) as u32;
        match self.daily_quota {
            Some(daily) => remaining.min(daily.saturating_sub(posted_today)),
            None => remaining,
        }
    }

    pub fn primary_keyword(&self) -> &str {
        self.keywords.first().map(String::as_str).unwrap_or("")
    }

    pub fn primary_anchor(&self) -> &str {
        self.anchors
            .first()
            .map(String::as_str)
            .unwrap_or(self.target_url.as_str())
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            campaign_id: row.get("campaign_id")?,
            target_url: row.get("target_url")?,
            keywords: json_column(row, "keywords")?,
            anchors: json_column(row, "anchors")?,
            categories: json_column(row, "categories")?,
            identity: match row.get::<_, Option<String>>("identity")? {
                Some(raw) => Some(decode_json(&raw)?),
                None => None,
            },
            daily_quota: row
                .get::<_, Option<i64>>("daily_quota")?
                .map(|value| value.max(0) as u32),
            total_quota: row.get::<_, i64>("total_quota")?.max(0) as u32,
            links_found: row.get::<_, i64>("links_found")?.max(0) as u64,
            links_posted: row.get::<_, i64>("links_posted")?.max(0) as u64,
            created_at: parse_timestamp(row.get("created_at")?),
            updated_at: parse_timestamp(row.get("updated_at")?),
        })
    }
}

/// Platform criteria supplied when a session is started.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlatformCriteria {
    pub min_authority: u8,
    pub categories: Vec<PlatformCategory>,
}

impl PlatformCriteria {
    pub fn to_selection(&self, exclude: HashSet<String>) -> SelectionCriteria {
        SelectionCriteria {
            min_authority: self.min_authority,
            categories: self.categories.clone(),
            exclude,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    TargetReached,
    Exhausted,
    NoneAvailable,
    Budget,
    Stopped,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::TargetReached => "target_reached",
            Termination::Exhausted => "exhausted",
            Termination::NoneAvailable => "none_available",
            Termination::Budget => "budget",
            Termination::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured payload attached to a session once it leaves `running`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionReport {
    pub termination: Termination,
    pub posts_target: u32,
    pub posts_found: u32,
    pub posts_posted: u32,
    pub needs_review: u32,
    pub attempts_failed: u32,
    pub review_queue: Vec<String>,
    pub posted_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub campaign_id: String,
    pub status: SessionStatus,
    pub progress: u8,
    pub current_step: String,
    pub criteria: PlatformCriteria,
    pub result: Option<SessionReport>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(campaign_id: impl Into<String>, criteria: PlatformCriteria) -> Self {
        Self {
            session_id: format!("ses-{}", Uuid::new_v4().simple()),
            campaign_id: campaign_id.into(),
            status: SessionStatus::Running,
            progress: 0,
            current_step: "queued".into(),
            criteria,
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get("status")?;
        Ok(Self {
            session_id: row.get("session_id")?,
            campaign_id: row.get("campaign_id")?,
            status: status.parse().map_err(conversion_error)?,
            progress: row.get::<_, i64>("progress")?.clamp(0, 100) as u8,
            current_step: row.get("current_step")?,
            criteria: json_column(row, "criteria")?,
            result: match row.get::<_, Option<String>>("result")? {
                Some(raw) => Some(decode_json(&raw)?),
                None => None,
            },
            error: row.get("error")?,
            started_at: parse_timestamp(row.get("started_at")?).unwrap_or_else(Utc::now),
            completed_at: parse_timestamp(row.get("completed_at")?),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostingAttempt {
    pub attempt_id: String,
    pub session_id: String,
    /// Position in completion order, assigned when the attempt is appended.
    pub sequence: u32,
    pub platform_key: String,
    pub target_url: String,
    pub content: String,
    pub content_provider: String,
    pub outcome: AttemptOutcome,
    pub reason: Option<String>,
    pub evidence_url: String,
    pub recorded_at: DateTime<Utc>,
}

impl PostingAttempt {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let outcome: String = row.get("outcome")?;
        Ok(Self {
            attempt_id: row.get("attempt_id")?,
            session_id: row.get("session_id")?,
            sequence: row.get::<_, i64>("sequence")?.max(0) as u32,
            platform_key: row.get("platform_key")?,
            target_url: row.get("target_url")?,
            content: row.get("content")?,
            content_provider: row.get("content_provider")?,
            outcome: outcome.parse().map_err(conversion_error)?,
            reason: row.get("reason")?,
            evidence_url: row.get("evidence_url")?,
            recorded_at: parse_timestamp(row.get("recorded_at")?).unwrap_or_else(Utc::now),
        })
    }
}

fn conversion_error(err: SessionError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    decode_json(&raw)
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}
