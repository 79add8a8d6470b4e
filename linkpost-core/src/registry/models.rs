use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{RegistryError, RegistryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformCategory {
    CommentForm,
    ArticleApi,
    ProfileCreation,
    DirectoryListing,
}

impl PlatformCategory {
    pub const ALL: [PlatformCategory; 4] = [
        PlatformCategory::CommentForm,
        PlatformCategory::ArticleApi,
        PlatformCategory::ProfileCreation,
        PlatformCategory::DirectoryListing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformCategory::CommentForm => "comment_form",
            PlatformCategory::ArticleApi => "article_api",
            PlatformCategory::ProfileCreation => "profile_creation",
            PlatformCategory::DirectoryListing => "directory_listing",
        }
    }

    /// Short-form categories where the link may appear only once.
    pub fn is_short_form(&self) -> bool {
        matches!(
            self,
            PlatformCategory::CommentForm | PlatformCategory::ProfileCreation
        )
    }
}

impl fmt::Display for PlatformCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformCategory {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comment_form" | "comment" => Ok(PlatformCategory::CommentForm),
            "article_api" | "article" => Ok(PlatformCategory::ArticleApi),
            "profile_creation" | "profile" => Ok(PlatformCategory::ProfileCreation),
            "directory_listing" | "directory" => Ok(PlatformCategory::DirectoryListing),
            other => Err(RegistryError::InvalidValue {
                field: "category",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationMechanism {
    InstantApi,
    OAuth,
    ApiKey,
    FormSubmission,
}

impl AutomationMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationMechanism::InstantApi => "instant_api",
            AutomationMechanism::OAuth => "oauth",
            AutomationMechanism::ApiKey => "api_key",
            AutomationMechanism::FormSubmission => "form_submission",
        }
    }
}

impl fmt::Display for AutomationMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutomationMechanism {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instant_api" => Ok(AutomationMechanism::InstantApi),
            "oauth" => Ok(AutomationMechanism::OAuth),
            "api_key" => Ok(AutomationMechanism::ApiKey),
            "form_submission" => Ok(AutomationMechanism::FormSubmission),
            other => Err(RegistryError::InvalidValue {
                field: "mechanism",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(RegistryError::InvalidValue {
                field: "difficulty",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlatformTrust {
    #[default]
    Provisional,
    Trusted,
}

impl PlatformTrust {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformTrust::Provisional => "provisional",
            PlatformTrust::Trusted => "trusted",
        }
    }
}

impl FromStr for PlatformTrust {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provisional" => Ok(PlatformTrust::Provisional),
            "trusted" => Ok(PlatformTrust::Trusted),
            other => Err(RegistryError::InvalidValue {
                field: "trust",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Capabilities {
    pub needs_registration: bool,
    pub instant_publish: bool,
    pub supports_html: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Platform {
    pub key: String,
    pub url: String,
    pub category: PlatformCategory,
    pub mechanism: AutomationMechanism,
    pub authority: u8,
    pub difficulty: Difficulty,
    pub success_rate: f64,
    pub times_used: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub capabilities: Capabilities,
    pub min_content_chars: Option<usize>,
    pub max_content_chars: Option<usize>,
    pub trust: PlatformTrust,
    pub active: bool,
    pub below_floor_streak: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Platform {
    pub fn new(
        url: &str,
        category: PlatformCategory,
        mechanism: AutomationMechanism,
    ) -> RegistryResult<Self> {
        Ok(Self {
            key: platform_key(url)?,
            url: url.to_string(),
            category,
            mechanism,
            authority: 0,
            difficulty: Difficulty::Medium,
            success_rate: 0.0,
            times_used: 0,
            last_used_at: None,
            capabilities: Capabilities::default(),
            min_content_chars: None,
            max_content_chars: None,
            trust: PlatformTrust::Provisional,
            active: true,
            below_floor_streak: 0,
            created_at: None,
            last_checked_at: None,
            deactivated_at: None,
        })
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get("platform_key")?,
            url: row.get("url")?,
            category: parse_column(row, "category")?,
            mechanism: parse_column(row, "mechanism")?,
            authority: row.get::<_, i64>("authority")?.clamp(0, 100) as u8,
            difficulty: parse_column(row, "difficulty")?,
            success_rate: row.get("success_rate")?,
            times_used: row.get::<_, i64>("times_used")?.max(0) as u64,
            last_used_at: parse_timestamp(row.get("last_used_at")?),
            capabilities: Capabilities {
                needs_registration: row.get::<_, i64>("needs_registration")? != 0,
                instant_publish: row.get::<_, i64>("instant_publish")? != 0,
                supports_html: row.get::<_, i64>("supports_html")? != 0,
            },
            min_content_chars: row
                .get::<_, Option<i64>>("min_content_chars")?
                .map(|value| value.max(0) as usize),
            max_content_chars: row
                .get::<_, Option<i64>>("max_content_chars")?
                .map(|value| value.max(0) as usize),
            trust: parse_column(row, "trust")?,
            active: row.get::<_, i64>("active")? != 0,
            below_floor_streak: row.get::<_, i64>("below_floor_streak")?.max(0) as u32,
            created_at: parse_timestamp(row.get("created_at")?),
            last_checked_at: parse_timestamp(row.get("last_checked_at")?),
            deactivated_at: parse_timestamp(row.get("deactivated_at")?),
        })
    }
}

fn parse_column<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = RegistryError>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|err: RegistryError| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}

pub(crate) fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalises a platform URL into its registry key: lower-case host without
/// `www.`, followed by the path without a trailing slash.
pub fn platform_key(raw: &str) -> RegistryResult<String> {
    let parsed = Url::parse(raw.trim()).map_err(|err| RegistryError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    let host = parsed
        .host_str()
        .ok_or_else(|| RegistryError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".into(),
        })?
        .to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    let path = parsed.path().trim_end_matches('/');
    Ok(format!("{host}{path}"))
}

/// Exponential moving average applied after every completed attempt.
pub fn updated_success_rate(old_rate: f64, success: bool) -> f64 {
    let decayed = old_rate * 0.8;
    let next = if success { decayed + 100.0 * 0.2 } else { decayed };
    next.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionCriteria {
    pub min_authority: u8,
    /// Empty means every category is allowed.
    pub categories: Vec<PlatformCategory>,
    pub exclude: HashSet<String>,
}

impl SelectionCriteria {
    pub fn allows(&self, platform: &Platform) -> bool {
        platform.active
            && platform.authority >= self.min_authority
            && (self.categories.is_empty() || self.categories.contains(&platform.category))
    }

    pub fn excluding(mut self, key: impl Into<String>) -> Self {
        self.exclude.insert(key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Selected(Platform),
    /// No active platform matches the criteria at all.
    NoneAvailable,
    /// Eligible platforms exist but every one of them is already excluded.
    Exhausted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformCandidate {
    pub url: String,
    pub category: PlatformCategory,
    #[serde(default = "default_mechanism")]
    pub mechanism: AutomationMechanism,
    #[serde(default)]
    pub authority_estimate: Option<u8>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub min_content_chars: Option<usize>,
    #[serde(default)]
    pub max_content_chars: Option<usize>,
    #[serde(default)]
    pub trust: PlatformTrust,
    #[serde(default)]
    pub source: Option<String>,
}

fn default_mechanism() -> AutomationMechanism {
    AutomationMechanism::FormSubmission
}

impl PlatformCandidate {
    pub fn new(url: impl Into<String>, category: PlatformCategory) -> Self {
        Self {
            url: url.into(),
            category,
            mechanism: AutomationMechanism::FormSubmission,
            authority_estimate: None,
            difficulty: Difficulty::Medium,
            capabilities: Capabilities::default(),
            min_content_chars: None,
            max_content_chars: None,
            trust: PlatformTrust::Provisional,
            source: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Refreshed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformFilter {
    pub category: Option<PlatformCategory>,
    pub include_inactive: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub by_category: HashMap<String, usize>,
    pub average_success_rate: f64,
}
