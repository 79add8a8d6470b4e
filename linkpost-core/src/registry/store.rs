use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};

use crate::sqlite::open_connection;

use super::models::{
    updated_success_rate, Platform, PlatformFilter, RegistryStats, UpsertOutcome,
};
use super::{RegistryError, RegistryResult};

const PLATFORM_SCHEMA: &str = include_str!("../../../sql/platforms.sql");

#[derive(Debug, Clone)]
pub struct SqlitePlatformStoreBuilder {
    path: Option<PathBuf>,
    create_if_missing: bool,
}

impl Default for SqlitePlatformStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
        }
    }
}

impl SqlitePlatformStoreBuilder {
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

    pub fn build(self) -> RegistryResult<SqlitePlatformStore> {
        let path = self.path.ok_or_else(|| RegistryError::InvalidValue {
            field: "path",
            value: "platform store path not configured".into(),
        })?;
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqlitePlatformStore { path, flags })
    }
}

/// Outcome of an atomic read-modify-write on one platform row.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeUpdate {
    pub platform: Platform,
    pub previous_rate: f64,
    pub deactivated: bool,
}

#[derive(Debug, Clone)]
pub struct SqlitePlatformStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqlitePlatformStore {
    pub fn builder() -> SqlitePlatformStoreBuilder {
        SqlitePlatformStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> RegistryResult<Self> {
        SqlitePlatformStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> RegistryResult<Connection> {
        open_connection(&self.path, self.flags).map_err(|source| RegistryError::OpenDatabase {
            path: self.path.clone(),
            source,
        })
    }

    pub fn initialize(&self) -> RegistryResult<()> {
        let conn = self.open()?;
        conn.execute_batch(PLATFORM_SCHEMA)?;
        Ok(())
    }

    pub fn fetch(&self, key: &str) -> RegistryResult<Option<Platform>> {
        let conn = self.open()?;
        let platform = conn
            .query_row(
                "SELECT * FROM platforms WHERE platform_key = ?1",
                [key],
                |row| Platform::from_row(row),
            )
            .optional()?;
        Ok(platform)
    }

    pub fn list(&self, filter: &PlatformFilter) -> RegistryResult<Vec<Platform>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM platforms
             WHERE (?1 IS NULL OR category = ?1)
               AND (?2 OR active = 1)
             ORDER BY authority DESC, success_rate DESC, platform_key ASC
             LIMIT ?3",
        )?;
        let limit = filter.limit.map(|value| value as i64).unwrap_or(-1);
        let rows = stmt
            .query_map(
                params![
                    filter.category.map(|category| category.as_str()),
                    filter.include_inactive,
                    limit
                ],
                |row| Platform::from_row(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Active platforms at or above the authority floor, unordered.
    pub fn eligible(&self, min_authority: u8) -> RegistryResult<Vec<Platform>> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT * FROM platforms WHERE active = 1 AND authority >= ?1")?;
        let rows = stmt
            .query_map([min_authority as i64], |row| Platform::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert(&self, platform: &Platform) -> RegistryResult<()> {
        let conn = self.open()?;
        insert_platform(&conn, platform)?;
        Ok(())
    }

    /// Inserts the platform when its key is new, otherwise only refreshes
    /// the verification timestamp. Statistics of an existing row are never
    /// touched.
    pub fn insert_or_refresh(
        &self,
        platform: &Platform,
        checked_at: DateTime<Utc>,
    ) -> RegistryResult<UpsertOutcome> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let affected = tx.execute(
            "UPDATE platforms SET last_checked_at = ?2 WHERE platform_key = ?1",
            params![platform.key, checked_at.to_rfc3339()],
        )?;
        let outcome = if affected > 0 {
            UpsertOutcome::Refreshed
        } else {
            insert_platform(&tx, platform)?;
            UpsertOutcome::Inserted
        };
        tx.commit()?;
        Ok(outcome)
    }

    /// Applies one completed attempt to the platform's statistics inside an
    /// immediate transaction.
    pub fn apply_outcome(
        &self,
        key: &str,
        success: bool,
        floor: f64,
        window: u32,
        now: DateTime<Utc>,
    ) -> RegistryResult<OutcomeUpdate> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = tx
            .query_row(
                "SELECT * FROM platforms WHERE platform_key = ?1",
                [key],
                |row| Platform::from_row(row),
            )
            .optional()?
            .ok_or_else(|| RegistryError::NotFound {
                key: key.to_string(),
            })?;

        let previous_rate = current.success_rate;
        let mut next = current;
        next.success_rate = updated_success_rate(previous_rate, success);
        next.times_used = next.times_used.saturating_add(1);
        next.last_used_at = Some(now);
        next.below_floor_streak = if next.success_rate < floor {
            next.below_floor_streak.saturating_add(1)
        } else {
            0
        };
        let deactivated = next.active && window > 0 && next.below_floor_streak >= window;
        if deactivated {
            next.active = false;
            next.deactivated_at = Some(now);
        }

        tx.execute(
            "UPDATE platforms
             SET success_rate = ?2,
                 times_used = ?3,
                 last_used_at = ?4,
                 below_floor_streak = ?5,
                 active = ?6,
                 deactivated_at = ?7
             WHERE platform_key = ?1",
            params![
                key,
                next.success_rate,
                next.times_used as i64,
                now.to_rfc3339(),
                next.below_floor_streak as i64,
                next.active,
                next.deactivated_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        tx.commit()?;
        Ok(OutcomeUpdate {
            platform: next,
            previous_rate,
            deactivated,
        })
    }

    pub fn set_active(
        &self,
        key: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> RegistryResult<Platform> {
        let conn = self.open()?;
        let affected = conn.execute(
            "UPDATE platforms
             SET active = ?2,
                 deactivated_at = CASE WHEN ?2 THEN NULL ELSE ?3 END,
                 below_floor_streak = CASE WHEN ?2 THEN 0 ELSE below_floor_streak END
             WHERE platform_key = ?1",
            params![key, active, now.to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(RegistryError::NotFound {
                key: key.to_string(),
            });
        }
        drop(conn);
        self.fetch(key)?.ok_or_else(|| RegistryError::NotFound {
            key: key.to_string(),
        })
    }

    /// Seed-list import: new keys are inserted, existing keys get their
    /// descriptive metadata refreshed while statistics stay untouched.
    pub fn import(&self, platforms: &[Platform], now: DateTime<Utc>) -> RegistryResult<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for platform in platforms {
            let existing = tx
                .query_row(
                    "SELECT 1 FROM platforms WHERE platform_key = ?1",
                    [platform.key.as_str()],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            if existing.is_some() {
                tx.execute(
                    "UPDATE platforms
                     SET url = ?2, category = ?3, mechanism = ?4, authority = ?5,
                         difficulty = ?6, needs_registration = ?7, instant_publish = ?8,
                         supports_html = ?9, min_content_chars = ?10, max_content_chars = ?11,
                         trust = ?12, last_checked_at = ?13
                     WHERE platform_key = ?1",
                    params![
                        platform.key,
                        platform.url,
                        platform.category.as_str(),
                        platform.mechanism.as_str(),
                        platform.authority as i64,
                        platform.difficulty.as_str(),
                        platform.capabilities.needs_registration,
                        platform.capabilities.instant_publish,
                        platform.capabilities.supports_html,
                        platform.min_content_chars.map(|value| value as i64),
                        platform.max_content_chars.map(|value| value as i64),
                        platform.trust.as_str(),
                        now.to_rfc3339(),
                    ],
                )?;
            } else {
                insert_platform(&tx, platform)?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn stats(&self) -> RegistryResult<RegistryStats> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT category, COUNT(*) FROM platforms GROUP BY category")?;
        let mut by_category = HashMap::new();
        for row in stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })? {
            let (category, count) = row?;
            by_category.insert(category, count as usize);
        }
        let (total, active, average): (i64, i64, Option<f64>) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(active), 0), AVG(success_rate) FROM platforms",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(RegistryStats {
            total: total as usize,
            active: active as usize,
            by_category,
            average_success_rate: average.unwrap_or(0.0),
        })
    }
}

fn insert_platform(conn: &Connection, platform: &Platform) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO platforms (
            platform_key, url, category, mechanism, authority, difficulty, success_rate,
            times_used, last_used_at, needs_registration, instant_publish, supports_html,
            min_content_chars, max_content_chars, trust, active, below_floor_streak,
            created_at, last_checked_at, deactivated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
            ?18, ?19, ?20
        )",
        params![
            platform.key,
            platform.url,
            platform.category.as_str(),
            platform.mechanism.as_str(),
            platform.authority as i64,
            platform.difficulty.as_str(),
            platform.success_rate,
            platform.times_used as i64,
            platform.last_used_at.map(|dt| dt.to_rfc3339()),
            platform.capabilities.needs_registration,
            platform.capabilities.instant_publish,
            platform.capabilities.supports_html,
            platform.min_content_chars.map(|value| value as i64),
            platform.max_content_chars.map(|value| value as i64),
            platform.trust.as_str(),
            platform.active,
            platform.below_floor_streak as i64,
            platform.created_at.unwrap_or_else(Utc::now).to_rfc3339(),
            platform.last_checked_at.map(|dt| dt.to_rfc3339()),
            platform.deactivated_at.map(|dt| dt.to_rfc3339()),
        ],
    )
}
