use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::BrowserConfig;

use super::error::{BrowserError, BrowserResult};

/// Throwaway user-data directory for one browser launch.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    id: String,
    path: PathBuf,
    created_at: DateTime<Utc>,
}

impl BrowserProfile {
    pub fn new(base: &Path) -> BrowserResult<Self> {
        let id = Uuid::new_v4().to_string();
        let path = base.join(&id);
        std::fs::create_dir_all(&path)
            .map_err(|err| BrowserError::Profile(format!("failed to create profile dir: {err}")))?;
        Ok(Self {
            id,
            path,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn touch(&self) -> BrowserResult<()> {
        let marker = self.path.join(".last_used");
        let mut file = fs::File::create(&marker).await.map_err(|err| {
            BrowserError::Profile(format!("failed to write profile marker: {err}"))
        })?;
        file.write_all(Utc::now().to_rfc3339().as_bytes())
            .await
            .map_err(|err| BrowserError::Profile(format!("failed to update profile marker: {err}")))?;
        Ok(())
    }

    pub fn remove(&self) -> BrowserResult<()> {
        if self.path.exists() {
            std::fs::remove_dir_all(&self.path).map_err(|err| {
                BrowserError::Profile(format!("failed to remove profile dir: {err}"))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ProfileManager {
    base_dir: PathBuf,
    ttl: Duration,
}

impl ProfileManager {
    pub fn new<P: AsRef<Path>>(base_dir: P, ttl: Duration) -> BrowserResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to create profile base dir: {err}"))
        })?;
        Ok(Self { base_dir, ttl })
    }

    pub fn from_config(config: &BrowserConfig, base_dir: &Path) -> BrowserResult<Self> {
        let ttl = Duration::from_secs(config.profile_ttl_hours.max(1) * 60 * 60);
        Self::new(base_dir, ttl)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn allocate(&self) -> BrowserResult<BrowserProfile> {
        BrowserProfile::new(&self.base_dir)
    }

    /// Removes profile directories untouched for longer than the TTL.
    /// Returns how many were removed.
    pub fn cleanup_expired(&self) -> BrowserResult<usize> {
        let now = SystemTime::now();
        let entries = std::fs::read_dir(&self.base_dir).map_err(|err| {
            BrowserError::Profile(format!("failed to list profile directory: {err}"))
        })?;
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to read profile metadata");
                    continue;
                }
            };
            if let Ok(modified) = metadata.modified() {
                if now.duration_since(modified).unwrap_or(Duration::ZERO) > self.ttl {
                    match std::fs::remove_dir_all(&path) {
                        Ok(()) => removed += 1,
                        Err(err) => {
                            tracing::warn!(path = %path.display(), error = %err, "failed to remove expired profile")
                        }
                    }
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn allocates_and_keeps_fresh_profiles() {
        let dir = tempdir().unwrap();
        let manager = ProfileManager::new(dir.path(), Duration::from_secs(3600)).unwrap();
        let profile = manager.allocate().unwrap();
        profile.touch().await.unwrap();
        assert!(profile.path().join(".last_used").exists());
        assert_eq!(manager.cleanup_expired().unwrap(), 0);
        assert!(profile.path().exists());
        profile.remove().unwrap();
        assert!(!profile.path().exists());
    }

    #[test]
    fn zero_ttl_expires_everything() {
        let dir = tempdir().unwrap();
        let manager = ProfileManager::new(dir.path(), Duration::ZERO).unwrap();
        let profile = manager.allocate().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(manager.cleanup_expired().unwrap(), 1);
        assert!(!profile.path().exists());
    }
}
