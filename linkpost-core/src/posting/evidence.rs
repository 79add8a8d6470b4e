use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use url::Url;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot express {0} as a file url")]
    Path(PathBuf),
}

pub type EvidenceResult<T> = Result<T, EvidenceError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Screenshot,
    PageText,
    Note,
}

impl EvidenceKind {
    pub fn extension(&self) -> &'static str {
        match self {
            EvidenceKind::Screenshot => "png",
            EvidenceKind::PageText => "txt",
            EvidenceKind::Note => "note.txt",
        }
    }
}

/// Blob storage for attempt snapshots. Returns a URL the attempt record can
/// reference.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn store(
        &self,
        session_id: &str,
        attempt_id: &str,
        kind: EvidenceKind,
        bytes: &[u8],
    ) -> EvidenceResult<String>;
}

#[derive(Debug, Clone)]
pub struct FsEvidenceStore {
    root: PathBuf,
}

impl FsEvidenceStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, path: PathBuf) -> EvidenceResult<PathBuf> {
        if path.is_absolute() {
            return Ok(path);
        }
        std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .map_err(|source| EvidenceError::Io { path, source })
    }
}

#[async_trait]
impl EvidenceStore for FsEvidenceStore {
    async fn store(
        &self,
        session_id: &str,
        attempt_id: &str,
        kind: EvidenceKind,
        bytes: &[u8],
    ) -> EvidenceResult<String> {
        let dir = self.absolute(self.root.join(sanitise(session_id)))?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| EvidenceError::Io {
                path: dir.clone(),
                source,
            })?;
        let digest = hex::encode(Sha256::digest(bytes));
        let path = dir.join(format!(
            "{}-{}.{}",
            sanitise(attempt_id),
            &digest[..16],
            kind.extension()
        ));
        fs::write(&path, bytes)
            .await
            .map_err(|source| EvidenceError::Io {
                path: path.clone(),
                source,
            })?;
        Url::from_file_path(&path)
            .map(|url| url.to_string())
            .map_err(|_| EvidenceError::Path(path))
    }
}

/// Last-resort evidence reference that needs no storage at all.
pub fn inline_note_url(note: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(note.as_bytes()).collect();
    format!("data:text/plain;charset=utf-8,{encoded}")
}

fn sanitise(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
