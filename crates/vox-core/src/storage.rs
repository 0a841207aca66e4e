//! Artifact store contract
//!
//! Binary artifacts live in a private object store, keyed by a deterministic
//! path of the form `<prefix>/<userId>/<YYYY>/<MM>/<recordId>.<ext>`.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::generation::RecordKind;

/// Components from which an artifact path is derived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    pub kind: RecordKind,
    pub user_id: String,
    pub record_id: String,
    pub extension: String,
    pub at: DateTime<Utc>,
}

impl ArtifactKey {
    pub fn new(
        kind: RecordKind,
        user_id: impl Into<String>,
        record_id: impl Into<String>,
        extension: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
            record_id: record_id.into(),
            extension: extension.into(),
            at,
        }
    }

    /// Render the object storage key
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{:04}/{:02}/{}.{}",
            self.kind.storage_prefix(),
            self.user_id,
            self.at.year(),
            self.at.month(),
            self.record_id,
            self.extension
        )
    }
}

/// Owner segment of an artifact path (`<prefix>/<userId>/...`)
pub fn path_owner(path: &str) -> Option<&str> {
    let mut segments = path.split('/');
    segments.next()?;
    segments.next().filter(|s| !s.is_empty())
}

/// Retrieval URL served by the API's audio proxy
pub fn proxy_url(path: &str) -> String {
    format!("/api/audio/{}", path)
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredArtifact {
    pub path: String,
    /// Opaque backend handle allowing delete without a lookup
    pub file_id: Option<String>,
    pub url: String,
}

/// Downloaded artifact bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub length: usize,
}

/// Artifact store failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Delete failed: {0}")]
    Delete(String),

    #[error("Storage authorization failed: {0}")]
    Auth(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Durable storage for generated artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload bytes under the key's path. Either returns a usable path or fails.
    async fn upload(
        &self,
        key: &ArtifactKey,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredArtifact, StorageError>;

    /// Fetch an artifact by path
    async fn download(&self, path: &str) -> Result<DownloadedArtifact, StorageError>;

    /// Delete an artifact, using `file_id` when known
    async fn delete(&self, path: &str, file_id: Option<&str>) -> Result<(), StorageError>;

    /// Delete and log instead of failing; returns whether the delete succeeded
    async fn delete_best_effort(&self, path: &str, file_id: Option<&str>) -> bool {
        match self.delete(path, file_id).await {
            Ok(()) => {
                debug!("Deleted artifact {}", path);
                true
            }
            Err(e) => {
                warn!("Failed to delete artifact {}: {}", path, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_key_path() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        let key = ArtifactKey::new(RecordKind::Speech, "u1", "g1", "mp3", at);
        assert_eq!(key.path(), "audio/u1/2026/03/g1.mp3");

        let key = ArtifactKey::new(RecordKind::SoundEffect, "u2", "s9", "wav", at);
        assert_eq!(key.path(), "sound-effects/u2/2026/03/s9.wav");
    }

    #[test]
    fn test_path_owner() {
        assert_eq!(path_owner("audio/u1/2026/03/g1.mp3"), Some("u1"));
        assert_eq!(path_owner("audio"), None);
        assert_eq!(path_owner("audio//2026"), None);
    }

    #[test]
    fn test_proxy_url() {
        assert_eq!(
            proxy_url("music/u1/2026/01/m1.mp3"),
            "/api/audio/music/u1/2026/01/m1.mp3"
        );
    }
}
