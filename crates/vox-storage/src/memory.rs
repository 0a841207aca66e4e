//! In-memory artifact store for development and tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use vox_core::storage::{
    proxy_url, ArtifactKey, ArtifactStore, DownloadedArtifact, StorageError, StoredArtifact,
};

#[derive(Debug, Clone)]
struct Object {
    file_id: String,
    bytes: Vec<u8>,
    content_type: String,
}

/// Artifacts held in a process-local map. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: RwLock<HashMap<String, Object>>,
    next_id: AtomicU64,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.objects.read().await.contains_key(path)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn upload(
        &self,
        key: &ArtifactKey,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredArtifact, StorageError> {
        let path = key.path();
        let file_id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        debug!("Stored {} in memory ({} bytes)", path, bytes.len());

        self.objects.write().await.insert(
            path.clone(),
            Object {
                file_id: file_id.clone(),
                bytes,
                content_type: content_type.to_string(),
            },
        );

        Ok(StoredArtifact {
            url: proxy_url(&path),
            path,
            file_id: Some(file_id),
        })
    }

    async fn download(&self, path: &str) -> Result<DownloadedArtifact, StorageError> {
        let objects = self.objects.read().await;
        let object = objects
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;

        Ok(DownloadedArtifact {
            bytes: object.bytes.clone(),
            content_type: object.content_type.clone(),
            length: object.bytes.len(),
        })
    }

    async fn delete(&self, path: &str, file_id: Option<&str>) -> Result<(), StorageError> {
        let mut objects = self.objects.write().await;
        match objects.get(path) {
            Some(object) if file_id.is_some_and(|id| id != object.file_id) => Err(
                StorageError::Delete(format!("file id mismatch for {}", path)),
            ),
            Some(_) => {
                objects.remove(path);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vox_core::generation::RecordKind;

    fn key(id: &str) -> ArtifactKey {
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        ArtifactKey::new(RecordKind::SoundEffect, "u1", id, "mp3", at)
    }

    #[tokio::test]
    async fn test_upload_download_delete() {
        let store = MemoryArtifactStore::new();
        let stored = store.upload(&key("g1"), b"boom".to_vec(), "audio/mpeg").await.unwrap();
        assert_eq!(stored.path, "sound-effects/u1/2026/01/g1.mp3");
        assert_eq!(stored.file_id.as_deref(), Some("mem-1"));

        let artifact = store.download(&stored.path).await.unwrap();
        assert_eq!(artifact.bytes, b"boom");
        assert_eq!(artifact.content_type, "audio/mpeg");

        store.delete(&stored.path, stored.file_id.as_deref()).await.unwrap();
        assert!(store.is_empty().await);
        assert!(matches!(
            store.download(&stored.path).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_checks_file_id() {
        let store = MemoryArtifactStore::new();
        let stored = store.upload(&key("g2"), vec![1], "audio/mpeg").await.unwrap();

        assert!(store.delete(&stored.path, Some("mem-99")).await.is_err());
        assert!(store.contains(&stored.path).await);

        store.delete(&stored.path, None).await.unwrap();
        assert!(store.delete(&stored.path, None).await.is_ok());
    }
}
