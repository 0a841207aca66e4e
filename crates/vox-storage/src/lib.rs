//! vox-storage: artifact stores for Vox Studio
//!
//! - [`B2Client`]: Backblaze B2, private bucket
//! - [`MemoryArtifactStore`]: process-local, for development and tests

pub mod b2;
pub mod error;
pub mod memory;

use std::sync::Arc;

use tracing::{info, warn};
use vox_core::storage::ArtifactStore;
use vox_core::{StorageBackend, StorageConfig};

pub use b2::{encode_file_name, B2Client, B2File};
pub use error::{Result, StorageBackendError};
pub use memory::MemoryArtifactStore;

/// Build the configured artifact store
pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn ArtifactStore>> {
    match config.backend {
        StorageBackend::B2 => {
            let b2 = config.b2.clone().ok_or_else(|| {
                StorageBackendError::Config("storage.b2 section is missing".to_string())
            })?;
            info!("Using B2 artifact storage (bucket {})", b2.bucket_name);
            Ok(Arc::new(B2Client::new(b2)?))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory artifact storage; artifacts are lost on restart");
            Ok(Arc::new(MemoryArtifactStore::new()))
        }
    }
}
