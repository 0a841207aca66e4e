//! Error types for vox-storage

use thiserror::Error;
use vox_core::storage::StorageError;

/// Backend failure before it is classified by operation
#[derive(Error, Debug)]
pub enum StorageBackendError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageBackendError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }

    pub fn upload(self) -> StorageError {
        self.classify(StorageError::Upload)
    }

    pub fn download(self) -> StorageError {
        self.classify(StorageError::Download)
    }

    pub fn delete(self) -> StorageError {
        self.classify(StorageError::Delete)
    }

    fn classify(self, op: fn(String) -> StorageError) -> StorageError {
        match self {
            Self::NotFound(path) => StorageError::NotFound(path),
            Self::Api { status: 401 | 403, message } => StorageError::Auth(message),
            Self::Config(message) => StorageError::Config(message),
            other => op(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorageBackendError>;
