//! Pipeline error taxonomy

use std::fmt;

use thiserror::Error;

use crate::provider::ProviderError;
use crate::quota::QuotaDenial;
use crate::storage::StorageError;

pub const PERSIST_RECORD_CONTEXT: &str = "Failed to persist generation after uploading audio";
pub const COMMIT_USAGE_CONTEXT: &str = "Failed to record usage after persisting generation";

/// A compensating delete that did not go through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// What was left behind, e.g. `artifact audio/u1/2026/03/g1.mp3`
    pub resource: String,
    pub cause: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.resource, self.cause)
    }
}

/// Primary persistence failure with any cleanup failures attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceFailure {
    pub context: &'static str,
    pub cause: String,
    pub cleanup_failures: Vec<CleanupFailure>,
}

impl PersistenceFailure {
    pub fn new(
        context: &'static str,
        cause: impl fmt::Display,
        cleanup_failures: Vec<CleanupFailure>,
    ) -> Self {
        Self {
            context,
            cause: cause.to_string(),
            cleanup_failures,
        }
    }

    pub fn cleanup_succeeded(&self) -> bool {
        self.cleanup_failures.is_empty()
    }
}

impl fmt::Display for PersistenceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.cause)?;
        if !self.cleanup_failures.is_empty() {
            let failures = self
                .cleanup_failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            write!(f, "; cleanup also failed: {}", failures)?;
        }
        Ok(())
    }
}

/// Reason a pipeline run or ledger operation was aborted
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error(
        "Usage limit exceeded for {}: attempted {} of {}",
        .0.dimension, .0.attempted, .0.limit
    )]
    QuotaDenied(QuotaDenial),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Persistence(PersistenceFailure),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// HTTP status reflecting the failure class
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::QuotaDenied(_) => 403,
            Self::Provider(e) => match e {
                ProviderError::Http { status: 429, .. } => 429,
                ProviderError::NotConfigured(_) | ProviderError::Unsupported { .. } => 400,
                ProviderError::Timeout(_) => 504,
                _ => 502,
            },
            Self::Storage(StorageError::NotFound(_)) | Self::NotFound(_) => 404,
            Self::Storage(_) | Self::Persistence(_) | Self::Internal(_) => 500,
        }
    }
}

impl From<crate::Error> for PipelineError {
    fn from(e: crate::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;
    use crate::quota::Dimension;

    #[test]
    fn test_persistence_message_includes_cleanup_failures() {
        let failure = PersistenceFailure::new(
            PERSIST_RECORD_CONTEXT,
            "disk full",
            vec![CleanupFailure {
                resource: "artifact audio/u1/2026/03/g1.mp3".to_string(),
                cause: "Delete failed: 503".to_string(),
            }],
        );
        let message = PipelineError::Persistence(failure).to_string();

        assert!(message.starts_with("Failed to persist generation after uploading audio: disk full"));
        assert!(message.contains("artifact audio/u1/2026/03/g1.mp3"));
        assert!(message.contains("Delete failed: 503"));
    }

    #[test]
    fn test_status_codes() {
        let denial = QuotaDenial {
            dimension: Dimension::Characters,
            attempted: 10010.0,
            limit: 10000.0,
        };
        assert_eq!(PipelineError::validation("bad").status_code(), 400);
        assert_eq!(PipelineError::QuotaDenied(denial).status_code(), 403);
        assert_eq!(PipelineError::NotFound("Generation".into()).status_code(), 404);
        assert_eq!(
            PipelineError::Provider(ProviderError::Http {
                provider: ProviderKind::ElevenLabs,
                status: 401,
                message: "bad key".into(),
            })
            .status_code(),
            502
        );
        assert_eq!(
            PipelineError::Provider(ProviderError::Http {
                provider: ProviderKind::ElevenLabs,
                status: 429,
                message: "slow down".into(),
            })
            .status_code(),
            429
        );
        assert_eq!(
            PipelineError::Storage(StorageError::Upload("boom".into())).status_code(),
            500
        );
    }

    #[test]
    fn test_quota_denied_message() {
        let err = PipelineError::QuotaDenied(QuotaDenial {
            dimension: Dimension::Characters,
            attempted: 10010.0,
            limit: 10000.0,
        });
        assert_eq!(
            err.to_string(),
            "Usage limit exceeded for characters: attempted 10010 of 10000"
        );
    }
}
