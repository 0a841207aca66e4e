//! Error types for vox-voice

use thiserror::Error;
use vox_core::provider::{ProviderError, ProviderKind};

/// vox-voice error type
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Provider rejected request ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Audio decoding error: {0}")]
    Decoding(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VoiceError {
    /// Map a transport error, keeping timeouts distinct
    pub fn from_send(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e.to_string())
        }
    }

    /// Attach the provider identity for the gateway
    pub fn into_provider_error(self, provider: ProviderKind) -> ProviderError {
        match self {
            Self::Api { status, message } => ProviderError::Http {
                provider,
                status,
                message,
            },
            Self::Timeout => ProviderError::Timeout(provider),
            Self::Request(message) => ProviderError::Unreachable { provider, message },
            Self::Unsupported(operation) => ProviderError::Unsupported { provider, operation },
            other => ProviderError::InvalidResponse {
                provider,
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_keeps_status() {
        let err = VoiceError::Api {
            status: 429,
            message: "quota exceeded".to_string(),
        }
        .into_provider_error(ProviderKind::ElevenLabs);
        assert_eq!(err.upstream_status(), Some(429));
        assert_eq!(err.to_string(), "elevenlabs API error 429: quota exceeded");
    }

    #[test]
    fn test_timeout_and_rejection_mapping() {
        assert_eq!(
            VoiceError::Timeout.into_provider_error(ProviderKind::Noiz),
            ProviderError::Timeout(ProviderKind::Noiz)
        );

        let err = VoiceError::Rejected {
            code: 1004,
            message: "auth failed".to_string(),
        }
        .into_provider_error(ProviderKind::Minimax);
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
        assert!(err.to_string().contains("1004"));
    }
}
