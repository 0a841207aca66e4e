//! Error types for vox-api

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use vox_core::pipeline::PipelineError;
use vox_core::quota::QuotaDenial;

/// vox-api error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Rate limit exceeded, try again later")]
    RateLimited,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Core error: {0}")]
    Core(#[from] vox_core::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Pipeline(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure envelope
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaDenial>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        }

        let quota = match &self {
            Self::Pipeline(PipelineError::QuotaDenied(denial)) => Some(*denial),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            quota,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use vox_core::provider::{ProviderError, ProviderKind};
    use vox_core::quota::Dimension;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);

        let denied = ApiError::from(PipelineError::QuotaDenied(QuotaDenial {
            dimension: Dimension::Characters,
            attempted: 10010.0,
            limit: 10000.0,
        }));
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let upstream = ApiError::from(PipelineError::Provider(ProviderError::Http {
            provider: ProviderKind::ElevenLabs,
            status: 500,
            message: "boom".to_string(),
        }));
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
    }
}
