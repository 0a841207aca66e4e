//! Shared reqwest plumbing for provider clients

use std::time::Duration;

use reqwest::multipart::Part;
use reqwest::{Client, RequestBuilder, Response};
use vox_core::provider::AudioInput;

use crate::error::{Result, VoiceError};

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| VoiceError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Send and turn any non-2xx answer into `VoiceError::Api`
pub(crate) async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.map_err(VoiceError::from_send)?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(VoiceError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

/// Response body plus its content type
pub(crate) async fn audio_body(response: Response, fallback: &str) -> Result<(Vec<u8>, String)> {
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or(fallback)
        .to_string();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| VoiceError::InvalidResponse(format!("Failed to read audio data: {}", e)))?;

    Ok((bytes.to_vec(), content_type))
}

pub(crate) fn file_part(audio: &AudioInput) -> Result<Part> {
    Part::bytes(audio.bytes.clone())
        .file_name(audio.file_name.clone())
        .mime_str(&audio.content_type)
        .map_err(|e| VoiceError::Config(format!("Invalid content type {}: {}", audio.content_type, e)))
}
