//! Noiz provider (speech only)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;
use vox_core::provider::{
    GenerationRequest, Provider, ProviderError, ProviderKind, ProviderMetadata, ProviderResult,
    SpeechRequest,
};

use crate::error::{Result, VoiceError};
use crate::http::{audio_body, build_client, send, DEFAULT_TIMEOUT_SECS};

#[derive(Debug, Clone)]
pub struct NoizConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl NoizConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://noiz.ai/v1".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct NoizClient {
    client: Client,
    config: NoizConfig,
}

impl NoizClient {
    pub fn new(config: NoizConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(VoiceError::Config("Noiz requires an api_key".to_string()));
        }
        let client = build_client(config.timeout)?;
        Ok(Self { client, config })
    }

    pub async fn speech(&self, request: &SpeechRequest) -> Result<ProviderResult> {
        info!("Synthesizing speech: {} chars using Noiz", request.text.chars().count());

        let mut body = serde_json::json!({
            "text": request.text,
            "voice_id": request.voice_id,
            "output_format": "mp3",
        });
        if let Some(speed) = request.speed {
            body["speed"] = serde_json::json!(speed);
        }
        if let Some(language) = &request.language {
            body["target_lang"] = serde_json::json!(language);
        }

        let url = format!("{}/text-to-speech", self.config.base_url);
        let response = send(
            self.client
                .post(&url)
                .header("Authorization", &self.config.api_key)
                .json(&body),
        )
        .await?;

        let (bytes, content_type) = audio_body(response, "audio/mpeg").await?;
        Ok(ProviderResult::audio(bytes, content_type).with_metadata(ProviderMetadata {
            language: request.language.clone(),
            ..Default::default()
        }))
    }
}

#[async_trait]
impl Provider for NoizClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Noiz
    }

    async fn invoke(&self, request: &GenerationRequest) -> std::result::Result<ProviderResult, ProviderError> {
        let result = match request {
            GenerationRequest::Speech(r) => self.speech(r).await,
            other => Err(VoiceError::Unsupported(other.operation())),
        };
        result.map_err(|e| e.into_provider_error(ProviderKind::Noiz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vox_core::provider::{MusicRequest, ProviderError};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> SpeechRequest {
        SpeechRequest {
            text: "Testing".to_string(),
            voice_id: "noiz-voice".to_string(),
            model_id: None,
            language: None,
            speed: None,
        }
    }

    #[tokio::test]
    async fn test_speech() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text-to-speech"))
            .and(header("Authorization", "nz-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/wav")
                    .set_body_bytes(b"RIFF".to_vec()),
            )
            .mount(&server)
            .await;

        let client = NoizClient::new(NoizConfig::new("nz-key").with_base_url(server.uri())).unwrap();
        let result = client.speech(&request()).await.unwrap();
        assert_eq!(result.bytes, b"RIFF");
        assert_eq!(result.content_type, "audio/wav");
    }

    #[tokio::test]
    async fn test_timeout_maps_to_provider_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let config = NoizConfig::new("nz-key")
            .with_base_url(server.uri())
            .with_timeout(Duration::from_millis(50));
        let client = NoizClient::new(config).unwrap();
        let err = client
            .invoke(&GenerationRequest::Speech(request()))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Timeout(ProviderKind::Noiz));
    }

    #[tokio::test]
    async fn test_music_is_unsupported() {
        let client = NoizClient::new(NoizConfig::new("nz-key")).unwrap();
        let err = client
            .invoke(&GenerationRequest::Music(MusicRequest {
                prompt: "jazz".to_string(),
                lyrics: None,
                length_secs: None,
                instrumental: true,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported { .. }));
    }
}
