//! Minimax provider
//!
//! Speech (`t2a_v2`) and music (`music_generation`). Both endpoints answer with
//! hex-encoded audio inside a JSON envelope carrying a `base_resp` status.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use vox_core::provider::{
    GenerationRequest, MusicRequest, Provider, ProviderError, ProviderKind, ProviderMetadata,
    ProviderResult, SpeechRequest,
};

use crate::error::{Result, VoiceError};
use crate::http::{build_client, send, DEFAULT_TIMEOUT_SECS};

/// Minimax configuration
#[derive(Debug, Clone)]
pub struct MinimaxConfig {
    pub api_key: String,
    pub group_id: Option<String>,
    pub base_url: String,
    pub speech_model: String,
    pub music_model: String,
    pub timeout: Duration,
}

impl MinimaxConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            group_id: None,
            base_url: "https://api.minimax.io/v1".to_string(),
            speech_model: "speech-02-hd".to_string(),
            music_model: "music-1.5".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.speech_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<AudioData>,
    #[serde(default)]
    extra_info: Option<ExtraInfo>,
    base_resp: BaseResp,
}

#[derive(Debug, Deserialize)]
struct AudioData {
    #[serde(default)]
    audio: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExtraInfo {
    /// Speech length in milliseconds
    #[serde(default)]
    audio_length: Option<f64>,
    /// Music length in milliseconds
    #[serde(default)]
    music_duration: Option<f64>,
    #[serde(default)]
    audio_format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BaseResp {
    status_code: i64,
    #[serde(default)]
    status_msg: String,
}

impl Envelope {
    /// Decode the audio after checking `base_resp`
    fn into_audio(self) -> Result<(Vec<u8>, ExtraInfo)> {
        if self.base_resp.status_code != 0 {
            return Err(VoiceError::Rejected {
                code: self.base_resp.status_code,
                message: self.base_resp.status_msg,
            });
        }
        let hex_audio = self
            .data
            .map(|d| d.audio)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| VoiceError::InvalidResponse("response carried no audio".to_string()))?;
        let bytes = hex::decode(hex_audio.trim())
            .map_err(|e| VoiceError::Decoding(format!("hex audio: {}", e)))?;
        Ok((bytes, self.extra_info.unwrap_or_default()))
    }
}

fn content_type_for(format: Option<&str>) -> &'static str {
    match format {
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("pcm") => "audio/pcm",
        _ => "audio/mpeg",
    }
}

/// Minimax API client
pub struct MinimaxClient {
    client: Client,
    config: MinimaxConfig,
}

impl MinimaxClient {
    pub fn new(config: MinimaxConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(VoiceError::Config("Minimax requires an api_key".to_string()));
        }
        let client = build_client(config.timeout)?;
        Ok(Self { client, config })
    }

    fn post(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(format!("{}/{}", self.config.base_url, endpoint))
            .header("Authorization", format!("Bearer {}", self.config.api_key));
        if let Some(group_id) = &self.config.group_id {
            builder = builder.query(&[("GroupId", group_id)]);
        }
        builder
    }

    async fn call(&self, endpoint: &str, body: &serde_json::Value) -> Result<(Vec<u8>, ExtraInfo)> {
        let response = send(self.post(endpoint).json(body)).await?;
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| VoiceError::InvalidResponse(e.to_string()))?;
        envelope.into_audio()
    }

    pub async fn speech(&self, request: &SpeechRequest) -> Result<ProviderResult> {
        info!("Synthesizing speech: {} chars using Minimax", request.text.chars().count());

        let mut body = serde_json::json!({
            "model": request.model_id.as_deref().unwrap_or(&self.config.speech_model),
            "text": request.text,
            "stream": false,
            "voice_setting": {
                "voice_id": request.voice_id,
                "speed": request.speed.unwrap_or(1.0),
                "vol": 1.0,
                "pitch": 0,
            },
            "audio_setting": {
                "sample_rate": 32000,
                "bitrate": 128000,
                "format": "mp3",
                "channel": 1,
            },
        });
        if let Some(language) = &request.language {
            body["language_boost"] = serde_json::json!(language);
        }

        let (bytes, extra) = self.call("t2a_v2", &body).await?;
        let duration_secs = extra.audio_length.map(|ms| ms / 1000.0);
        debug!("Speech complete: {} bytes, duration {:?}", bytes.len(), duration_secs);

        Ok(
            ProviderResult::audio(bytes, content_type_for(extra.audio_format.as_deref()))
                .with_metadata(ProviderMetadata {
                    duration_secs,
                    language: request.language.clone(),
                    ..Default::default()
                }),
        )
    }

    pub async fn music(&self, request: &MusicRequest) -> Result<ProviderResult> {
        info!("Generating music using Minimax");

        let lyrics = match &request.lyrics {
            Some(lyrics) if !request.instrumental => lyrics.clone(),
            _ => "[Instrumental]".to_string(),
        };
        let body = serde_json::json!({
            "model": self.config.music_model,
            "prompt": request.prompt,
            "lyrics": lyrics,
            "audio_setting": {
                "sample_rate": 44100,
                "bitrate": 256000,
                "format": "mp3",
            },
        });

        let (bytes, extra) = self.call("music_generation", &body).await?;
        let duration_secs = extra.music_duration.map(|ms| ms / 1000.0);
        debug!("Music complete: {} bytes, duration {:?}", bytes.len(), duration_secs);

        Ok(
            ProviderResult::audio(bytes, content_type_for(extra.audio_format.as_deref()))
                .with_metadata(ProviderMetadata {
                    duration_secs,
                    lyrics: Some(lyrics),
                    ..Default::default()
                }),
        )
    }
}

#[async_trait]
impl Provider for MinimaxClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Minimax
    }

    async fn invoke(&self, request: &GenerationRequest) -> std::result::Result<ProviderResult, ProviderError> {
        let result = match request {
            GenerationRequest::Speech(r) => self.speech(r).await,
            GenerationRequest::Music(r) => self.music(r).await,
            other => Err(VoiceError::Unsupported(other.operation())),
        };
        result.map_err(|e| e.into_provider_error(ProviderKind::Minimax))
    }
}
