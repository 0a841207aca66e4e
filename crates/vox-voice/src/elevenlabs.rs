//! ElevenLabs provider
//!
//! Covers every generation kind: speech with timestamps, speech-to-text, sound
//! effects, music, voice isolation, speech-to-speech, dialogue, dubbing and
//! instant voice cloning.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::Form;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use vox_core::provider::{
    DialogueRequest, DubbingRequest, GenerationRequest, MusicRequest, Provider, ProviderError,
    ProviderKind, ProviderMetadata, ProviderResult, SoundEffectRequest, SpeechRequest,
    TranscriptionRequest, VoiceCloneRequest, VoiceConversionRequest, VoiceIsolationRequest,
    WordTiming,
};

use crate::error::{Result, VoiceError};
use crate::http::{audio_body, build_client, file_part, send, DEFAULT_TIMEOUT_SECS};

const MPEG: &str = "audio/mpeg";

/// ElevenLabs configuration
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub base_url: String,
    /// Default text-to-speech model
    pub tts_model: String,
    pub stt_model: String,
    pub sts_model: String,
    pub dialogue_model: String,
    pub timeout: Duration,
    /// Delay between dubbing status checks
    pub dubbing_poll_interval: Duration,
    pub dubbing_max_polls: u32,
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            tts_model: "eleven_multilingual_v2".to_string(),
            stt_model: "scribe_v1".to_string(),
            sts_model: "eleven_multilingual_sts_v2".to_string(),
            dialogue_model: "eleven_v3".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            dubbing_poll_interval: Duration::from_secs(5),
            dubbing_max_polls: 60,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.tts_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dubbing_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.dubbing_poll_interval = interval;
        self.dubbing_max_polls = max_polls;
        self
    }
}

#[derive(Debug, Deserialize)]
struct TimestampedSpeech {
    audio_base64: String,
    #[serde(default)]
    alignment: Option<Alignment>,
}

#[derive(Debug, Deserialize)]
struct Alignment {
    #[serde(default)]
    character_end_times_seconds: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct Transcript {
    #[serde(default)]
    language_code: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    words: Vec<TranscriptWord>,
}

#[derive(Debug, Deserialize)]
struct TranscriptWord {
    text: String,
    start: f64,
    end: f64,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    speaker_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DubbingJob {
    dubbing_id: String,
}

#[derive(Debug, Deserialize)]
struct DubbingStatus {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddedVoice {
    voice_id: String,
}

/// ElevenLabs API client
pub struct ElevenLabsClient {
    client: Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsClient {
    pub fn new(config: ElevenLabsConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(VoiceError::Config("ElevenLabs requires an api_key".to_string()));
        }
        let client = build_client(config.timeout)?;
        Ok(Self { client, config })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.config.base_url, path))
            .header("xi-api-key", &self.config.api_key)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.config.base_url, path))
            .header("xi-api-key", &self.config.api_key)
    }

    /// Text-to-speech with character timestamps
    pub async fn speech(&self, request: &SpeechRequest) -> Result<ProviderResult> {
        info!("Synthesizing speech: {} chars using ElevenLabs", request.text.chars().count());

        let mut body = serde_json::json!({
            "text": request.text,
            "model_id": request.model_id.as_deref().unwrap_or(&self.config.tts_model),
        });
        if let Some(language) = &request.language {
            body["language_code"] = serde_json::json!(language);
        }
        if let Some(speed) = request.speed {
            body["voice_settings"] = serde_json::json!({ "speed": speed });
        }

        let path = format!(
            "/text-to-speech/{}/with-timestamps?output_format=mp3_44100_128",
            urlencoding::encode(&request.voice_id)
        );
        let response = send(self.post(&path).json(&body)).await?;
        let speech: TimestampedSpeech = response
            .json()
            .await
            .map_err(|e| VoiceError::InvalidResponse(e.to_string()))?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(speech.audio_base64.as_bytes())
            .map_err(|e| VoiceError::Decoding(format!("audio_base64: {}", e)))?;

        let duration_secs = speech.alignment.and_then(|a| {
            a.character_end_times_seconds
                .into_iter()
                .filter(|t| t.is_finite())
                .reduce(f64::max)
        });

        debug!("Speech complete: {} bytes, duration {:?}", audio.len(), duration_secs);
        Ok(ProviderResult::audio(audio, MPEG).with_metadata(ProviderMetadata {
            duration_secs,
            language: request.language.clone(),
            ..Default::default()
        }))
    }

    /// Speech-to-text with word timings
    pub async fn transcribe(&self, request: &TranscriptionRequest) -> Result<ProviderResult> {
        info!("Transcribing {} bytes using ElevenLabs", request.audio.bytes.len());

        let mut form = Form::new()
            .text(
                "model_id",
                request
                    .model_id
                    .clone()
                    .unwrap_or_else(|| self.config.stt_model.clone()),
            )
            .text("diarize", request.diarize.to_string())
            .part("file", file_part(&request.audio)?);
        if let Some(language) = &request.language {
            form = form.text("language_code", language.clone());
        }
        for term in &request.keyterms {
            form = form.text("keyterms", term.clone());
        }

        let response = send(self.post("/speech-to-text").multipart(form)).await?;
        let transcript: Transcript = response
            .json()
            .await
            .map_err(|e| VoiceError::InvalidResponse(e.to_string()))?;

        let words: Vec<WordTiming> = transcript
            .words
            .into_iter()
            .filter(|w| w.kind.as_deref().is_none_or(|k| k == "word"))
            .map(|w| WordTiming {
                text: w.text,
                start: w.start,
                end: w.end,
                speaker: w.speaker_id,
            })
            .collect();

        debug!("Transcription complete: {} words", words.len());
        Ok(ProviderResult::metadata_only(ProviderMetadata {
            language: transcript.language_code,
            transcript: Some(transcript.text),
            words,
            ..Default::default()
        }))
    }

    pub async fn sound_effect(&self, request: &SoundEffectRequest) -> Result<ProviderResult> {
        let mut body = serde_json::json!({ "text": request.prompt });
        if let Some(duration) = request.duration_secs {
            body["duration_seconds"] = serde_json::json!(duration);
        }
        if let Some(influence) = request.prompt_influence {
            body["prompt_influence"] = serde_json::json!(influence);
        }

        let response = send(self.post("/sound-generation").json(&body)).await?;
        let (bytes, content_type) = audio_body(response, MPEG).await?;
        Ok(ProviderResult::audio(bytes, content_type).with_metadata(ProviderMetadata {
            duration_secs: request.duration_secs,
            ..Default::default()
        }))
    }

    pub async fn music(&self, request: &MusicRequest) -> Result<ProviderResult> {
        let prompt = match &request.lyrics {
            Some(lyrics) if !request.instrumental => {
                format!("{}\n\nLyrics:\n{}", request.prompt, lyrics)
            }
            _ => request.prompt.clone(),
        };
        let mut body = serde_json::json!({
            "prompt": prompt,
            "force_instrumental": request.instrumental,
        });
        if let Some(length) = request.length_secs {
            body["music_length_ms"] = serde_json::json!((length * 1000.0).round() as u64);
        }

        let response = send(self.post("/music").json(&body)).await?;
        let (bytes, content_type) = audio_body(response, MPEG).await?;
        Ok(ProviderResult::audio(bytes, content_type).with_metadata(ProviderMetadata {
            duration_secs: request.length_secs,
            lyrics: request.lyrics.clone().filter(|_| !request.instrumental),
            ..Default::default()
        }))
    }

    pub async fn isolate_voice(&self, request: &VoiceIsolationRequest) -> Result<ProviderResult> {
        let form = Form::new().part("audio", file_part(&request.audio)?);
        let response = send(self.post("/audio-isolation").multipart(form)).await?;
        let (bytes, content_type) = audio_body(response, MPEG).await?;
        Ok(ProviderResult::audio(bytes, content_type))
    }

    /// Speech-to-speech into the target voice
    pub async fn convert_voice(&self, request: &VoiceConversionRequest) -> Result<ProviderResult> {
        let form = Form::new()
            .text(
                "model_id",
                request
                    .model_id
                    .clone()
                    .unwrap_or_else(|| self.config.sts_model.clone()),
            )
            .part("audio", file_part(&request.audio)?);

        let path = format!("/speech-to-speech/{}", urlencoding::encode(&request.voice_id));
        let response = send(self.post(&path).multipart(form)).await?;
        let (bytes, content_type) = audio_body(response, MPEG).await?;
        Ok(ProviderResult::audio(bytes, content_type).with_metadata(ProviderMetadata {
            voice_id: Some(request.voice_id.clone()),
            ..Default::default()
        }))
    }

    pub async fn dialogue(&self, request: &DialogueRequest) -> Result<ProviderResult> {
        let body = serde_json::json!({
            "inputs": request.lines,
            "model_id": request.model_id.as_deref().unwrap_or(&self.config.dialogue_model),
        });

        let response = send(self.post("/text-to-dialogue").json(&body)).await?;
        let (bytes, content_type) = audio_body(response, MPEG).await?;
        Ok(ProviderResult::audio(bytes, content_type))
    }

    /// Create a dubbing job, wait for it, then fetch the dubbed track
    pub async fn dub(&self, request: &DubbingRequest) -> Result<ProviderResult> {
        let mut form = Form::new()
            .text("target_lang", request.target_lang.clone())
            .text(
                "source_lang",
                request.source_lang.clone().unwrap_or_else(|| "auto".to_string()),
            )
            .part("file", file_part(&request.audio)?);
        if let Some(speakers) = request.num_speakers {
            form = form.text("num_speakers", speakers.to_string());
        }

        let response = send(self.post("/dubbing").multipart(form)).await?;
        let job: DubbingJob = response
            .json()
            .await
            .map_err(|e| VoiceError::InvalidResponse(e.to_string()))?;
        info!("Dubbing job {} created ({})", job.dubbing_id, request.target_lang);

        self.wait_for_dubbing(&job.dubbing_id).await?;

        let path = format!(
            "/dubbing/{}/audio/{}",
            urlencoding::encode(&job.dubbing_id),
            urlencoding::encode(&request.target_lang)
        );
        let response = send(self.get(&path)).await?;
        let (bytes, content_type) = audio_body(response, MPEG).await?;
        Ok(ProviderResult::audio(bytes, content_type).with_metadata(ProviderMetadata {
            language: Some(request.target_lang.clone()),
            dubbing_id: Some(job.dubbing_id),
            ..Default::default()
        }))
    }

    async fn wait_for_dubbing(&self, dubbing_id: &str) -> Result<()> {
        let path = format!("/dubbing/{}", urlencoding::encode(dubbing_id));
        for attempt in 1..=self.config.dubbing_max_polls {
            let response = send(self.get(&path)).await?;
            let status: DubbingStatus = response
                .json()
                .await
                .map_err(|e| VoiceError::InvalidResponse(e.to_string()))?;

            match status.status.as_str() {
                "dubbed" => return Ok(()),
                "failed" => {
                    return Err(VoiceError::InvalidResponse(format!(
                        "dubbing {} failed: {}",
                        dubbing_id,
                        status.error.unwrap_or_else(|| "unknown error".to_string())
                    )));
                }
                other => debug!("Dubbing {} is {} (poll {})", dubbing_id, other, attempt),
            }
            tokio::time::sleep(self.config.dubbing_poll_interval).await;
        }
        Err(VoiceError::Timeout)
    }

    /// Instant voice clone from one sample
    pub async fn clone_voice(&self, request: &VoiceCloneRequest) -> Result<ProviderResult> {
        let mut form = Form::new()
            .text("name", request.name.clone())
            .text(
                "remove_background_noise",
                request.remove_background_noise.to_string(),
            )
            .part("files", file_part(&request.sample)?);
        if let Some(description) = &request.description {
            form = form.text("description", description.clone());
        }

        let response = send(self.post("/voices/add").multipart(form)).await?;
        let voice: AddedVoice = response
            .json()
            .await
            .map_err(|e| VoiceError::InvalidResponse(e.to_string()))?;
        info!("Voice {} cloned as {}", request.name, voice.voice_id);

        Ok(ProviderResult::metadata_only(ProviderMetadata {
            voice_id: Some(voice.voice_id),
            ..Default::default()
        }))
    }
}

#[async_trait]
impl Provider for ElevenLabsClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ElevenLabs
    }

    async fn invoke(&self, request: &GenerationRequest) -> std::result::Result<ProviderResult, ProviderError> {
        let result = match request {
            GenerationRequest::Speech(r) => self.speech(r).await,
            GenerationRequest::Transcription(r) => self.transcribe(r).await,
            GenerationRequest::SoundEffect(r) => self.sound_effect(r).await,
            GenerationRequest::Music(r) => self.music(r).await,
            GenerationRequest::VoiceIsolation(r) => self.isolate_voice(r).await,
            GenerationRequest::VoiceConversion(r) => self.convert_voice(r).await,
            GenerationRequest::Dialogue(r) => self.dialogue(r).await,
            GenerationRequest::Dubbing(r) => self.dub(r).await,
            GenerationRequest::VoiceClone(r) => self.clone_voice(r).await,
        };
        result.map_err(|e| e.into_provider_error(ProviderKind::ElevenLabs))
    }
}
