//! Provider request and result types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use crate::generation::RecordKind;
use crate::Error;

/// Closed set of external generation providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    ElevenLabs,
    Minimax,
    Noiz,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::ElevenLabs,
        ProviderKind::Minimax,
        ProviderKind::Noiz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ElevenLabs => "elevenlabs",
            Self::Minimax => "minimax",
            Self::Noiz => "noiz",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "elevenlabs" | "eleven_labs" => Ok(Self::ElevenLabs),
            "minimax" => Ok(Self::Minimax),
            "noiz" => Ok(Self::Noiz),
            other => Err(Error::InvalidValue(format!("unknown provider: {}", other))),
        }
    }
}

/// An uploaded audio file
#[derive(Clone, PartialEq, Eq)]
pub struct AudioInput {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl AudioInput {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Lowercased file extension, if the name has one
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    fn summary(&self) -> JsonValue {
        json!({
            "file_name": self.file_name,
            "content_type": self.content_type,
            "size": self.bytes.len(),
        })
    }
}

impl fmt::Debug for AudioInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioInput")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionRequest {
    pub audio: AudioInput,
    pub language: Option<String>,
    pub keyterms: Vec<String>,
    pub diarize: bool,
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SoundEffectRequest {
    pub prompt: String,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub prompt_influence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MusicRequest {
    pub prompt: String,
    #[serde(default)]
    pub lyrics: Option<String>,
    #[serde(default)]
    pub length_secs: Option<f64>,
    #[serde(default)]
    pub instrumental: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceIsolationRequest {
    pub audio: AudioInput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConversionRequest {
    pub audio: AudioInput,
    pub voice_id: String,
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub text: String,
    pub voice_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DialogueRequest {
    pub lines: Vec<DialogueLine>,
    #[serde(default)]
    pub model_id: Option<String>,
}

impl DialogueRequest {
    /// Total characters across all lines
    pub fn total_characters(&self) -> usize {
        self.lines.iter().map(|l| l.text.chars().count()).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DubbingRequest {
    pub audio: AudioInput,
    pub target_lang: String,
    pub source_lang: Option<String>,
    pub num_speakers: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceCloneRequest {
    pub name: String,
    pub description: Option<String>,
    pub sample: AudioInput,
    pub remove_background_noise: bool,
}

/// A typed generation request, one variant per record kind
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    Speech(SpeechRequest),
    Transcription(TranscriptionRequest),
    SoundEffect(SoundEffectRequest),
    Music(MusicRequest),
    VoiceIsolation(VoiceIsolationRequest),
    VoiceConversion(VoiceConversionRequest),
    Dialogue(DialogueRequest),
    Dubbing(DubbingRequest),
    VoiceClone(VoiceCloneRequest),
}

impl GenerationRequest {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Speech(_) => RecordKind::Speech,
            Self::Transcription(_) => RecordKind::Transcription,
            Self::SoundEffect(_) => RecordKind::SoundEffect,
            Self::Music(_) => RecordKind::Music,
            Self::VoiceIsolation(_) => RecordKind::VoiceIsolation,
            Self::VoiceConversion(_) => RecordKind::VoiceConversion,
            Self::Dialogue(_) => RecordKind::Dialogue,
            Self::Dubbing(_) => RecordKind::Dubbing,
            Self::VoiceClone(_) => RecordKind::ClonedVoice,
        }
    }

    /// Operation name used in provider errors
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Speech(_) => "text-to-speech",
            Self::Transcription(_) => "speech-to-text",
            Self::SoundEffect(_) => "sound-effects",
            Self::Music(_) => "music",
            Self::VoiceIsolation(_) => "voice-isolation",
            Self::VoiceConversion(_) => "speech-to-speech",
            Self::Dialogue(_) => "text-to-dialogue",
            Self::Dubbing(_) => "dubbing",
            Self::VoiceClone(_) => "voice-clone",
        }
    }

    /// Operations that wait on an asynchronous provider job. Each HTTP call
    /// is still bounded by the client timeout and the provider's poll limit.
    pub fn is_long_running(&self) -> bool {
        matches!(self, Self::Dubbing(_))
    }

    /// Input parameters persisted on the generation record. Never includes file bytes.
    pub fn input_summary(&self) -> JsonValue {
        match self {
            Self::Speech(r) => json!({
                "text": r.text,
                "voice_id": r.voice_id,
                "model_id": r.model_id,
                "language": r.language,
                "speed": r.speed,
            }),
            Self::Transcription(r) => json!({
                "file": r.audio.summary(),
                "language": r.language,
                "keyterms": r.keyterms,
                "diarize": r.diarize,
                "model_id": r.model_id,
            }),
            Self::SoundEffect(r) => json!({
                "prompt": r.prompt,
                "duration_secs": r.duration_secs,
                "prompt_influence": r.prompt_influence,
            }),
            Self::Music(r) => json!({
                "prompt": r.prompt,
                "lyrics": r.lyrics,
                "length_secs": r.length_secs,
                "instrumental": r.instrumental,
            }),
            Self::VoiceIsolation(r) => json!({ "file": r.audio.summary() }),
            Self::VoiceConversion(r) => json!({
                "file": r.audio.summary(),
                "voice_id": r.voice_id,
                "model_id": r.model_id,
            }),
            Self::Dialogue(r) => json!({
                "lines": r.lines,
                "model_id": r.model_id,
            }),
            Self::Dubbing(r) => json!({
                "file": r.audio.summary(),
                "target_lang": r.target_lang,
                "source_lang": r.source_lang,
                "num_speakers": r.num_speakers,
            }),
            Self::VoiceClone(r) => json!({
                "name": r.name,
                "description": r.description,
                "file": r.sample.summary(),
                "remove_background_noise": r.remove_background_noise,
            }),
        }
    }
}

/// Word (or character run) timing reported by a provider, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub text: String,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// Provider-reported metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<WordTiming>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    /// Voice id created by a clone request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dubbing_id: Option<String>,
}

/// Raw provider output
#[derive(Clone, PartialEq)]
pub struct ProviderResult {
    /// Generated audio. Empty for results that carry only metadata.
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub metadata: ProviderMetadata,
}

impl ProviderResult {
    pub fn audio(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            metadata: ProviderMetadata::default(),
        }
    }

    pub fn metadata_only(metadata: ProviderMetadata) -> Self {
        Self {
            bytes: Vec::new(),
            content_type: "application/json".to_string(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, metadata: ProviderMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl fmt::Debug for ProviderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderResult")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Provider call failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("{provider} API error {status}: {message}")]
    Http {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    #[error("{0} request timed out")]
    Timeout(ProviderKind),

    #[error("{provider} unreachable: {message}")]
    Unreachable {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: ProviderKind,
        operation: &'static str,
    },

    #[error("Provider not configured: {0}")]
    NotConfigured(ProviderKind),
}

impl ProviderError {
    /// Upstream status code, when the provider answered
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("elevenlabs".parse::<ProviderKind>().unwrap(), ProviderKind::ElevenLabs);
        assert_eq!("MiniMax".parse::<ProviderKind>().unwrap(), ProviderKind::Minimax);
        assert_eq!(" noiz ".parse::<ProviderKind>().unwrap(), ProviderKind::Noiz);
        assert!("openai".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_audio_input_extension() {
        let audio = AudioInput::new("Clip.MP3", "audio/mpeg", vec![1, 2, 3]);
        assert_eq!(audio.extension(), Some("mp3".to_string()));
        assert_eq!(AudioInput::new("noext", "audio/mpeg", vec![]).extension(), None);
    }

    #[test]
    fn test_input_summary_omits_bytes() {
        let request = GenerationRequest::VoiceIsolation(VoiceIsolationRequest {
            audio: AudioInput::new("a.wav", "audio/wav", vec![0; 2048]),
        });
        let summary = request.input_summary();
        assert_eq!(summary["file"]["size"], 2048);
        assert_eq!(summary["file"]["file_name"], "a.wav");
        assert_eq!(request.kind(), RecordKind::VoiceIsolation);
    }

    #[test]
    fn test_dialogue_total_characters() {
        let request = DialogueRequest {
            lines: vec![
                DialogueLine { text: "héllo".to_string(), voice_id: "a".to_string() },
                DialogueLine { text: "there".to_string(), voice_id: "b".to_string() },
            ],
            model_id: None,
        };
        assert_eq!(request.total_characters(), 10);
    }

    #[test]
    fn test_http_error_message() {
        let err = ProviderError::Http {
            provider: ProviderKind::ElevenLabs,
            status: 429,
            message: "too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "elevenlabs API error 429: too many requests");
        assert_eq!(err.upstream_status(), Some(429));
    }
}
