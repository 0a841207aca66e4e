//! Generation record type definitions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::provider::ProviderKind;
use crate::Error;

/// Kind of generation a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Speech,
    Transcription,
    Music,
    SoundEffect,
    VoiceIsolation,
    VoiceConversion,
    Dialogue,
    Dubbing,
    ClonedVoice,
}

impl RecordKind {
    pub const ALL: [RecordKind; 9] = [
        RecordKind::Speech,
        RecordKind::Transcription,
        RecordKind::Music,
        RecordKind::SoundEffect,
        RecordKind::VoiceIsolation,
        RecordKind::VoiceConversion,
        RecordKind::Dialogue,
        RecordKind::Dubbing,
        RecordKind::ClonedVoice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Speech => "speech",
            Self::Transcription => "transcription",
            Self::Music => "music",
            Self::SoundEffect => "sound_effect",
            Self::VoiceIsolation => "voice_isolation",
            Self::VoiceConversion => "voice_conversion",
            Self::Dialogue => "dialogue",
            Self::Dubbing => "dubbing",
            Self::ClonedVoice => "cloned_voice",
        }
    }

    /// First segment of the artifact path in object storage
    pub fn storage_prefix(&self) -> &'static str {
        match self {
            Self::Speech => "audio",
            Self::Transcription => "transcriptions",
            Self::Music => "music",
            Self::SoundEffect => "sound-effects",
            Self::VoiceIsolation => "voice-isolation",
            Self::VoiceConversion => "voice-changer",
            Self::Dialogue => "dialogue",
            Self::Dubbing => "dubbing",
            Self::ClonedVoice => "voice-samples",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::InvalidValue(format!("unknown generation kind: {}", s)))
    }
}

/// One persisted generation, linking a user, its inputs and the stored artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: String,
    pub user_id: String,
    pub kind: RecordKind,
    pub provider: Option<ProviderKind>,
    /// Input parameters (text, prompt, voice id, file name, ...)
    pub input: JsonValue,
    /// Object storage key
    pub artifact_path: String,
    /// Storage handle allowing delete without a lookup
    pub artifact_file_id: Option<String>,
    pub content_type: String,
    /// Informational only; may be an estimate
    pub duration_secs: Option<f64>,
    pub language: Option<String>,
    pub favorite: bool,
    /// Provider metadata (transcript, lyrics, cloned voice id, ...)
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_names_parse_back() {
        for kind in RecordKind::ALL {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_record_kind_serde_matches_as_str() {
        let json = serde_json::to_string(&RecordKind::VoiceIsolation).unwrap();
        assert_eq!(json, "\"voice_isolation\"");
    }

    #[test]
    fn test_storage_prefixes() {
        assert_eq!(RecordKind::Speech.storage_prefix(), "audio");
        assert_eq!(RecordKind::VoiceConversion.storage_prefix(), "voice-changer");
        assert_eq!(RecordKind::ClonedVoice.storage_prefix(), "voice-samples");
    }
}
