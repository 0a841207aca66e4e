//! Per-kind usage and artifact planning

use crate::duration;
use crate::provider::{
    AudioInput, GenerationRequest, ProviderError, ProviderKind, ProviderMetadata, ProviderResult,
};
use crate::quota::{Dimension, UsageDelta};

/// Dimensions a request consumes, estimated before the provider call
pub fn usage_estimate(request: &GenerationRequest) -> Vec<UsageDelta> {
    usage(request, None)
}

/// Dimensions committed once the artifact is stored. Minutes use the
/// provider-measured duration when one was reported.
pub fn committed_usage(request: &GenerationRequest, metadata: &ProviderMetadata) -> Vec<UsageDelta> {
    usage(request, measured_duration(metadata))
}

fn usage(request: &GenerationRequest, measured_secs: Option<f64>) -> Vec<UsageDelta> {
    let minutes = |audio: &AudioInput| {
        let secs = measured_secs.unwrap_or_else(|| duration::from_byte_size(audio.bytes.len()));
        duration::to_minutes(secs)
    };

    match request {
        GenerationRequest::Speech(r) => vec![
            UsageDelta::one(Dimension::Generations),
            UsageDelta::new(Dimension::Characters, r.text.chars().count() as f64),
        ],
        GenerationRequest::Transcription(r) => vec![
            UsageDelta::one(Dimension::Transcriptions),
            UsageDelta::new(Dimension::TranscriptionMinutes, minutes(&r.audio)),
        ],
        GenerationRequest::SoundEffect(_) => vec![UsageDelta::one(Dimension::SoundEffects)],
        GenerationRequest::Music(_) => vec![UsageDelta::one(Dimension::Generations)],
        GenerationRequest::VoiceIsolation(r) => vec![
            UsageDelta::one(Dimension::VoiceIsolations),
            UsageDelta::new(Dimension::VoiceIsolationMinutes, minutes(&r.audio)),
        ],
        GenerationRequest::VoiceConversion(r) => vec![
            UsageDelta::one(Dimension::VoiceConversions),
            UsageDelta::new(Dimension::VoiceConversionMinutes, minutes(&r.audio)),
        ],
        GenerationRequest::Dialogue(r) => vec![
            UsageDelta::one(Dimension::DialogueGenerations),
            UsageDelta::new(Dimension::DialogueCharacters, r.total_characters() as f64),
        ],
        GenerationRequest::Dubbing(_) => vec![UsageDelta::one(Dimension::Generations)],
        GenerationRequest::VoiceClone(_) => vec![UsageDelta::one(Dimension::ClonedVoices)],
    }
}

/// Duration the provider reported directly or through word timings
pub fn measured_duration(metadata: &ProviderMetadata) -> Option<f64> {
    metadata
        .duration_secs
        .filter(|d| d.is_finite() && *d >= 0.0)
        .or_else(|| duration::from_word_timings(&metadata.words))
}

/// Bytes to store for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub extension: String,
}

/// Pick the artifact for a run: the provider's audio, or the uploaded source
/// for kinds whose result is only metadata.
pub fn artifact_payload(
    request: &GenerationRequest,
    provider: ProviderKind,
    result: ProviderResult,
) -> Result<ArtifactPayload, ProviderError> {
    let source = match request {
        GenerationRequest::Transcription(r) => Some(&r.audio),
        GenerationRequest::VoiceClone(r) => Some(&r.sample),
        _ => None,
    };

    if let Some(audio) = source {
        let extension = audio
            .extension()
            .unwrap_or_else(|| extension_for_content_type(&audio.content_type).to_string());
        return Ok(ArtifactPayload {
            bytes: audio.bytes.clone(),
            content_type: audio.content_type.clone(),
            extension,
        });
    }

    if result.bytes.is_empty() {
        return Err(ProviderError::InvalidResponse {
            provider,
            message: format!("no audio returned for {}", request.operation()),
        });
    }

    let extension = extension_for_content_type(&result.content_type).to_string();
    Ok(ArtifactPayload {
        bytes: result.bytes,
        content_type: result.content_type,
        extension,
    })
}

/// Estimated duration of the stored artifact when the provider measured nothing
pub fn artifact_duration(metadata: &ProviderMetadata, payload: &ArtifactPayload) -> f64 {
    measured_duration(metadata).unwrap_or_else(|| duration::from_byte_size(payload.bytes.len()))
}

pub fn extension_for_content_type(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    match essence.as_str() {
        "audio/mpeg" | "audio/mp3" | "audio/mpga" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/opus" => "opus",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/aac" => "aac",
        "audio/webm" => "webm",
        "video/mp4" => "mp4",
        "audio/pcm" | "audio/l16" => "pcm",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        DialogueLine, DialogueRequest, SpeechRequest, TranscriptionRequest,
        VoiceIsolationRequest, WordTiming,
    };

    fn speech(text: &str) -> GenerationRequest {
        GenerationRequest::Speech(SpeechRequest {
            text: text.to_string(),
            voice_id: "v1".to_string(),
            model_id: None,
            language: None,
            speed: None,
        })
    }

    #[test]
    fn test_speech_usage_order() {
        let deltas = usage_estimate(&speech("hello"));
        assert_eq!(
            deltas,
            vec![
                UsageDelta::one(Dimension::Generations),
                UsageDelta::new(Dimension::Characters, 5.0),
            ]
        );
    }

    #[test]
    fn test_dialogue_usage() {
        let request = GenerationRequest::Dialogue(DialogueRequest {
            lines: vec![
                DialogueLine { text: "a".repeat(150), voice_id: "x".to_string() },
                DialogueLine { text: "b".repeat(250), voice_id: "y".to_string() },
            ],
            model_id: None,
        });
        let deltas = usage_estimate(&request);
        assert_eq!(deltas[0], UsageDelta::one(Dimension::DialogueGenerations));
        assert_eq!(deltas[1], UsageDelta::new(Dimension::DialogueCharacters, 400.0));
    }

    #[test]
    fn test_minutes_estimate_then_measured() {
        // 960 000 bytes at 128 kbps is one minute
        let request = GenerationRequest::VoiceIsolation(VoiceIsolationRequest {
            audio: AudioInput::new("a.mp3", "audio/mpeg", vec![0; 960_000]),
        });
        let estimate = usage_estimate(&request);
        assert_eq!(estimate[1], UsageDelta::new(Dimension::VoiceIsolationMinutes, 1.0));

        let metadata = ProviderMetadata {
            duration_secs: Some(30.0),
            ..Default::default()
        };
        let committed = committed_usage(&request, &metadata);
        assert_eq!(committed[1], UsageDelta::new(Dimension::VoiceIsolationMinutes, 0.5));
    }

    #[test]
    fn test_transcription_stores_source_audio() {
        let request = GenerationRequest::Transcription(TranscriptionRequest {
            audio: AudioInput::new("Meeting.WAV", "audio/wav", vec![7; 16]),
            language: None,
            keyterms: vec![],
            diarize: false,
            model_id: None,
        });
        let metadata = ProviderMetadata {
            words: vec![WordTiming {
                text: "hi".to_string(),
                start: 0.0,
                end: 90.0,
                speaker: None,
            }],
            ..Default::default()
        };
        let result = ProviderResult::metadata_only(metadata.clone());

        let payload = artifact_payload(&request, ProviderKind::ElevenLabs, result).unwrap();
        assert_eq!(payload.bytes, vec![7; 16]);
        assert_eq!(payload.extension, "wav");
        assert_eq!(
            committed_usage(&request, &metadata)[1],
            UsageDelta::new(Dimension::TranscriptionMinutes, 1.5)
        );
    }

    #[test]
    fn test_empty_audio_is_invalid_response() {
        let result = ProviderResult::audio(Vec::new(), "audio/mpeg");
        let err = artifact_payload(&speech("hi"), ProviderKind::Noiz, result).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[test]
    fn test_extension_for_content_type() {
        assert_eq!(extension_for_content_type("audio/mpeg"), "mp3");
        assert_eq!(extension_for_content_type("audio/wav; codecs=1"), "wav");
        assert_eq!(extension_for_content_type("application/octet-stream"), "bin");
    }
}
