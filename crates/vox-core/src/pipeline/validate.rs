//! Structural request validation

use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use crate::provider::{AudioInput, GenerationRequest};

/// Structural limits applied before any side effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub max_text_chars: usize,
    pub max_file_bytes: usize,
    /// Accepted upload formats, by extension
    pub allowed_formats: Vec<String>,
    pub max_keyterms: usize,
    pub max_keyterm_chars: usize,
    pub max_sound_prompt_chars: usize,
    pub min_sound_duration_secs: f64,
    pub max_sound_duration_secs: f64,
    pub max_music_prompt_chars: usize,
    pub max_lyrics_chars: usize,
    pub min_music_length_secs: f64,
    pub max_music_length_secs: f64,
    pub max_dialogue_lines: usize,
    pub max_dialogue_chars: usize,
    pub max_voice_name_chars: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_text_chars: 5000,
            max_file_bytes: 100 * 1024 * 1024,
            allowed_formats: [
                "mp3", "mpeg", "mpga", "wav", "m4a", "mp4", "aac", "ogg", "oga", "opus", "flac",
                "webm", "mov",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_keyterms: 100,
            max_keyterm_chars: 50,
            max_sound_prompt_chars: 450,
            min_sound_duration_secs: 0.5,
            max_sound_duration_secs: 22.0,
            max_music_prompt_chars: 2000,
            max_lyrics_chars: 3000,
            min_music_length_secs: 10.0,
            max_music_length_secs: 300.0,
            max_dialogue_lines: 10,
            max_dialogue_chars: 5000,
            max_voice_name_chars: 100,
        }
    }
}

/// Reject malformed input. Has no side effects.
pub fn validate(request: &GenerationRequest, limits: &ValidationLimits) -> Result<(), PipelineError> {
    match request {
        GenerationRequest::Speech(r) => {
            text_length("Text", &r.text, limits.max_text_chars)?;
            required("Voice ID", &r.voice_id)?;
            if let Some(speed) = r.speed {
                if !(0.7..=1.2).contains(&speed) {
                    return Err(PipelineError::validation("Speed must be between 0.7 and 1.2"));
                }
            }
        }
        GenerationRequest::Transcription(r) => {
            audio_file(&r.audio, limits)?;
            if r.keyterms.len() > limits.max_keyterms {
                return Err(PipelineError::validation(format!(
                    "At most {} keyterms are allowed",
                    limits.max_keyterms
                )));
            }
            for term in &r.keyterms {
                let len = term.trim().chars().count();
                if len == 0 || len > limits.max_keyterm_chars {
                    return Err(PipelineError::validation(format!(
                        "Each keyterm must be 1-{} characters",
                        limits.max_keyterm_chars
                    )));
                }
            }
        }
        GenerationRequest::SoundEffect(r) => {
            text_length("Prompt", &r.prompt, limits.max_sound_prompt_chars)?;
            if let Some(duration) = r.duration_secs {
                range(
                    "Duration",
                    duration,
                    limits.min_sound_duration_secs,
                    limits.max_sound_duration_secs,
                )?;
            }
            if let Some(influence) = r.prompt_influence {
                range("Prompt influence", influence, 0.0, 1.0)?;
            }
        }
        GenerationRequest::Music(r) => {
            text_length("Prompt", &r.prompt, limits.max_music_prompt_chars)?;
            if let Some(lyrics) = &r.lyrics {
                if lyrics.chars().count() > limits.max_lyrics_chars {
                    return Err(PipelineError::validation(format!(
                        "Lyrics must be at most {} characters",
                        limits.max_lyrics_chars
                    )));
                }
            }
            if let Some(length) = r.length_secs {
                range(
                    "Music length",
                    length,
                    limits.min_music_length_secs,
                    limits.max_music_length_secs,
                )?;
            }
        }
        GenerationRequest::VoiceIsolation(r) => audio_file(&r.audio, limits)?,
        GenerationRequest::VoiceConversion(r) => {
            audio_file(&r.audio, limits)?;
            required("Voice ID", &r.voice_id)?;
        }
        GenerationRequest::Dialogue(r) => {
            if r.lines.is_empty() || r.lines.len() > limits.max_dialogue_lines {
                return Err(PipelineError::validation(format!(
                    "Dialogue must have 1-{} lines",
                    limits.max_dialogue_lines
                )));
            }
            for (i, line) in r.lines.iter().enumerate() {
                if line.text.trim().is_empty() {
                    return Err(PipelineError::validation(format!("Line {} has no text", i + 1)));
                }
                if line.voice_id.trim().is_empty() {
                    return Err(PipelineError::validation(format!(
                        "Line {} has no voice ID",
                        i + 1
                    )));
                }
            }
            if r.total_characters() > limits.max_dialogue_chars {
                return Err(PipelineError::validation(format!(
                    "Dialogue must be at most {} characters in total",
                    limits.max_dialogue_chars
                )));
            }
        }
        GenerationRequest::Dubbing(r) => {
            audio_file(&r.audio, limits)?;
            required("Target language", &r.target_lang)?;
        }
        GenerationRequest::VoiceClone(r) => {
            text_length("Voice name", &r.name, limits.max_voice_name_chars)?;
            audio_file(&r.sample, limits)?;
        }
    }
    Ok(())
}

fn required(field: &str, value: &str) -> Result<(), PipelineError> {
    if value.trim().is_empty() {
        return Err(PipelineError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn text_length(field: &str, value: &str, max: usize) -> Result<(), PipelineError> {
    required(field, value)?;
    if value.chars().count() > max {
        return Err(PipelineError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

fn range(field: &str, value: f64, min: f64, max: f64) -> Result<(), PipelineError> {
    if !value.is_finite() || value < min || value > max {
        return Err(PipelineError::validation(format!(
            "{} must be between {} and {}",
            field, min, max
        )));
    }
    Ok(())
}

fn audio_file(audio: &AudioInput, limits: &ValidationLimits) -> Result<(), PipelineError> {
    if audio.bytes.is_empty() {
        return Err(PipelineError::validation("Audio file is required"));
    }
    if audio.bytes.len() > limits.max_file_bytes {
        return Err(PipelineError::validation(format!(
            "File size must be at most {} MB",
            limits.max_file_bytes / (1024 * 1024)
        )));
    }

    let format = audio
        .extension()
        .or_else(|| format_from_content_type(&audio.content_type));
    match format {
        Some(f) if limits.allowed_formats.iter().any(|a| a.eq_ignore_ascii_case(&f)) => Ok(()),
        _ => Err(PipelineError::validation(format!(
            "Unsupported file format. Allowed: {}",
            limits.allowed_formats.join(", ")
        ))),
    }
}

fn format_from_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim();
    let (top, sub) = essence.split_once('/')?;
    if top != "audio" && top != "video" {
        return None;
    }
    Some(sub.trim_start_matches("x-").to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        DialogueLine, DialogueRequest, MusicRequest, SoundEffectRequest, SpeechRequest,
        TranscriptionRequest, VoiceCloneRequest,
    };

    fn speech(text: &str, voice_id: &str) -> GenerationRequest {
        GenerationRequest::Speech(SpeechRequest {
            text: text.to_string(),
            voice_id: voice_id.to_string(),
            model_id: None,
            language: None,
            speed: None,
        })
    }

    fn transcription(audio: AudioInput, keyterms: Vec<String>) -> GenerationRequest {
        GenerationRequest::Transcription(TranscriptionRequest {
            audio,
            language: None,
            keyterms,
            diarize: false,
            model_id: None,
        })
    }

    fn dialogue(lines: usize, chars_per_line: usize) -> GenerationRequest {
        GenerationRequest::Dialogue(DialogueRequest {
            lines: (0..lines)
                .map(|i| DialogueLine {
                    text: "a".repeat(chars_per_line),
                    voice_id: format!("voice-{}", i),
                })
                .collect(),
            model_id: None,
        })
    }

    #[test]
    fn test_speech_text_bounds() {
        let limits = ValidationLimits::default();
        assert!(validate(&speech("hello", "v1"), &limits).is_ok());
        assert!(validate(&speech(&"a".repeat(5000), "v1"), &limits).is_ok());
        assert!(validate(&speech(&"a".repeat(5001), "v1"), &limits).is_err());
        assert!(validate(&speech("   ", "v1"), &limits).is_err());
        assert!(validate(&speech("hello", ""), &limits).is_err());
    }

    #[test]
    fn test_file_size_and_format() {
        let limits = ValidationLimits {
            max_file_bytes: 1024,
            ..Default::default()
        };
        let ok = AudioInput::new("clip.mp3", "audio/mpeg", vec![0; 1024]);
        assert!(validate(&transcription(ok, vec![]), &limits).is_ok());

        let too_big = AudioInput::new("clip.mp3", "audio/mpeg", vec![0; 1025]);
        assert!(validate(&transcription(too_big, vec![]), &limits).is_err());

        let empty = AudioInput::new("clip.mp3", "audio/mpeg", vec![]);
        assert!(validate(&transcription(empty, vec![]), &limits).is_err());

        let wrong = AudioInput::new("notes.txt", "text/plain", vec![1]);
        assert!(validate(&transcription(wrong, vec![]), &limits).is_err());

        let by_type = AudioInput::new("blob", "audio/x-wav", vec![1]);
        assert!(validate(&transcription(by_type, vec![]), &limits).is_ok());
    }

    #[test]
    fn test_keyterm_limits() {
        let limits = ValidationLimits::default();
        let audio = || AudioInput::new("a.wav", "audio/wav", vec![1]);

        let terms: Vec<String> = (0..100).map(|i| format!("term{}", i)).collect();
        assert!(validate(&transcription(audio(), terms), &limits).is_ok());

        let terms: Vec<String> = (0..101).map(|i| format!("term{}", i)).collect();
        assert!(validate(&transcription(audio(), terms), &limits).is_err());

        assert!(validate(&transcription(audio(), vec!["a".repeat(51)]), &limits).is_err());
    }

    #[test]
    fn test_dialogue_limits() {
        let limits = ValidationLimits::default();
        assert!(validate(&dialogue(5, 80), &limits).is_ok());
        assert!(validate(&dialogue(0, 10), &limits).is_err());
        assert!(validate(&dialogue(11, 10), &limits).is_err());
        assert!(validate(&dialogue(10, 501), &limits).is_err());
    }

    #[test]
    fn test_sound_and_music_ranges() {
        let limits = ValidationLimits::default();
        let sound = |duration| {
            GenerationRequest::SoundEffect(SoundEffectRequest {
                prompt: "thunder".to_string(),
                duration_secs: duration,
                prompt_influence: None,
            })
        };
        assert!(validate(&sound(None), &limits).is_ok());
        assert!(validate(&sound(Some(0.5)), &limits).is_ok());
        assert!(validate(&sound(Some(22.5)), &limits).is_err());

        let music = |length| {
            GenerationRequest::Music(MusicRequest {
                prompt: "lofi beat".to_string(),
                lyrics: None,
                length_secs: length,
                instrumental: true,
            })
        };
        assert!(validate(&music(Some(10.0)), &limits).is_ok());
        assert!(validate(&music(Some(5.0)), &limits).is_err());
        assert!(validate(&music(Some(f64::NAN)), &limits).is_err());
    }

    #[test]
    fn test_voice_clone_name() {
        let limits = ValidationLimits::default();
        let clone = |name: &str| {
            GenerationRequest::VoiceClone(VoiceCloneRequest {
                name: name.to_string(),
                description: None,
                sample: AudioInput::new("me.m4a", "audio/mp4", vec![1, 2]),
                remove_background_noise: false,
            })
        };
        assert!(validate(&clone("Narrator"), &limits).is_ok());
        assert!(validate(&clone(""), &limits).is_err());
        assert!(validate(&clone(&"n".repeat(101)), &limits).is_err());
    }
}
