//! Provider gateway
//!
//! Typed generation requests and the registry that dispatches them to one
//! external provider. Wire formats live in the provider implementations.

mod gateway;
mod types;

pub use gateway::{Provider, ProviderGateway};
pub use types::{
    AudioInput, DialogueLine, DialogueRequest, DubbingRequest, GenerationRequest, MusicRequest,
    ProviderError, ProviderKind, ProviderMetadata, ProviderResult, SoundEffectRequest,
    SpeechRequest, TranscriptionRequest, VoiceCloneRequest, VoiceConversionRequest,
    VoiceIsolationRequest, WordTiming,
};
