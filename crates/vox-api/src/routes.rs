//! Route definitions

use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};

use crate::handlers::{
    clone_voice, delete_generation, dubbing, get_audio, get_generation, health,
    list_generations, music, set_favorite, sound_effects, speech_to_text, text_to_dialogue,
    text_to_speech, usage, voice_changer, voice_isolator,
};
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::server::AppState;

/// Create the API router
pub fn routes(state: AppState) -> Router<AppState> {
    // Generation endpoints (rate limited)
    let generate = Router::new()
        .route("/api/text-to-speech", post(text_to_speech))
        .route("/api/speech-to-text", post(speech_to_text))
        .route("/api/sound-effects", post(sound_effects))
        .route("/api/music", post(music))
        .route("/api/voice-isolator", post(voice_isolator))
        .route("/api/voice-changer", post(voice_changer))
        .route("/api/text-to-dialogue", post(text_to_dialogue))
        .route("/api/dubbing", post(dubbing))
        .route("/api/voices/clone", post(clone_voice))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware));

    // Everything under /api requires an identity
    let api = Router::new()
        .route("/api/generations", get(list_generations))
        .route(
            "/api/generations/{id}",
            get(get_generation).delete(delete_generation),
        )
        .route("/api/generations/{id}/favorite", patch(set_favorite))
        .route("/api/audio/{*path}", get(get_audio))
        .route("/api/usage", get(usage))
        .merge(generate)
        .route_layer(from_fn_with_state(state, auth_middleware));

    Router::new()
        // Health check
        .route("/health", get(health))
        .merge(api)
}
