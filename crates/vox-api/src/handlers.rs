//! HTTP API handlers
//!
//! JSON and multipart request parsing for every generation kind, plus the
//! history, audio proxy and usage endpoints.

use std::collections::HashMap;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use vox_core::generation::{GenerationRecord, RecordKind};
use vox_core::pipeline::{DeletedGeneration, GenerationOutcome, UsageReport};
use vox_core::provider::{
    AudioInput, DialogueRequest, DubbingRequest, GenerationRequest, MusicRequest, ProviderKind,
    SoundEffectRequest, SpeechRequest, TranscriptionRequest, VoiceCloneRequest,
    VoiceConversionRequest, VoiceIsolationRequest,
};

use crate::error::{ApiError, Result};
use crate::middleware::auth::AuthUser;
use crate::server::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// JSON generation body: the kind's fields plus an optional provider
#[derive(Debug, Deserialize)]
pub struct GenerateBody<T> {
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    #[serde(flatten)]
    pub request: T,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub kind: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteBody {
    pub favorite: bool,
}

#[derive(Debug, Serialize)]
pub struct GenerationList {
    pub generations: Vec<GenerationRecord>,
    pub count: usize,
}

fn json_body<T: DeserializeOwned>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e.body_text())))
}

// ============================================================================
// Multipart forms
// ============================================================================

const FILE_FIELDS: [&str; 4] = ["file", "audio", "sample", "files"];

/// Parsed multipart upload: one audio file plus text fields
#[derive(Debug, Default)]
pub struct UploadForm {
    file: Option<AudioInput>,
    fields: HashMap<String, Vec<String>>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e.body_text())))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if FILE_FIELDS.contains(&name.as_str()) && form.file.is_none() {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read upload: {}", e.body_text()))
                })?;
                debug!("Received upload {} ({} bytes)", file_name, bytes.len());
                form.file = Some(AudioInput::new(file_name, content_type, bytes.to_vec()));
            } else {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Invalid form field {}: {}", name, e.body_text()))
                })?;
                form.fields.entry(name).or_default().push(value);
            }
        }

        Ok(form)
    }

    pub fn take_file(&mut self) -> Result<AudioInput> {
        self.file
            .take()
            .ok_or_else(|| ApiError::bad_request("No file provided"))
    }

    /// First non-empty value of a text field
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)?
            .iter()
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.text(name)
            .is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "on" | "yes"))
    }

    /// Repeated fields, each possibly a JSON array or a comma-separated list
    pub fn list(&self, name: &str) -> Vec<String> {
        let Some(values) = self.fields.get(name) else {
            return Vec::new();
        };
        values
            .iter()
            .flat_map(|value| match serde_json::from_str::<Vec<String>>(value) {
                Ok(items) => items,
                Err(_) => value.split(',').map(str::to_string).collect(),
            })
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }

    pub fn number<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.text(name)
            .map(|v| {
                v.parse()
                    .map_err(|_| ApiError::bad_request(format!("{} must be a number", name)))
            })
            .transpose()
    }

    pub fn provider(&self) -> Result<Option<ProviderKind>> {
        self.text("provider")
            .map(|p| p.parse().map_err(|e: vox_core::Error| ApiError::bad_request(e.to_string())))
            .transpose()
    }
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

async fn generate(
    state: &AppState,
    user_id: &str,
    provider: Option<ProviderKind>,
    request: GenerationRequest,
) -> Result<Json<ApiResponse<GenerationOutcome>>> {
    info!("{} request from user {}", request.operation(), user_id);
    let outcome = state.pipeline.run(user_id, provider, request).await?;
    Ok(ApiResponse::ok(outcome))
}

pub async fn text_to_speech(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: std::result::Result<Json<GenerateBody<SpeechRequest>>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationOutcome>>> {
    let body = json_body(body)?;
    generate(&state, &user_id, body.provider, GenerationRequest::Speech(body.request)).await
}

pub async fn sound_effects(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: std::result::Result<Json<GenerateBody<SoundEffectRequest>>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationOutcome>>> {
    let body = json_body(body)?;
    generate(&state, &user_id, body.provider, GenerationRequest::SoundEffect(body.request)).await
}

pub async fn music(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: std::result::Result<Json<GenerateBody<MusicRequest>>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationOutcome>>> {
    let body = json_body(body)?;
    generate(&state, &user_id, body.provider, GenerationRequest::Music(body.request)).await
}

pub async fn text_to_dialogue(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: std::result::Result<Json<GenerateBody<DialogueRequest>>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationOutcome>>> {
    let body = json_body(body)?;
    generate(&state, &user_id, body.provider, GenerationRequest::Dialogue(body.request)).await
}

pub async fn speech_to_text(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<GenerationOutcome>>> {
    let mut form = UploadForm::read(multipart).await?;
    let request = TranscriptionRequest {
        audio: form.take_file()?,
        language: form.text("language").or_else(|| form.text("language_code")),
        keyterms: form.list("keyterms"),
        diarize: form.flag("diarize"),
        model_id: form.text("model_id"),
    };
    generate(&state, &user_id, form.provider()?, GenerationRequest::Transcription(request)).await
}

pub async fn voice_isolator(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<GenerationOutcome>>> {
    let mut form = UploadForm::read(multipart).await?;
    let request = VoiceIsolationRequest {
        audio: form.take_file()?,
    };
    generate(&state, &user_id, form.provider()?, GenerationRequest::VoiceIsolation(request)).await
}

pub async fn voice_changer(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<GenerationOutcome>>> {
    let mut form = UploadForm::read(multipart).await?;
    let request = VoiceConversionRequest {
        audio: form.take_file()?,
        voice_id: form.text("voice_id").unwrap_or_default(),
        model_id: form.text("model_id"),
    };
    generate(&state, &user_id, form.provider()?, GenerationRequest::VoiceConversion(request)).await
}

pub async fn dubbing(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<GenerationOutcome>>> {
    let mut form = UploadForm::read(multipart).await?;
    let request = DubbingRequest {
        audio: form.take_file()?,
        target_lang: form.text("target_lang").unwrap_or_default(),
        source_lang: form.text("source_lang"),
        num_speakers: form.number("num_speakers")?,
    };
    generate(&state, &user_id, form.provider()?, GenerationRequest::Dubbing(request)).await
}

pub async fn clone_voice(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<GenerationOutcome>>> {
    let mut form = UploadForm::read(multipart).await?;
    let request = VoiceCloneRequest {
        sample: form.take_file()?,
        name: form.text("name").unwrap_or_default(),
        description: form.text("description"),
        remove_background_noise: form.flag("remove_background_noise"),
    };
    generate(&state, &user_id, form.provider()?, GenerationRequest::VoiceClone(request)).await
}

pub async fn list_generations(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<GenerationList>>> {
    let Query(query) =
        query.map_err(|e| ApiError::bad_request(format!("Invalid query: {}", e.body_text())))?;
    let kind = query
        .kind
        .filter(|k| !k.is_empty())
        .map(|k| k.parse::<RecordKind>())
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let generations = state
        .pipeline
        .list_generations(&user_id, kind, query.limit)
        .await?;
    Ok(ApiResponse::ok(GenerationList {
        count: generations.len(),
        generations,
    }))
}

pub async fn get_generation(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<GenerationRecord>>> {
    let record = state.pipeline.get_generation(&user_id, &id).await?;
    Ok(ApiResponse::ok(record))
}

pub async fn set_favorite(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
    body: std::result::Result<Json<FavoriteBody>, JsonRejection>,
) -> Result<Json<ApiResponse<GenerationRecord>>> {
    let body = json_body(body)?;
    let record = state
        .pipeline
        .set_favorite(&user_id, &id, body.favorite)
        .await?;
    Ok(ApiResponse::ok(record))
}

pub async fn delete_generation(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletedGeneration>>> {
    let deleted = state.pipeline.delete_generation(&user_id, &id).await?;
    Ok(ApiResponse::ok(deleted))
}

/// Stream an owned artifact with its stored content type
pub async fn get_audio(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(path): Path<String>,
) -> Result<Response> {
    let artifact = state.pipeline.download(&user_id, &path).await?;
    debug!("Serving {} ({} bytes) to user {}", path, artifact.length, user_id);

    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type),
            (header::CONTENT_LENGTH, artifact.length.to_string()),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
        ],
        artifact.bytes,
    )
        .into_response())
}

pub async fn usage(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<ApiResponse<UsageReport>>> {
    let report = state.pipeline.usage(&user_id).await?;
    Ok(ApiResponse::ok(report))
}
