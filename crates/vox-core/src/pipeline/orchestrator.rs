//! Generation pipeline orchestrator
//!
//! validate -> check quota -> call provider -> upload artifact -> persist record
//! -> commit quota -> emit event. Any failure after the upload unwinds what this
//! run created before the error is returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{
    CleanupFailure, PersistenceFailure, PipelineError, COMMIT_USAGE_CONTEXT,
    PERSIST_RECORD_CONTEXT,
};
use super::plan::{artifact_duration, artifact_payload, committed_usage, usage_estimate};
use super::validate::{validate, ValidationLimits};
use crate::generation::{GenerationLedger, GenerationRecord, RecordKind};
use crate::provider::{GenerationRequest, ProviderGateway, ProviderKind, ProviderMetadata};
use crate::quota::{PlanLimits, QuotaDecision, QuotaLedger, UserAccount};
use crate::storage::{path_owner, proxy_url, ArtifactKey, ArtifactStore, DownloadedArtifact, StorageError};
use crate::telemetry::{Telemetry, TelemetryEvent};

const MAX_LIST_LIMIT: usize = 100;

type IdSource = Arc<dyn Fn() -> String + Send + Sync>;
type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Completed run
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub record: GenerationRecord,
    /// Proxy path, never a raw storage URL
    pub url: String,
    pub metadata: ProviderMetadata,
}

/// Result of a user-initiated delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedGeneration {
    pub id: String,
    pub artifact_deleted: bool,
}

/// Plan, period and counters for one user
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    #[serde(flatten)]
    pub account: UserAccount,
    pub limits: PlanLimits,
}

/// Composes the quota ledger, provider gateway, artifact store and generation ledger
pub struct Pipeline {
    quota: Arc<dyn QuotaLedger>,
    providers: Arc<ProviderGateway>,
    store: Arc<dyn ArtifactStore>,
    generations: Arc<dyn GenerationLedger>,
    telemetry: Telemetry,
    limits: ValidationLimits,
    ids: IdSource,
    clock: Clock,
}

impl Pipeline {
    pub fn new(
        quota: Arc<dyn QuotaLedger>,
        providers: Arc<ProviderGateway>,
        store: Arc<dyn ArtifactStore>,
        generations: Arc<dyn GenerationLedger>,
    ) -> Self {
        Self {
            quota,
            providers,
            store,
            generations,
            telemetry: Telemetry::disabled(),
            limits: ValidationLimits::default(),
            ids: Arc::new(|| Uuid::new_v4().to_string()),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_limits(mut self, limits: ValidationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Override record id generation
    pub fn with_id_source(mut self, ids: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Override the clock used for timestamps and artifact time buckets
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Run one generation end to end
    pub async fn run(
        &self,
        user_id: &str,
        provider: Option<ProviderKind>,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome, PipelineError> {
        let kind = request.kind();

        validate(&request, &self.limits)?;

        let estimate = usage_estimate(&request);
        if let QuotaDecision::Denied(denial) =
            self.quota.check_and_reserve(user_id, &estimate).await?
        {
            info!(
                "Usage limit hit for user {} ({}): {} attempted {} of {}",
                user_id, kind, denial.dimension, denial.attempted, denial.limit
            );
            self.telemetry
                .emit(TelemetryEvent::usage_limit_hit(user_id, kind, &denial));
            return Err(PipelineError::QuotaDenied(denial));
        }

        let (provider, result) = self
            .providers
            .invoke(provider, &request)
            .await
            .inspect_err(|e| error!("Provider call failed for user {} ({}): {}", user_id, kind, e))?;

        let metadata = result.metadata.clone();
        let committed = committed_usage(&request, &metadata);
        let payload = artifact_payload(&request, provider, result)?;
        let duration_secs = artifact_duration(&metadata, &payload);

        let record_id = (self.ids)();
        let now = (self.clock)();
        let key = ArtifactKey::new(kind, user_id, &record_id, &payload.extension, now);
        let content_type = payload.content_type.clone();
        let size = payload.bytes.len();

        let stored = self
            .store
            .upload(&key, payload.bytes, &content_type)
            .await
            .inspect_err(|e| error!("Artifact upload failed for user {} ({}): {}", user_id, kind, e))?;
        info!("Uploaded {} artifact {} ({} bytes)", kind, stored.path, size);

        let record = GenerationRecord {
            id: record_id,
            user_id: user_id.to_string(),
            kind,
            provider: Some(provider),
            input: request.input_summary(),
            artifact_path: stored.path.clone(),
            artifact_file_id: stored.file_id.clone(),
            content_type,
            duration_secs: Some(duration_secs),
            language: metadata.language.clone(),
            favorite: false,
            metadata: serde_json::to_value(&metadata)
                .map_err(|e| PipelineError::Internal(e.to_string()))?,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.generations.create(&record).await {
            error!("Failed to persist {} generation {}: {}", kind, record.id, e);
            let cleanup_failures = self.delete_artifact(&record).await;
            return Err(PipelineError::Persistence(PersistenceFailure::new(
                PERSIST_RECORD_CONTEXT,
                e,
                cleanup_failures,
            )));
        }

        match self.quota.commit(user_id, &committed).await {
            Ok(QuotaDecision::Allowed) => {}
            Ok(QuotaDecision::Denied(denial)) => {
                warn!(
                    "Usage commit denied for user {} ({}), unwinding generation {}",
                    user_id, kind, record.id
                );
                let cleanup_failures = self.unwind(&record).await;
                self.telemetry
                    .emit(TelemetryEvent::usage_limit_hit(user_id, kind, &denial));
                if cleanup_failures.is_empty() {
                    return Err(PipelineError::QuotaDenied(denial));
                }
                return Err(PipelineError::Persistence(PersistenceFailure::new(
                    COMMIT_USAGE_CONTEXT,
                    PipelineError::QuotaDenied(denial),
                    cleanup_failures,
                )));
            }
            Err(e) => {
                error!("Failed to commit usage for generation {}: {}", record.id, e);
                let cleanup_failures = self.unwind(&record).await;
                return Err(PipelineError::Persistence(PersistenceFailure::new(
                    COMMIT_USAGE_CONTEXT,
                    e,
                    cleanup_failures,
                )));
            }
        }

        self.telemetry
            .emit(TelemetryEvent::generation_created(&record));
        info!(
            "Generation {} completed for user {} ({} via {})",
            record.id, user_id, kind, provider
        );

        Ok(GenerationOutcome {
            url: proxy_url(&record.artifact_path),
            record,
            metadata,
        })
    }

    /// Remove the record and artifact created by a run that cannot complete
    async fn unwind(&self, record: &GenerationRecord) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();
        if let Err(e) = self.generations.delete(&record.user_id, &record.id).await {
            warn!("Failed to remove generation {} during unwind: {}", record.id, e);
            failures.push(CleanupFailure {
                resource: format!("generation {}", record.id),
                cause: e.to_string(),
            });
        }
        failures.extend(self.delete_artifact(record).await);
        failures
    }

    async fn delete_artifact(&self, record: &GenerationRecord) -> Vec<CleanupFailure> {
        match self
            .store
            .delete(&record.artifact_path, record.artifact_file_id.as_deref())
            .await
        {
            Ok(()) => {
                info!("Removed artifact {} after failed run", record.artifact_path);
                Vec::new()
            }
            Err(e) => {
                warn!("Orphaned artifact {}: {}", record.artifact_path, e);
                self.telemetry.emit(TelemetryEvent::artifact_cleanup_failed(
                    &record.user_id,
                    record.kind,
                    &record.id,
                    &record.artifact_path,
                ));
                vec![CleanupFailure {
                    resource: format!("artifact {}", record.artifact_path),
                    cause: e.to_string(),
                }]
            }
        }
    }

    pub async fn get_generation(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<GenerationRecord, PipelineError> {
        self.generations
            .get(user_id, id)
            .await?
            .ok_or_else(|| PipelineError::NotFound("Generation".to_string()))
    }

    pub async fn list_generations(
        &self,
        user_id: &str,
        kind: Option<RecordKind>,
        limit: Option<usize>,
    ) -> Result<Vec<GenerationRecord>, PipelineError> {
        let limit = limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT);
        Ok(self.generations.list(user_id, kind, limit).await?)
    }

    pub async fn set_favorite(
        &self,
        user_id: &str,
        id: &str,
        favorite: bool,
    ) -> Result<GenerationRecord, PipelineError> {
        self.generations
            .set_favorite(user_id, id, favorite)
            .await?
            .ok_or_else(|| PipelineError::NotFound("Generation".to_string()))
    }

    /// Delete a record, then its artifact. Usage is not refunded.
    pub async fn delete_generation(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<DeletedGeneration, PipelineError> {
        let record = self.get_generation(user_id, id).await?;
        if !self.generations.delete(user_id, id).await? {
            return Err(PipelineError::NotFound("Generation".to_string()));
        }

        let artifact_deleted = self
            .store
            .delete_best_effort(&record.artifact_path, record.artifact_file_id.as_deref())
            .await;
        if !artifact_deleted {
            self.telemetry.emit(TelemetryEvent::artifact_cleanup_failed(
                user_id,
                record.kind,
                &record.id,
                &record.artifact_path,
            ));
        }

        self.telemetry
            .emit(TelemetryEvent::generation_deleted(&record, artifact_deleted));
        info!("Deleted {} generation {} for user {}", record.kind, id, user_id);

        Ok(DeletedGeneration {
            id: record.id,
            artifact_deleted,
        })
    }

    /// Fetch an artifact owned by `user_id`
    pub async fn download(
        &self,
        user_id: &str,
        path: &str,
    ) -> Result<DownloadedArtifact, PipelineError> {
        let traversal = path.split('/').any(|s| s == ".." || s == ".");
        if traversal || path_owner(path) != Some(user_id) {
            return Err(PipelineError::NotFound("Audio file".to_string()));
        }

        self.store.download(path).await.map_err(|e| match e {
            StorageError::NotFound(_) => PipelineError::NotFound("Audio file".to_string()),
            other => PipelineError::Storage(other),
        })
    }

    pub async fn usage(&self, user_id: &str) -> Result<UsageReport, PipelineError> {
        let account = self.quota.account(user_id).await?;
        let limits = self.quota.limits(account.plan);
        Ok(UsageReport { account, limits })
    }
}
