//! vox-core: Vox Studio core library
//!
//! Quota accounting, the generation ledger, the provider and storage seams,
//! and the pipeline that composes them into one quota-gated generation run.

pub mod config;
pub mod db;
pub mod duration;
pub mod error;
pub mod generation;
pub mod pipeline;
pub mod provider;
pub mod quota;
pub mod storage;
pub mod telemetry;

pub use config::{
    B2Config, Config, DatabaseConfig, ProviderCredentials, ProvidersConfig, ServerConfig,
    StorageBackend, StorageConfig, TelemetryConfig,
};
pub use db::Database;
pub use error::{Error, Result};
pub use generation::{GenerationLedger, GenerationRecord, RecordKind, SqliteGenerationLedger};
pub use pipeline::{Pipeline, PipelineError, ValidationLimits};
pub use provider::{GenerationRequest, Provider, ProviderError, ProviderGateway, ProviderKind};
pub use quota::{Dimension, PlanTable, PlanTier, QuotaLedger, SqliteQuotaLedger};
pub use storage::{ArtifactStore, StorageError};
pub use telemetry::{Telemetry, TelemetryEvent};
