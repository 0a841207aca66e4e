//! Generation pipeline
//!
//! Runs one quota-gated generation per request and unwinds anything it
//! created when a later step fails.

mod error;
mod orchestrator;
mod plan;
mod validate;


pub use error::{
    CleanupFailure, PersistenceFailure, PipelineError, COMMIT_USAGE_CONTEXT,
    PERSIST_RECORD_CONTEXT,
};
pub use orchestrator::{DeletedGeneration, GenerationOutcome, Pipeline, UsageReport};
pub use plan::{
    artifact_payload, committed_usage, extension_for_content_type, measured_duration,
    usage_estimate, ArtifactPayload,
};
pub use validate::{validate, ValidationLimits};
