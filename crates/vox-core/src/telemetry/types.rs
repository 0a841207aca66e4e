//! Telemetry event types

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use thiserror::Error;

use crate::generation::{GenerationRecord, RecordKind};
use crate::quota::QuotaDenial;

pub const GENERATION_CREATED: &str = "generation_created";
pub const GENERATION_DELETED: &str = "generation_deleted";
pub const USAGE_LIMIT_HIT: &str = "usage_limit_hit";
pub const ARTIFACT_CLEANUP_FAILED: &str = "artifact_cleanup_failed";

/// Fire-and-forget analytics event keyed by user id. Never carries generated content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub event: String,
    pub distinct_id: String,
    pub properties: Map<String, JsonValue>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(event: impl Into<String>, distinct_id: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            distinct_id: distinct_id.into(),
            properties: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn generation_created(record: &GenerationRecord) -> Self {
        Self::new(GENERATION_CREATED, &record.user_id)
            .with_property("generation_id", record.id.as_str())
            .with_property("kind", record.kind.as_str())
            .with_property("provider", json!(record.provider.map(|p| p.as_str())))
            .with_property("duration_secs", json!(record.duration_secs))
    }

    pub fn generation_deleted(record: &GenerationRecord, artifact_deleted: bool) -> Self {
        Self::new(GENERATION_DELETED, &record.user_id)
            .with_property("generation_id", record.id.as_str())
            .with_property("kind", record.kind.as_str())
            .with_property("artifact_deleted", artifact_deleted)
    }

    pub fn usage_limit_hit(user_id: &str, kind: RecordKind, denial: &QuotaDenial) -> Self {
        Self::new(USAGE_LIMIT_HIT, user_id)
            .with_property("kind", kind.as_str())
            .with_property("dimension", denial.dimension.as_str())
            .with_property("attempted", denial.attempted)
            .with_property("limit", denial.limit)
    }

    pub fn artifact_cleanup_failed(
        user_id: &str,
        kind: RecordKind,
        record_id: &str,
        path: &str,
    ) -> Self {
        Self::new(ARTIFACT_CLEANUP_FAILED, user_id)
            .with_property("kind", kind.as_str())
            .with_property("generation_id", record_id)
            .with_property("artifact_path", path)
    }
}

/// Sink delivery failures
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to write telemetry event: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to serialize telemetry event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Telemetry delivery failed: {0}")]
    Delivery(String),

    #[error("Telemetry lock poisoned")]
    LockPoisoned,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::Dimension;

    #[test]
    fn test_usage_limit_hit_properties() {
        let denial = QuotaDenial {
            dimension: Dimension::Characters,
            attempted: 10010.0,
            limit: 10000.0,
        };
        let event = TelemetryEvent::usage_limit_hit("u1", RecordKind::Speech, &denial);

        assert_eq!(event.event, USAGE_LIMIT_HIT);
        assert_eq!(event.distinct_id, "u1");
        assert_eq!(event.properties["dimension"], "characters");
        assert_eq!(event.properties["attempted"], 10010.0);
        assert_eq!(event.properties["limit"], 10000.0);
    }
}
