//! Telemetry
//!
//! Analytics events are delivered in the background. Delivery failures are
//! logged and dropped; they never reach the caller.

mod sink;
mod types;

use std::sync::Arc;

use tracing::{debug, warn};

pub use sink::{HttpSink, LogSink, TelemetrySink};
pub use types::{
    TelemetryError, TelemetryEvent, ARTIFACT_CLEANUP_FAILED, GENERATION_CREATED,
    GENERATION_DELETED, USAGE_LIMIT_HIT,
};

/// Fan-out handle over the configured sinks
#[derive(Clone, Default)]
pub struct Telemetry {
    sinks: Arc<Vec<Arc<dyn TelemetrySink>>>,
}

impl Telemetry {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Send without waiting. Outside a runtime the event is dropped.
    pub fn emit(&self, event: TelemetryEvent) {
        if self.sinks.is_empty() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime, dropping telemetry event {}", event.event);
            return;
        };

        let sinks = Arc::clone(&self.sinks);
        handle.spawn(async move {
            deliver(&sinks, &event).await;
        });
    }

    /// Send to every sink and wait for completion
    pub async fn emit_now(&self, event: &TelemetryEvent) {
        deliver(&self.sinks, event).await;
    }
}

async fn deliver(sinks: &[Arc<dyn TelemetrySink>], event: &TelemetryEvent) {
    for sink in sinks {
        if let Err(e) = sink.send(event).await {
            warn!("Telemetry sink {} failed for {}: {}", sink.name(), event.event, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TelemetrySink for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
            self.events.lock().unwrap().push(event.event.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl TelemetrySink for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn send(&self, _event: &TelemetryEvent) -> Result<(), TelemetryError> {
            Err(TelemetryError::Delivery("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let recording = Arc::new(Recording::default());
        let telemetry = Telemetry::new(vec![Arc::new(Failing), recording.clone()]);

        telemetry
            .emit_now(&TelemetryEvent::new(GENERATION_CREATED, "u1"))
            .await;

        assert_eq!(*recording.events.lock().unwrap(), vec![GENERATION_CREATED]);
    }

    #[tokio::test]
    async fn test_emit_spawns_delivery() {
        let recording = Arc::new(Recording::default());
        let telemetry = Telemetry::new(vec![recording.clone()]);

        telemetry.emit(TelemetryEvent::new(USAGE_LIMIT_HIT, "u1"));
        for _ in 0..50 {
            if !recording.events.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert_eq!(*recording.events.lock().unwrap(), vec![USAGE_LIMIT_HIT]);
    }

    #[test]
    fn test_emit_without_runtime_is_noop() {
        let telemetry = Telemetry::new(vec![Arc::new(Failing)]);
        telemetry.emit(TelemetryEvent::new(GENERATION_DELETED, "u1"));
        assert!(telemetry.is_enabled());
        assert!(!Telemetry::disabled().is_enabled());
    }
}
