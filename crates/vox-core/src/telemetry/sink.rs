//! Telemetry sink implementations

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use super::types::{TelemetryError, TelemetryEvent};

/// Destination for telemetry events
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Writes events as structured log lines and, optionally, to a JSON-lines file
pub struct LogSink {
    file: Mutex<Option<File>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            file: Mutex::new(None),
        }
    }

    /// Also append every event to `path` as one JSON object per line
    pub fn with_file(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!("Telemetry events appended to {}", path.display());
        Ok(Self {
            file: Mutex::new(Some(file)),
        })
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetrySink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let line = serde_json::to_string(event)?;
        info!(target: "telemetry", event = %event.event, user_id = %event.distinct_id, "{}", line);

        let mut guard = self.file.lock().map_err(|_| TelemetryError::LockPoisoned)?;
        if let Some(file) = guard.as_mut() {
            file.write_all(format!("{}\n", line).as_bytes())?;
        }
        Ok(())
    }
}

/// PostHog-style capture endpoint
pub struct HttpSink {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, TelemetryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TelemetryError::Delivery(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let url = format!("{}/capture/", self.endpoint);
        let body = json!({
            "api_key": self.api_key,
            "event": event.event,
            "distinct_id": event.distinct_id,
            "properties": event.properties,
            "timestamp": event.timestamp.to_rfc3339(),
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TelemetryError::Delivery(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TelemetryError::Delivery(format!(
                "API error {}: {}",
                status, error_text
            )));
        }

        debug!("Captured {} for {}", event.event, event.distinct_id);
        Ok(())
    }
}
