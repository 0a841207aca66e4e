//! Provider registry and dispatch

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::types::{GenerationRequest, ProviderError, ProviderKind, ProviderResult};

/// One external generation API
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Submit the request and return raw bytes plus metadata
    async fn invoke(&self, request: &GenerationRequest) -> Result<ProviderResult, ProviderError>;
}

/// Dispatches requests to registered providers. Performs no retries.
pub struct ProviderGateway {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
    primary: ProviderKind,
    timeout: Option<Duration>,
}

impl ProviderGateway {
    pub fn new(primary: ProviderKind) -> Self {
        Self {
            providers: HashMap::new(),
            primary,
            timeout: None,
        }
    }

    /// Bound every invocation by a request-level timeout, except long-running
    /// jobs which carry their own polling budget
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let kind = provider.kind();
        if self.providers.insert(kind, provider).is_some() {
            warn!("Provider {} registered twice, keeping the latest", kind);
        } else {
            info!("Registered provider: {}", kind);
        }
    }

    pub fn primary(&self) -> ProviderKind {
        self.primary
    }

    pub fn registered(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|k| self.providers.contains_key(k))
            .collect()
    }

    /// Pick the requested provider, or the primary one
    pub fn resolve(&self, requested: Option<ProviderKind>) -> Result<Arc<dyn Provider>, ProviderError> {
        let kind = requested.unwrap_or(self.primary);
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(ProviderError::NotConfigured(kind))
    }

    /// Invoke one provider; returns which provider served the request
    pub async fn invoke(
        &self,
        requested: Option<ProviderKind>,
        request: &GenerationRequest,
    ) -> Result<(ProviderKind, ProviderResult), ProviderError> {
        let provider = self.resolve(requested)?;
        let kind = provider.kind();
        debug!("Invoking {} for {}", kind, request.operation());

        let limit = self.timeout.filter(|_| !request.is_long_running());
        let result = match limit {
            Some(limit) => tokio::time::timeout(limit, provider.invoke(request))
                .await
                .map_err(|_| ProviderError::Timeout(kind))?,
            None => provider.invoke(request).await,
        }?;

        debug!(
            "{} returned {} bytes ({})",
            kind,
            result.bytes.len(),
            result.content_type
        );
        Ok((kind, result))
    }
}
