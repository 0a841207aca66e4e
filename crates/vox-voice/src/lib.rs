//! vox-voice: provider clients for Vox Studio
//!
//! Each client implements [`vox_core::provider::Provider`] and maps its wire
//! format onto the shared request and result types.
//!
//! ## Providers
//!
//! - **ElevenLabs**: every generation kind
//! - **Minimax**: speech and music
//! - **Noiz**: speech
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vox_voice::build_gateway;
//!
//! let config = vox_core::Config::load(None)?;
//! let gateway = build_gateway(&config.providers)?;
//! let (provider, result) = gateway.invoke(None, &request).await?;
//! ```

pub mod elevenlabs;
pub mod error;
mod http;
pub mod minimax;
pub mod noiz;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use vox_core::provider::{ProviderGateway, ProviderKind};
use vox_core::ProvidersConfig;

pub use elevenlabs::{ElevenLabsClient, ElevenLabsConfig};
pub use error::{Result, VoiceError};
pub use minimax::{MinimaxClient, MinimaxConfig};
pub use noiz::{NoizClient, NoizConfig};

/// Register every provider that has credentials
pub fn build_gateway(config: &ProvidersConfig) -> Result<ProviderGateway> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut gateway = ProviderGateway::new(config.primary).with_timeout(timeout);

    if let Some(creds) = config.credentials(ProviderKind::ElevenLabs) {
        let mut cfg = ElevenLabsConfig::new(&creds.api_key).with_timeout(timeout);
        if let Some(url) = &creds.base_url {
            cfg = cfg.with_base_url(url);
        }
        if let Some(model) = &creds.model {
            cfg = cfg.with_model(model);
        }
        gateway.register(Arc::new(ElevenLabsClient::new(cfg)?));
    }

    if let Some(creds) = config.credentials(ProviderKind::Minimax) {
        let mut cfg = MinimaxConfig::new(&creds.api_key).with_timeout(timeout);
        if let Some(url) = &creds.base_url {
            cfg = cfg.with_base_url(url);
        }
        if let Some(model) = &creds.model {
            cfg = cfg.with_model(model);
        }
        if let Some(group_id) = &creds.group_id {
            cfg = cfg.with_group_id(group_id);
        }
        gateway.register(Arc::new(MinimaxClient::new(cfg)?));
    }

    if let Some(creds) = config.credentials(ProviderKind::Noiz) {
        let mut cfg = NoizConfig::new(&creds.api_key).with_timeout(timeout);
        if let Some(url) = &creds.base_url {
            cfg = cfg.with_base_url(url);
        }
        gateway.register(Arc::new(NoizClient::new(cfg)?));
    }

    let registered = gateway.registered();
    if !registered.contains(&config.primary) {
        warn!("Primary provider {} has no credentials", config.primary);
    }
    info!("Providers registered: {:?} (primary {})", registered, config.primary);

    Ok(gateway)
}
