//! HTTP API Server
//!
//! Builds the router and runs it until the shutdown signal resolves.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use vox_core::{Pipeline, ServerConfig};

use crate::middleware::auth::USER_ID_HEADER;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use crate::routes::routes;

const DEFAULT_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

/// Multipart framing on top of the largest accepted upload
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub limiter: RateLimiter,
    /// Proxy bearer key; `None` admits any caller that names a user
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, config: &ServerConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            limiter: RateLimiter::new(RateLimitConfig::per_minute(config.rate_limit_per_minute)),
            api_key: config.api_key.clone(),
        }
    }
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = match &config.allowed_origins {
        Some(origins) => origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect(),
        None => DEFAULT_ORIGINS
            .into_iter()
            .map(HeaderValue::from_static)
            .collect(),
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(USER_ID_HEADER),
        ])
}

/// Router with every layer applied
pub fn app(state: AppState, config: &ServerConfig) -> Router {
    let body_limit = state.pipeline.limits().max_file_bytes + BODY_LIMIT_SLACK;

    Router::new()
        .merge(routes(state.clone()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
pub async fn start_server(
    config: ServerConfig,
    pipeline: Pipeline,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = AppState::new(pipeline, &config);
    let cleanup = state.limiter.spawn_cleanup();
    let app = app(state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    cleanup.abort();
    info!("HTTP API stopped");
    Ok(())
}
