//! Rate limiting middleware
//!
//! Fixed-window request limit per authenticated user on generation routes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::RwLock;
use tracing::warn;

use super::auth::AuthUser;
use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(30)
    }
}

#[derive(Clone)]
struct WindowState {
    request_count: u32,
    window_start: Instant,
}

/// In-memory rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    users: Arc<RwLock<HashMap<String, WindowState>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            users: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Count one request; false once the window is exhausted
    pub async fn check(&self, user_id: &str) -> bool {
        let mut users = self.users.write().await;
        let now = Instant::now();

        let state = users.entry(user_id.to_string()).or_insert(WindowState {
            request_count: 0,
            window_start: now,
        });

        if now.duration_since(state.window_start) > self.config.window {
            state.request_count = 0;
            state.window_start = now;
        }

        if state.request_count >= self.config.max_requests {
            warn!("Rate limit exceeded for user: {}", user_id);
            return false;
        }

        state.request_count += 1;
        true
    }

    /// Drop expired windows
    pub async fn cleanup(&self) {
        let mut users = self.users.write().await;
        let now = Instant::now();
        users.retain(|_, state| now.duration_since(state.window_start) <= self.config.window);
    }

    /// Periodic cleanup until the runtime shuts down
    pub fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.config.window);
            loop {
                ticker.tick().await;
                limiter.cleanup().await;
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

/// Runs after `auth_middleware`, keyed by the authenticated user
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = request
        .extensions()
        .get::<AuthUser>()
        .map(|user| user.0.clone())
        .ok_or(ApiError::Unauthorized)?;

    if !state.limiter.check(&user_id).await {
        return Err(ApiError::RateLimited);
    }

    Ok(next.run(request).await)
}
