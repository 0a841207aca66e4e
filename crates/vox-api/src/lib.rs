//! vox-api: HTTP API for Vox Studio
//!
//! axum routes for every generation kind, generation history, the private
//! audio proxy and usage reporting. Every `/api` route requires the caller
//! identity forwarded by the upstream proxy.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;


pub use error::{ApiError, Result};
pub use server::{app, start_server, AppState};
