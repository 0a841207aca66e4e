//! Middleware modules
//!
//! Caller identity and per-user rate limiting.

pub mod auth;
pub mod rate_limit;
