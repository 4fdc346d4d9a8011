//! Thin HTTP adapter over the sheet capture job orchestrator.
//!
//! This crate provides:
//! - The REST surface for submitting/polling/exporting capture jobs
//! - Rate limiting and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
