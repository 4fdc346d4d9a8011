//! API routes.

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::handlers::health::{health, ready};
use crate::handlers::jobs::{cancel_job, capture_crop, create_job, get_job_files, get_job_status, purge_job, review_export};
use crate::handlers::maintenance::{cache_usage, clear_cache};
use crate::handlers::preview::{preview_frame, preview_source};
use crate::handlers::runtime::runtime;
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, security_headers, RateLimiterCache};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:id", get(get_job_status))
        .route("/jobs/:id", delete(purge_job))
        .route("/jobs/:id/files", get(get_job_files))
        .route("/jobs/:id/review-export", post(review_export))
        .route("/jobs/:id/capture-crop", post(capture_crop))
        .route("/jobs/:id/cancel", post(cancel_job));

    let preview_routes = Router::new()
        .route("/preview/frame", post(preview_frame))
        .route("/preview/source", post(preview_source));

    let maintenance_routes = Router::new()
        .route("/maintenance/cache-usage", get(cache_usage))
        .route("/maintenance/clear-cache", post(clear_cache));

    let runtime_routes = Router::new().route("/runtime", get(runtime));

    let rate_limiter = std::sync::Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    let api_routes = Router::new()
        .merge(job_routes)
        .merge(preview_routes)
        .merge(maintenance_routes)
        .merge(runtime_routes)
        .layer(middleware::from_fn_with_state(rate_limiter.clone(), rate_limit_middleware));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
