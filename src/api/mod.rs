//! HTTP boundary
//!
//! Admin endpoints for running pipelines and reading back their trace,
//! metrics and history. Authentication belongs in a layer added by the
//! embedding server; none is applied here.

pub mod error;
pub mod health;
pub mod pipelines;

use crate::service::PipelineService;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the API router with all endpoints
pub fn create_router(service: PipelineService) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/api/admin/pipelines/run", post(pipelines::run_sequential))
        .route("/api/admin/pipelines/parallel", post(pipelines::run_parallel))
        .route("/api/admin/pipelines/runs", get(pipelines::list_runs))
        .route("/api/admin/pipelines/runs/{id}", get(pipelines::get_run))
        .route("/api/admin/pipelines/names", get(pipelines::list_pipelines))
        .route("/api/admin/pipelines/trace", get(pipelines::recent_trace))
        .route("/api/admin/pipelines/metrics", get(pipelines::metrics))
        .route("/api/admin/agents", get(pipelines::list_agents))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}
