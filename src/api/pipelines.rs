//! Pipeline API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::core::spec::{ParallelRequest, SequentialRequest};
use crate::core::PipelineResult;
use crate::persistence::RunRecord;
use crate::service::PipelineService;
use crate::telemetry::{MetricsSample, TraceEvent};

const DEFAULT_LIST_LIMIT: usize = 20;
const DEFAULT_TRACE_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct RunsQuery {
    pub pipeline: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TraceQuery {
    pub limit: Option<usize>,
}

/// POST /api/admin/pipelines/run
///
/// Answers 200 with the result even when a step failed.
pub async fn run_sequential(
    State(service): State<PipelineService>,
    Json(req): Json<SequentialRequest>,
) -> ApiResult<Json<PipelineResult>> {
    tracing::info!(steps = req.steps.len(), "Running sequential pipeline");
    let result = service.run_sequential(&req).await?;
    Ok(Json(result))
}

/// POST /api/admin/pipelines/parallel
pub async fn run_parallel(
    State(service): State<PipelineService>,
    Json(req): Json<ParallelRequest>,
) -> ApiResult<Json<PipelineResult>> {
    tracing::info!(elements = req.steps.len(), "Running parallel pipeline");
    let result = service.run_parallel(&req).await?;
    Ok(Json(result))
}

/// GET /api/admin/pipelines/runs
///
/// Empty when history is disabled.
pub async fn list_runs(
    State(service): State<PipelineService>,
    Query(query): Query<RunsQuery>,
) -> ApiResult<Json<Vec<RunRecord>>> {
    let Some(store) = service.history() else {
        return Ok(Json(Vec::new()));
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    let runs = match &query.pipeline {
        Some(pipeline) => store.list_runs(pipeline, limit).await,
        None => store.recent_runs(limit).await,
    }
    .map_err(ApiError::History)?;

    Ok(Json(runs))
}

/// GET /api/admin/pipelines/names
///
/// Names of pipelines with recorded runs
pub async fn list_pipelines(State(service): State<PipelineService>) -> ApiResult<Json<Vec<String>>> {
    let Some(store) = service.history() else {
        return Ok(Json(Vec::new()));
    };
    let names = store.list_pipelines().await.map_err(ApiError::History)?;
    Ok(Json(names))
}

/// GET /api/admin/pipelines/runs/{id}
pub async fn get_run(
    State(service): State<PipelineService>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RunRecord>> {
    tracing::debug!("Getting run: {}", id);

    let not_found = || ApiError::NotFound(format!("Run {} not found", id));
    let store = service.history().ok_or_else(not_found)?;
    let record = store
        .load_run(id)
        .await
        .map_err(ApiError::History)?
        .ok_or_else(not_found)?;

    Ok(Json(record))
}

/// GET /api/admin/pipelines/trace
pub async fn recent_trace(
    State(service): State<PipelineService>,
    Query(query): Query<TraceQuery>,
) -> Json<Vec<TraceEvent>> {
    let limit = query.limit.unwrap_or(DEFAULT_TRACE_LIMIT);
    Json(service.telemetry().trace.get_recent(limit))
}

/// GET /api/admin/pipelines/metrics
pub async fn metrics(State(service): State<PipelineService>) -> Json<BTreeMap<String, MetricsSample>> {
    Json(service.telemetry().metrics.get_all())
}

/// GET /api/admin/agents
pub async fn list_agents(State(service): State<PipelineService>) -> Json<Vec<String>> {
    Json(service.agents())
}
