//! Pipeline service - validates requests, runs pipelines and records history
//!
//! Two error channels: a request that cannot be planned is an `Err`, while
//! anything that goes wrong during the run (including the orchestrator
//! itself breaking down) comes back as a result with `ok: false`.

use crate::agent::AgentRegistry;
use crate::core::spec::{ParallelRequest, SequentialRequest};
use crate::core::{AppConfig, PipelineKind, PipelineResult, Planner, ValidationError};
use crate::execution::executor::panic_message;
use crate::execution::{ParallelPipeline, PipelineOptions, SequentialPipeline};
use crate::persistence::{save_in_background, PersistenceBackend, RunRecord};
use crate::telemetry::Telemetry;
use chrono::Utc;
use futures_util::FutureExt;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::error;
use uuid::Uuid;

/// Entry point used by the HTTP boundary and the CLI
#[derive(Clone)]
pub struct PipelineService {
    planner: Planner,
    telemetry: Telemetry,
    options: PipelineOptions,
    history: Option<Arc<dyn PersistenceBackend>>,
}

impl PipelineService {
    pub fn new(registry: Arc<dyn AgentRegistry>, telemetry: Telemetry, options: PipelineOptions) -> Self {
        Self {
            planner: Planner::new(registry, HashSet::new()),
            telemetry,
            options,
            history: None,
        }
    }

    /// Build a service from the application config
    pub fn from_config(config: &AppConfig, history: Option<Arc<dyn PersistenceBackend>>) -> Self {
        let registry: Arc<dyn AgentRegistry> = Arc::new(config.build_registry());
        Self {
            planner: Planner::new(registry, config.disallowed()),
            telemetry: Telemetry::new(config.trace_capacity),
            options: config.pipeline_options(),
            history,
        }
    }

    /// Agents that may never be used in a pipeline
    pub fn with_disallowed(mut self, disallowed: HashSet<String>) -> Self {
        self.planner = Planner::new(self.planner.registry().clone(), disallowed);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn PersistenceBackend>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn history(&self) -> Option<&Arc<dyn PersistenceBackend>> {
        self.history.as_ref()
    }

    /// Registered agent names
    pub fn agents(&self) -> Vec<String> {
        self.planner.registry().list()
    }

    pub async fn run_sequential(&self, req: &SequentialRequest) -> Result<PipelineResult, ValidationError> {
        self.run_sequential_with_cancel(req, CancellationToken::new()).await
    }

    pub async fn run_sequential_with_cancel(
        &self,
        req: &SequentialRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineResult, ValidationError> {
        let plan = self.planner.plan_sequential(req)?;
        let total = plan.steps.len();
        let name = plan.name.clone();
        let pipeline = SequentialPipeline::new(plan.name, plan.steps, self.telemetry.clone(), self.options.clone())?;

        let result = guarded(&name, PipelineKind::Sequential, pipeline.run_with_cancel(plan.input, cancel)).await;
        self.record(&result, total);
        Ok(result)
    }

    pub async fn run_parallel(&self, req: &ParallelRequest) -> Result<PipelineResult, ValidationError> {
        self.run_parallel_with_cancel(req, CancellationToken::new()).await
    }

    pub async fn run_parallel_with_cancel(
        &self,
        req: &ParallelRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineResult, ValidationError> {
        let plan = self.planner.plan_parallel(req)?;
        let total = plan.step_count();
        let name = plan.name.clone();
        let pipeline = ParallelPipeline::new(plan.name, plan.elements, self.telemetry.clone(), self.options.clone())?;

        let result = guarded(&name, PipelineKind::Parallel, pipeline.run_with_cancel(plan.input, cancel)).await;
        self.record(&result, total);
        Ok(result)
    }

    fn record(&self, result: &PipelineResult, total_steps: usize) {
        if let Some(store) = &self.history {
            save_in_background(store.clone(), RunRecord::new(result.clone(), total_steps));
        }
    }
}

/// Run an orchestrator, turning a panic that escapes it into a failed result
async fn guarded<F>(pipeline: &str, kind: PipelineKind, run: F) -> PipelineResult
where
    F: Future<Output = PipelineResult>,
{
    let started_at = Utc::now();
    match AssertUnwindSafe(run).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(pipeline, kind = kind.as_str(), "Pipeline orchestrator failed: {}", message);
            PipelineResult::internal_failure(
                Uuid::new_v4(),
                pipeline,
                kind,
                format!("Internal error: {}", message),
                started_at,
            )
        }
    }
}
