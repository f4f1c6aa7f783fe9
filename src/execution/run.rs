//! Bookkeeping for a single pipeline invocation

use crate::core::{ExecutionStatus, PipelineKind, PipelineResult, Step, StepError, StepOutcome};
use crate::execution::executor::{RunControl, StepExecutor};
use crate::execution::PipelineOptions;
use crate::telemetry::{summarize, Telemetry, TraceEvent};
use chrono::{DateTime, Utc};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// What a parallel group produced once every member settled
#[derive(Debug, Default)]
pub struct GroupOutcome {
    /// Outputs of successful members keyed by step name
    pub succeeded: Map<String, Value>,

    /// Number of members that failed
    pub failed: usize,
}

/// Accumulates outcomes, trace and metrics while a pipeline runs
pub struct PipelineRun {
    run_id: Uuid,
    pipeline: String,
    kind: PipelineKind,
    started_at: DateTime<Utc>,
    clock: Instant,
    telemetry: Telemetry,
    summary_max_chars: usize,
    executor: StepExecutor,
    outcomes: Vec<StepOutcome>,
    trace: Vec<TraceEvent>,
    first_failure: Option<(String, String)>,
    cancelled: bool,
}

impl PipelineRun {
    pub fn start(
        pipeline: &str,
        kind: PipelineKind,
        telemetry: &Telemetry,
        options: &PipelineOptions,
        cancel: &CancellationToken,
    ) -> Self {
        let run_id = Uuid::new_v4();
        let control = RunControl::new(cancel, options.pipeline_timeout);

        info!(run_id = %run_id, pipeline, kind = kind.as_str(), "Starting pipeline run");

        Self {
            run_id,
            pipeline: pipeline.to_string(),
            kind,
            started_at: Utc::now(),
            clock: Instant::now(),
            telemetry: telemetry.clone(),
            summary_max_chars: options.summary_max_chars,
            executor: StepExecutor::new(run_id, control, options.step_timeout),
            outcomes: Vec::new(),
            trace: Vec::new(),
            first_failure: None,
            cancelled: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Whether no further work may be scheduled because the caller
    /// cancelled the run or its deadline passed
    pub fn should_stop(&mut self) -> bool {
        if self.executor.control().is_interrupted() {
            self.cancelled = true;
        }
        self.cancelled
    }

    /// Run one step to completion. Returns its output, or `None` if it failed.
    pub async fn run_step(&mut self, step: &Step, input: Value) -> Option<Value> {
        let started_at = self.step_started(step);
        let clock = Instant::now();
        let result = self.executor.invoke(step, input).await;
        self.step_finished(step, result, started_at, clock.elapsed().as_millis() as u64)
    }

    /// Run a group of steps concurrently on the same input.
    ///
    /// Returns only once every member has settled. Outcomes are recorded in
    /// completion order.
    pub async fn run_group(&mut self, steps: &[Step], input: &Value) -> GroupOutcome {
        let started: Vec<DateTime<Utc>> = steps.iter().map(|step| self.step_started(step)).collect();

        let executor = self.executor.clone();
        let executor = &executor;
        let mut pending: FuturesUnordered<_> = steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let input = input.clone();
                async move {
                    let clock = Instant::now();
                    let result = executor.invoke(step, input).await;
                    (index, result, clock.elapsed().as_millis() as u64)
                }
            })
            .collect();

        let mut outcome = GroupOutcome::default();
        while let Some((index, result, duration_ms)) = pending.next().await {
            let step = &steps[index];
            match self.step_finished(step, result, started[index], duration_ms) {
                Some(output) => {
                    outcome.succeeded.insert(step.name.clone(), output);
                }
                None => outcome.failed += 1,
            }
        }

        outcome
    }

    fn emit(&mut self, event: TraceEvent) {
        self.telemetry.trace.record(event.clone());
        self.trace.push(event);
    }

    fn step_started(&mut self, step: &Step) -> DateTime<Utc> {
        info!(run_id = %self.run_id, step = %step.name, "Step started");
        self.emit(TraceEvent::started(self.run_id, &step.name));
        Utc::now()
    }

    fn step_finished(
        &mut self,
        step: &Step,
        result: Result<Value, StepError>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Option<Value> {
        self.telemetry
            .metrics
            .record(&step.name, duration_ms, result.is_ok());

        let (output, error) = match result {
            Ok(output) => {
                info!(run_id = %self.run_id, step = %step.name, duration_ms, "Step succeeded");
                let summary = summarize(&output, self.summary_max_chars);
                self.emit(TraceEvent::succeeded(self.run_id, &step.name, summary));
                (Some(output), None)
            }
            Err(error) => {
                if self.executor.control().token.is_cancelled() {
                    self.cancelled = true;
                }
                let message = error.to_string();
                warn!(run_id = %self.run_id, step = %step.name, duration_ms, "Step failed: {}", message);
                self.emit(TraceEvent::failed(self.run_id, &step.name, message.clone()));
                if self.first_failure.is_none() {
                    self.first_failure = Some((step.name.clone(), message.clone()));
                }
                (None, Some(message))
            }
        };

        self.outcomes.push(StepOutcome {
            name: step.name.clone(),
            agent: step.agent.clone(),
            ok: error.is_none(),
            output: output.clone(),
            error,
            duration_ms,
            started_at,
            completed_at: Utc::now(),
        });

        output
    }

    /// Close the run and build its result
    pub fn finish(self, output: Value) -> PipelineResult {
        let interrupted = self.cancelled;
        let (failed_at, error) = match self.first_failure {
            Some((name, message)) => (Some(name), Some(message)),
            None if interrupted => (None, Some("Pipeline cancelled before completion".to_string())),
            None => (None, None),
        };

        let status = if interrupted {
            ExecutionStatus::Cancelled
        } else if failed_at.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };

        let metrics = self
            .telemetry
            .metrics
            .snapshot_for(self.outcomes.iter().map(|o| o.name.as_str()));

        let completed_at = Utc::now();
        let duration_ms = self.clock.elapsed().as_millis() as u64;

        info!(
            run_id = %self.run_id,
            pipeline = %self.pipeline,
            status = status.as_str(),
            steps = self.outcomes.len(),
            duration_ms,
            "Pipeline run finished"
        );

        PipelineResult {
            run_id: self.run_id,
            pipeline: self.pipeline,
            kind: self.kind,
            status,
            ok: error.is_none(),
            steps: self.outcomes,
            failed_at,
            error,
            output: Some(output),
            trace: self.trace,
            metrics,
            started_at: self.started_at,
            completed_at,
            duration_ms,
        }
    }
}
