//! Sequential orchestrator - runs steps one after another, halting on the
//! first failure

use crate::core::spec::{ensure_unique_names, SpecError};
use crate::core::{PipelineKind, PipelineResult, Step};
use crate::execution::run::PipelineRun;
use crate::execution::PipelineOptions;
use crate::telemetry::Telemetry;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Ordered chain of steps, each fed the previous step's output
pub struct SequentialPipeline {
    name: String,
    steps: Vec<Step>,
    telemetry: Telemetry,
    options: PipelineOptions,
}

impl SequentialPipeline {
    /// Build a pipeline. Step names must be unique.
    pub fn new(
        name: impl Into<String>,
        steps: Vec<Step>,
        telemetry: Telemetry,
        options: PipelineOptions,
    ) -> Result<Self, SpecError> {
        ensure_unique_names(steps.iter())?;
        Ok(Self {
            name: name.into(),
            steps,
            telemetry,
            options,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the pipeline. Always returns a result; step failures are data.
    pub async fn run(&self, initial: Value) -> PipelineResult {
        self.run_with_cancel(initial, CancellationToken::new()).await
    }

    /// Run the pipeline, stopping early once `cancel` fires
    pub async fn run_with_cancel(&self, initial: Value, cancel: CancellationToken) -> PipelineResult {
        let mut run = PipelineRun::start(
            &self.name,
            PipelineKind::Sequential,
            &self.telemetry,
            &self.options,
            &cancel,
        );
        let mut context = initial;

        for (index, step) in self.steps.iter().enumerate() {
            if run.should_stop() {
                break;
            }

            match run.run_step(step, context.clone()).await {
                Some(output) => context = output,
                None => {
                    let skipped = self.steps.len() - index - 1;
                    info!(run_id = %run.run_id(), step = %step.name, skipped, "Halting pipeline after failed step");
                    break;
                }
            }
        }

        run.finish(context)
    }
}
