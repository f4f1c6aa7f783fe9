//! Parallel orchestrator - runs an ordered list of single steps and
//! concurrent groups

use crate::core::spec::{ensure_unique_names, SpecError};
use crate::core::{PipelineKind, PipelineResult, Step};
use crate::execution::run::{GroupOutcome, PipelineRun};
use crate::execution::{GroupFailurePolicy, PipelineOptions};
use crate::telemetry::Telemetry;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One element of a parallel pipeline
#[derive(Debug, Clone)]
pub enum PipelineElement {
    /// Runs alone, in order
    Step(Step),
    /// Runs all members concurrently; acts as a barrier
    Group(Vec<Step>),
}

impl PipelineElement {
    /// Steps contained in this element
    pub fn steps(&self) -> &[Step] {
        match self {
            PipelineElement::Step(step) => std::slice::from_ref(step),
            PipelineElement::Group(steps) => steps,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, PipelineElement::Group(_))
    }
}

impl From<Step> for PipelineElement {
    fn from(step: Step) -> Self {
        PipelineElement::Step(step)
    }
}

impl From<Vec<Step>> for PipelineElement {
    fn from(steps: Vec<Step>) -> Self {
        PipelineElement::Group(steps)
    }
}

/// Ordered list of single steps and concurrent groups
pub struct ParallelPipeline {
    name: String,
    elements: Vec<PipelineElement>,
    telemetry: Telemetry,
    options: PipelineOptions,
}

impl ParallelPipeline {
    /// Build a pipeline. Step names must be unique across all elements and
    /// groups must not be empty.
    pub fn new(
        name: impl Into<String>,
        elements: Vec<PipelineElement>,
        telemetry: Telemetry,
        options: PipelineOptions,
    ) -> Result<Self, SpecError> {
        for (index, element) in elements.iter().enumerate() {
            if element.is_group() && element.steps().is_empty() {
                return Err(SpecError::EmptyGroup(index));
            }
        }
        ensure_unique_names(elements.iter().flat_map(|e| e.steps().iter()))?;

        Ok(Self {
            name: name.into(),
            elements,
            telemetry,
            options,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elements(&self) -> &[PipelineElement] {
        &self.elements
    }

    /// Run the pipeline. Always returns a result; step failures are data.
    pub async fn run(&self, initial: Value) -> PipelineResult {
        self.run_with_cancel(initial, CancellationToken::new()).await
    }

    /// Run the pipeline, stopping early once `cancel` fires
    pub async fn run_with_cancel(&self, initial: Value, cancel: CancellationToken) -> PipelineResult {
        let mut run = PipelineRun::start(
            &self.name,
            PipelineKind::Parallel,
            &self.telemetry,
            &self.options,
            &cancel,
        );
        let mut context = initial;

        for (index, element) in self.elements.iter().enumerate() {
            if run.should_stop() {
                break;
            }

            match element {
                PipelineElement::Step(step) => match run.run_step(step, context.clone()).await {
                    Some(output) => context = output,
                    None => {
                        info!(run_id = %run.run_id(), step = %step.name, "Halting pipeline after failed step");
                        break;
                    }
                },
                PipelineElement::Group(steps) => {
                    let group = run.run_group(steps, &context).await;
                    if !self.proceed_after(&group) {
                        info!(
                            run_id = %run.run_id(),
                            group = index,
                            failed = group.failed,
                            policy = ?self.options.group_policy,
                            "Halting pipeline after failed group"
                        );
                        break;
                    }
                    context = Value::Object(group.succeeded);
                }
            }
        }

        run.finish(context)
    }

    fn proceed_after(&self, group: &GroupOutcome) -> bool {
        if group.failed == 0 {
            return true;
        }
        if group.succeeded.is_empty() {
            return false;
        }
        self.options.group_policy == GroupFailurePolicy::ContinueOnPartialFailure
    }
}
