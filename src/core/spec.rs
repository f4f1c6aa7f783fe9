//! Pipeline request schema and planning
//!
//! Request bodies name agents; the [`Planner`] resolves them through the
//! registry and turns them into runnable steps. Everything that can be
//! rejected is rejected here, before a single step runs.

use crate::agent::AgentRegistry;
use crate::core::Step;
use crate::execution::PipelineElement;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Name given to pipelines whose request did not name them
pub const DEFAULT_PIPELINE_NAME: &str = "adhoc";

/// Structural problems found when building a pipeline from steps
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("Duplicate step name: {0}")]
    DuplicateStepName(String),

    #[error("Group at position {0} has no steps")]
    EmptyGroup(usize),
}

/// Check that no two steps share a name
pub fn ensure_unique_names<'a, I>(steps: I) -> Result<(), SpecError>
where
    I: IntoIterator<Item = &'a Step>,
{
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.name.as_str()) {
            return Err(SpecError::DuplicateStepName(step.name.clone()));
        }
    }
    Ok(())
}

/// Why a pipeline request was rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Pipeline has no steps")]
    EmptyPipeline,

    #[error("Group at position {0} has no steps")]
    EmptyGroup(usize),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent '{0}' is not allowed in pipelines")]
    DisallowedAgent(String),

    #[error("Duplicate step name: {0}. Give repeated agents an explicit name")]
    DuplicateStepName(String),

    #[error("Step '{0}' has a zero timeout")]
    ZeroTimeout(String),
}

impl From<SpecError> for ValidationError {
    fn from(err: SpecError) -> Self {
        match err {
            SpecError::DuplicateStepName(name) => ValidationError::DuplicateStepName(name),
            SpecError::EmptyGroup(index) => ValidationError::EmptyGroup(index),
        }
    }
}

/// One step of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    /// Registered agent to invoke
    pub agent: String,

    /// Step name; defaults to the agent name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Fixed input for the agent instead of the threaded context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "timeout_ms")]
    pub timeout_ms: Option<u64>,
}

impl StepRequest {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            name: None,
            input: None,
            timeout_ms: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Effective step name
    pub fn step_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.agent)
    }
}

/// A single step or a concurrent group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementRequest {
    Group(Vec<StepRequest>),
    Step(StepRequest),
}

impl ElementRequest {
    pub fn is_group(&self) -> bool {
        matches!(self, ElementRequest::Group(_))
    }
}

/// Body of a sequential run request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialRequest {
    #[serde(default)]
    pub name: Option<String>,

    /// Initial context
    #[serde(default)]
    pub input: Value,

    pub steps: Vec<StepRequest>,
}

/// Body of a parallel run request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelRequest {
    #[serde(default)]
    pub name: Option<String>,

    /// Initial context
    #[serde(default)]
    pub input: Value,

    pub steps: Vec<ElementRequest>,
}

impl ParallelRequest {
    /// Number of steps across all elements
    pub fn step_count(&self) -> usize {
        self.steps
            .iter()
            .map(|element| match element {
                ElementRequest::Step(_) => 1,
                ElementRequest::Group(members) => members.len(),
            })
            .sum()
    }

    /// Sequential form of this request, if it contains no groups
    pub fn as_sequential(&self) -> Option<SequentialRequest> {
        let steps = self
            .steps
            .iter()
            .map(|element| match element {
                ElementRequest::Step(step) => Some(step.clone()),
                ElementRequest::Group(_) => None,
            })
            .collect::<Option<Vec<_>>>()?;

        Some(SequentialRequest {
            name: self.name.clone(),
            input: self.input.clone(),
            steps,
        })
    }
}

/// A validated sequential pipeline, ready to run
#[derive(Debug)]
pub struct SequentialPlan {
    pub name: String,
    pub input: Value,
    pub steps: Vec<Step>,
}

/// A validated parallel pipeline, ready to run
#[derive(Debug)]
pub struct ParallelPlan {
    pub name: String,
    pub input: Value,
    pub elements: Vec<PipelineElement>,
}

impl ParallelPlan {
    /// Total number of steps across all elements
    pub fn step_count(&self) -> usize {
        self.elements.iter().map(|e| e.steps().len()).sum()
    }
}

/// Resolves request bodies into steps
#[derive(Clone)]
pub struct Planner {
    registry: Arc<dyn AgentRegistry>,
    disallowed: Arc<HashSet<String>>,
}

impl Planner {
    pub fn new(registry: Arc<dyn AgentRegistry>, disallowed: HashSet<String>) -> Self {
        Self {
            registry,
            disallowed: Arc::new(disallowed),
        }
    }

    pub fn registry(&self) -> &Arc<dyn AgentRegistry> {
        &self.registry
    }

    /// Validate and build a sequential pipeline
    pub fn plan_sequential(&self, req: &SequentialRequest) -> Result<SequentialPlan, ValidationError> {
        if req.steps.is_empty() {
            return Err(ValidationError::EmptyPipeline);
        }

        let steps = req
            .steps
            .iter()
            .map(|step| self.build_step(step))
            .collect::<Result<Vec<_>, _>>()?;
        ensure_unique_names(steps.iter())?;

        Ok(SequentialPlan {
            name: pipeline_name(&req.name),
            input: req.input.clone(),
            steps,
        })
    }

    /// Validate and build a parallel pipeline
    pub fn plan_parallel(&self, req: &ParallelRequest) -> Result<ParallelPlan, ValidationError> {
        if req.steps.is_empty() {
            return Err(ValidationError::EmptyPipeline);
        }

        let mut elements = Vec::with_capacity(req.steps.len());
        for (index, element) in req.steps.iter().enumerate() {
            let planned = match element {
                ElementRequest::Step(step) => PipelineElement::Step(self.build_step(step)?),
                ElementRequest::Group(members) => {
                    if members.is_empty() {
                        return Err(ValidationError::EmptyGroup(index));
                    }
                    let steps = members
                        .iter()
                        .map(|step| self.build_step(step))
                        .collect::<Result<Vec<_>, _>>()?;
                    PipelineElement::Group(steps)
                }
            };
            elements.push(planned);
        }
        ensure_unique_names(elements.iter().flat_map(|e| e.steps().iter()))?;

        Ok(ParallelPlan {
            name: pipeline_name(&req.name),
            input: req.input.clone(),
            elements,
        })
    }

    fn build_step(&self, req: &StepRequest) -> Result<Step, ValidationError> {
        if self.disallowed.contains(&req.agent) {
            return Err(ValidationError::DisallowedAgent(req.agent.clone()));
        }
        let capability = self
            .registry
            .get(&req.agent)
            .ok_or_else(|| ValidationError::UnknownAgent(req.agent.clone()))?;

        let step = Step::from_agent(req.step_name(), &req.agent, capability, req.input.clone());
        Ok(match req.timeout_ms {
            Some(0) => return Err(ValidationError::ZeroTimeout(req.step_name().to_string())),
            Some(ms) => step.with_timeout(Duration::from_millis(ms)),
            None => step,
        })
    }
}

fn pipeline_name(name: &Option<String>) -> String {
    name.clone().unwrap_or_else(|| DEFAULT_PIPELINE_NAME.to_string())
}
