//! Step domain model

use crate::agent::Capability;
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Why a step did not produce an output
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    /// The agent returned `ok: false` or raised an error
    #[error("{0}")]
    Agent(String),

    /// The step's own logic failed
    #[error("{0}")]
    Failed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Step panicked: {0}")]
    Panicked(String),
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        StepError::Failed(message.into())
    }
}

/// Per-invocation information handed to a step
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Run the step belongs to
    pub run_id: Uuid,

    /// Name of the step being invoked
    pub step_name: String,

    /// Cancelled when the pipeline deadline passes or the caller aborts
    pub cancel: CancellationToken,
}

/// Boxed step body
pub type StepFn =
    Arc<dyn Fn(Value, StepContext) -> BoxFuture<'static, Result<Value, StepError>> + Send + Sync>;

/// A named unit of work in a pipeline
#[derive(Clone)]
pub struct Step {
    /// Unique step name within one pipeline
    pub name: String,

    /// Registry name of the wrapped agent, if any
    pub agent: Option<String>,

    /// The wrapped capability, if any. Never invoked directly by the orchestrator.
    pub capability: Option<Arc<dyn Capability>>,

    /// Maps the working context to the next one
    pub run: StepFn,

    /// Overrides the pipeline's default step timeout
    pub timeout: Option<Duration>,
}

impl Step {
    /// Create a step from an async closure
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            agent: None,
            capability: None,
            run: Arc::new(move |input: Value, ctx: StepContext| f(input, ctx).boxed()),
            timeout: None,
        }
    }

    /// Create a step that invokes a registered agent.
    ///
    /// With an `input_override` the agent receives that value instead of
    /// the threaded context.
    pub fn from_agent(
        name: impl Into<String>,
        agent_name: impl Into<String>,
        capability: Arc<dyn Capability>,
        input_override: Option<Value>,
    ) -> Self {
        let agent_name = agent_name.into();
        let invoked = capability.clone();
        let run: StepFn = Arc::new(move |context: Value, _ctx: StepContext| {
            let capability = invoked.clone();
            let input = input_override.clone().unwrap_or(context);
            async move {
                let output = capability
                    .process(input)
                    .await
                    .map_err(|e| StepError::Agent(e.to_string()))?;
                output.into_result().map_err(StepError::Agent)
            }
            .boxed()
        });

        Self {
            name: name.into(),
            agent: Some(agent_name),
            capability: Some(capability),
            run,
            timeout: None,
        }
    }

    /// Set a step-specific timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("agent", &self.agent)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
