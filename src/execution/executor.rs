//! Step executor - invokes a single step under timeouts and cancellation

use crate::core::{Step, StepContext, StepError};
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cancellation state of one run
#[derive(Debug, Clone)]
pub struct RunControl {
    /// Cancelled by the caller or when the deadline passes
    pub token: CancellationToken,

    /// Absolute deadline of the run
    pub deadline: Option<Instant>,

    /// Length of the run's time budget, for error messages
    pub budget: Option<Duration>,
}

impl RunControl {
    /// Derive the run's control from a caller token and an optional budget
    pub fn new(parent: &CancellationToken, budget: Option<Duration>) -> Self {
        Self {
            token: parent.child_token(),
            deadline: budget.map(|b| Instant::now() + b),
            budget,
        }
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Whether the run must stop scheduling work
    pub fn is_interrupted(&self) -> bool {
        if self.deadline_passed() {
            self.token.cancel();
        }
        self.token.is_cancelled()
    }

    /// Error for a step cut short by the run being interrupted
    fn interruption_error(&self) -> StepError {
        if self.deadline_passed() {
            StepError::Timeout {
                millis: self.budget.map(|b| b.as_millis() as u64).unwrap_or(0),
            }
        } else {
            StepError::Cancelled
        }
    }
}

/// Invokes steps on behalf of one run
#[derive(Debug, Clone)]
pub struct StepExecutor {
    run_id: Uuid,
    control: RunControl,
    default_timeout: Option<Duration>,
}

impl StepExecutor {
    pub fn new(run_id: Uuid, control: RunControl, default_timeout: Option<Duration>) -> Self {
        Self {
            run_id,
            control,
            default_timeout,
        }
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    /// Run a step's body and return its output.
    ///
    /// Never panics: a panic inside the body, raised while building the
    /// future or while polling it, is turned into `StepError::Panicked`.
    /// The body is dropped when the step timeout, the run deadline or the
    /// cancellation token fires first.
    pub async fn invoke(&self, step: &Step, input: Value) -> Result<Value, StepError> {
        let ctx = StepContext {
            run_id: self.run_id,
            step_name: step.name.clone(),
            cancel: self.control.token.clone(),
        };
        let run = step.run.clone();
        let body = AssertUnwindSafe(async move { run(input, ctx).await }).catch_unwind();
        let timeout = step.timeout.or(self.default_timeout);

        debug!(run_id = %self.run_id, step = %step.name, ?timeout, "Invoking step");

        tokio::select! {
            biased;
            _ = self.control.token.cancelled() => Err(self.control.interruption_error()),
            _ = sleep_until_or_forever(self.control.deadline) => {
                warn!(run_id = %self.run_id, step = %step.name, "Pipeline deadline reached");
                self.control.token.cancel();
                Err(self.control.interruption_error())
            }
            _ = sleep_or_forever(timeout) => {
                let millis = timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
                warn!(run_id = %self.run_id, step = %step.name, millis, "Step timed out");
                Err(StepError::Timeout { millis })
            }
            result = body => match result {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(run_id = %self.run_id, step = %step.name, "Step panicked: {}", message);
                    Err(StepError::Panicked(message))
                }
            },
        }
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn sleep_or_forever(duration: Option<Duration>) {
    match duration {
        Some(duration) => sleep(duration).await,
        None => std::future::pending().await,
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
