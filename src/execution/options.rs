//! Run options shared by both orchestrators

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-step timeout
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);

/// Default deadline for a whole pipeline
pub const DEFAULT_PIPELINE_TIMEOUT: Duration = Duration::from_secs(1800);

/// Default size bound for output summaries in the trace
pub const DEFAULT_SUMMARY_MAX_CHARS: usize = 200;

/// What a parallel pipeline does after a group in which some members failed.
///
/// Whatever the policy, a group whose members all failed halts the pipeline,
/// and `ok` is false as soon as any step failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupFailurePolicy {
    /// Halt after the group if any member failed
    #[default]
    FailFast,
    /// Keep going with the successful members' outputs
    ContinueOnPartialFailure,
}

/// Options applied to every run of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Timeout for steps that do not set their own
    pub step_timeout: Option<Duration>,

    /// Deadline for the whole run
    pub pipeline_timeout: Option<Duration>,

    /// Behaviour after a partially failed group
    pub group_policy: GroupFailurePolicy,

    /// Maximum characters of output kept in a trace summary
    pub summary_max_chars: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            step_timeout: Some(DEFAULT_STEP_TIMEOUT),
            pipeline_timeout: Some(DEFAULT_PIPELINE_TIMEOUT),
            group_policy: GroupFailurePolicy::FailFast,
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
        }
    }
}

impl PipelineOptions {
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_pipeline_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pipeline_timeout = timeout;
        self
    }

    pub fn with_group_policy(mut self, policy: GroupFailurePolicy) -> Self {
        self.group_policy = policy;
        self
    }

    pub fn with_summary_max_chars(mut self, max_chars: usize) -> Self {
        self.summary_max_chars = max_chars;
        self
    }
}
