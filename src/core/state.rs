//! Run outcome models

use crate::telemetry::{MetricsSample, TraceEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Final status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Every executed step succeeded
    Completed,
    /// At least one step failed
    Failed,
    /// The run was cancelled or hit its deadline
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            "cancelled" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which orchestrator produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Sequential,
    Parallel,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Sequential => "sequential",
            PipelineKind::Parallel => "parallel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sequential" => Some(PipelineKind::Sequential),
            "parallel" => Some(PipelineKind::Parallel),
            _ => None,
        }
    }
}

/// Outcome of a single step invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,
}

/// Everything that happened during one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub run_id: Uuid,

    pub pipeline: String,

    pub kind: PipelineKind,

    pub status: ExecutionStatus,

    /// True only when no step failed
    pub ok: bool,

    /// Outcomes in the order they were recorded
    pub steps: Vec<StepOutcome>,

    /// First step that failed
    pub failed_at: Option<String>,

    /// Error of `failed_at`, or an orchestrator failure
    pub error: Option<String>,

    /// Final working context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    pub trace: Vec<TraceEvent>,

    pub metrics: BTreeMap<String, MetricsSample>,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    pub duration_ms: u64,
}

impl PipelineResult {
    /// Result returned when the orchestrator itself broke down
    pub fn internal_failure(
        run_id: Uuid,
        pipeline: impl Into<String>,
        kind: PipelineKind,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now();
        Self {
            run_id,
            pipeline: pipeline.into(),
            kind,
            status: ExecutionStatus::Failed,
            ok: false,
            steps: Vec::new(),
            failed_at: None,
            error: Some(error.into()),
            output: None,
            trace: Vec::new(),
            metrics: BTreeMap::new(),
            started_at,
            completed_at,
            duration_ms: elapsed_ms(started_at, completed_at),
        }
    }

    /// Outcome of a step by name
    pub fn step(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Number of steps that succeeded
    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.ok).count()
    }
}

/// Milliseconds between two timestamps, clamped at zero
pub fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    to.signed_duration_since(from).num_milliseconds().max(0) as u64
}
