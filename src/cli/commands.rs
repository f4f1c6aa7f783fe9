//! CLI command definitions

use crate::execution::GroupFailurePolicy;
use clap::Args;
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Initial context as JSON, replacing the file's `input`
    #[arg(long, value_parser = parse_json)]
    pub input: Option<Value>,

    /// What to do after a group in which some steps failed
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Serve the HTTP API
#[derive(Debug, Args, Clone)]
pub struct ServeCommand {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub bind: String,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show a single run
    #[arg(long)]
    pub run_id: Option<Uuid>,

    /// List pipeline names with recorded runs
    #[arg(long, conflicts_with_all = ["pipeline", "run_id"])]
    pub pipelines: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List registered agents
#[derive(Debug, Args, Clone)]
pub struct AgentsCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Group failure policy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PolicyArg {
    FailFast,
    Continue,
}

impl From<PolicyArg> for GroupFailurePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::FailFast => GroupFailurePolicy::FailFast,
            PolicyArg::Continue => GroupFailurePolicy::ContinueOnPartialFailure,
        }
    }
}

/// Parse a JSON argument
pub fn parse_json(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("Invalid JSON: {}", e))
}
