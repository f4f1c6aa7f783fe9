//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{AgentsCommand, HistoryCommand, RunCommand, ServeCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Exit status of a pipeline that ran and failed
pub const EXIT_RUN_FAILED: i32 = 1;

/// Exit status of a pipeline file that does not plan, from `run` or `validate`
pub const EXIT_INVALID_PIPELINE: i32 = 2;

/// Run agent pipelines from the command line or serve them over HTTP
#[derive(Debug, Parser, Clone)]
#[command(name = "agent-pipelines")]
#[command(version)]
#[command(about = "Sequential and parallel agent pipelines with trace, metrics and history", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the agents configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline file
    Run(RunCommand),

    /// Validate a pipeline file without running it
    Validate(ValidateCommand),

    /// Serve the admin HTTP API
    Serve(ServeCommand),

    /// Show run history
    History(HistoryCommand),

    /// List registered agents
    Agents(AgentsCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::GroupFailurePolicy;
    use serde_json::json;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "agent-pipelines",
            "-v",
            "--config",
            "agents.yaml",
            "run",
            "--file",
            "social.yaml",
            "--input",
            r#"{"topic":"sunsets"}"#,
            "--policy",
            "continue",
            "--no-history",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("agents.yaml")));
        match cli.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.file, PathBuf::from("social.yaml"));
                assert_eq!(cmd.input, Some(json!({"topic": "sunsets"})));
                assert_eq!(
                    cmd.policy.map(GroupFailurePolicy::from),
                    Some(GroupFailurePolicy::ContinueOnPartialFailure)
                );
                assert!(cmd.no_history);
                assert!(!cmd.json);
            }
            other => panic!("Expected run command, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_input_json_rejected() {
        let result = Cli::try_parse_from(["agent-pipelines", "run", "--file", "p.yaml", "--input", "{oops"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_history_defaults() {
        let cli = Cli::try_parse_from(["agent-pipelines", "history"]).unwrap();
        match cli.command {
            Command::History(cmd) => {
                assert_eq!(cmd.limit, 10);
                assert!(cmd.pipeline.is_none());
                assert!(cmd.run_id.is_none());
                assert!(!cmd.pipelines);
            }
            other => panic!("Expected history command, got {:?}", other),
        }
    }

    #[test]
    fn test_exit_codes_tell_invalid_from_failed() {
        assert_ne!(EXIT_INVALID_PIPELINE, EXIT_RUN_FAILED);
        assert_ne!(EXIT_INVALID_PIPELINE, 0);
        assert_ne!(EXIT_RUN_FAILED, 0);
    }

    #[test]
    fn test_history_pipelines_flag() {
        let cli = Cli::try_parse_from(["agent-pipelines", "history", "--pipelines", "--json"]).unwrap();
        match cli.command {
            Command::History(cmd) => {
                assert!(cmd.pipelines);
                assert!(cmd.json);
            }
            other => panic!("Expected history command, got {:?}", other),
        }

        let conflicting = Cli::try_parse_from(["agent-pipelines", "history", "--pipelines", "--pipeline", "x"]);
        assert!(conflicting.is_err());
    }
}
