//! Application configuration from YAML

use crate::agent::{CommandAgent, CommandAgentConfig, EchoAgent, InMemoryRegistry};
use crate::execution::options::{DEFAULT_PIPELINE_TIMEOUT, DEFAULT_STEP_TIMEOUT, DEFAULT_SUMMARY_MAX_CHARS};
use crate::execution::{GroupFailurePolicy, PipelineOptions};
use crate::telemetry::DEFAULT_TRACE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Name under which the built-in echo agent is registered
pub const ECHO_AGENT: &str = "echo";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Run-history settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SQLite database path; defaults to the user's data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Top-level configuration loaded from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default per-step timeout in seconds (0 disables it)
    pub step_timeout_secs: u64,

    /// Deadline for a whole run in seconds (0 disables it)
    pub pipeline_timeout_secs: u64,

    pub group_failure_policy: GroupFailurePolicy,

    /// Events kept by the trace recorder
    pub trace_capacity: usize,

    pub summary_max_chars: usize,

    /// Agents that may never be used in a pipeline
    pub disallowed_agents: Vec<String>,

    pub history: HistoryConfig,

    /// Command agents by name
    pub agents: BTreeMap<String, CommandAgentConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: DEFAULT_STEP_TIMEOUT.as_secs(),
            pipeline_timeout_secs: DEFAULT_PIPELINE_TIMEOUT.as_secs(),
            group_failure_policy: GroupFailurePolicy::default(),
            trace_capacity: DEFAULT_TRACE_CAPACITY,
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
            disallowed_agents: Vec::new(),
            history: HistoryConfig::default(),
            agents: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trace_capacity == 0 {
            return Err(ConfigError::Invalid("trace_capacity must be greater than 0".into()));
        }
        if self.summary_max_chars == 0 {
            return Err(ConfigError::Invalid("summary_max_chars must be greater than 0".into()));
        }

        for (name, agent) in &self.agents {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("Agent names must not be empty".into()));
            }
            if agent.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("Agent '{}' has no command", name)));
            }
            if agent.timeout_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "Agent '{}' must have a timeout greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Options applied to every run
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions::default()
            .with_step_timeout(secs(self.step_timeout_secs))
            .with_pipeline_timeout(secs(self.pipeline_timeout_secs))
            .with_group_policy(self.group_failure_policy)
            .with_summary_max_chars(self.summary_max_chars)
    }

    /// Registry holding the built-in echo agent and every configured command
    /// agent. A configured agent named `echo` replaces the built-in one.
    pub fn build_registry(&self) -> InMemoryRegistry {
        let mut registry = InMemoryRegistry::new().with(ECHO_AGENT, Arc::new(EchoAgent));
        for (name, agent) in &self.agents {
            registry.register(name.clone(), Arc::new(CommandAgent::new(agent.clone())));
        }
        registry
    }

    pub fn disallowed(&self) -> HashSet<String> {
        self.disallowed_agents.iter().cloned().collect()
    }

    /// Where run history is stored, or `None` when history is disabled
    pub fn history_path(&self) -> Option<PathBuf> {
        if !self.history.enabled {
            return None;
        }
        self.history.path.clone().or_else(default_history_path)
    }
}

/// `<data dir>/agent-pipelines/runs.db`
pub fn default_history_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("agent-pipelines").join("runs.db"))
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}
