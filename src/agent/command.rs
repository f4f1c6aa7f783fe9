//! Subprocess-backed agent - pipes JSON through an external command

use crate::agent::{AgentError, AgentOutput, Capability};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Configuration for a command agent as declared in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAgentConfig {
    /// Executable to spawn
    pub command: String,

    /// Extra arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Timeout for one invocation in seconds
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
}

fn default_agent_timeout() -> u64 {
    120
}

/// Agent that runs a command, writes the input JSON to its stdin and
/// interprets stdout as the result.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    config: CommandAgentConfig,
}

impl CommandAgent {
    pub fn new(config: CommandAgentConfig) -> Self {
        Self { config }
    }

    /// Get the configured executable
    pub fn command(&self) -> &str {
        &self.config.command
    }

    /// Interpret raw stdout.
    ///
    /// An object with a boolean `ok` field is taken as an [`AgentOutput`];
    /// any other JSON becomes `data`; non-JSON text becomes a string.
    fn parse_stdout(stdout: &str) -> AgentOutput {
        let trimmed = stdout.trim();
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                let shaped = value.get("ok").map(Value::is_boolean).unwrap_or(false);
                if shaped {
                    match serde_json::from_value::<AgentOutput>(value.clone()) {
                        Ok(output) => output,
                        Err(_) => AgentOutput::success(value),
                    }
                } else {
                    AgentOutput::success(value)
                }
            }
            Err(_) => AgentOutput::success(Value::String(trimmed.to_string())),
        }
    }

    async fn run(&self, input: &Value) -> Result<std::process::Output, AgentError> {
        let payload = serde_json::to_vec(input)
            .map_err(|e| AgentError::Internal(format!("Failed to encode input: {}", e)))?;

        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::Internal(format!(
                    "Failed to spawn {}: {}",
                    self.config.command, e
                ))
            })?;

        // Feed stdin while stdout is drained, or a chatty child fills its
        // output pipe and stops reading
        let stdin = child.stdin.take();
        let command = &self.config.command;
        let write = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&payload).await {
                Ok(()) => Ok(()),
                // The child exited without reading its input; its exit status tells the story
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("{} closed stdin early", command);
                    Ok(())
                }
                Err(e) => Err(e),
            }
            // Dropping stdin closes the pipe so the child sees EOF
        };

        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output
            .map_err(|e| AgentError::Internal(format!("Failed to wait for {}: {}", command, e)))?;
        written.map_err(|e| AgentError::Internal(format!("Failed to write stdin: {}", e)))?;

        Ok(output)
    }
}

#[async_trait]
impl Capability for CommandAgent {
    async fn process(&self, input: Value) -> Result<AgentOutput, AgentError> {
        debug!("Spawning agent command: {}", self.config.command);

        let output = timeout(Duration::from_secs(self.config.timeout_secs), self.run(&input))
            .await
            .map_err(|_| AgentError::Timeout(self.config.timeout_secs))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(
                "{} exited with code {}: {}",
                self.config.command,
                exit_code,
                stderr.trim()
            );
            return Err(AgentError::Api(format!(
                "{} exited with code {}: {}",
                self.config.command,
                exit_code,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| {
            AgentError::InvalidResponse(format!("Output is not UTF-8: {}", e))
        })?;

        debug!("{} returned {} bytes of output", self.config.command, stdout.len());

        Ok(Self::parse_stdout(&stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(command: &str, args: &[&str]) -> CommandAgentConfig {
        CommandAgentConfig {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: HashMap::new(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_parse_shaped_output() {
        let output = CommandAgent::parse_stdout(r#"{"ok": false, "error": "rate limited"}"#);
        assert_eq!(output, AgentOutput::failure("rate limited"));
    }

    #[test]
    fn test_parse_plain_json_is_data() {
        let output = CommandAgent::parse_stdout(r#"{"caption": "golden hour"}"#);
        assert_eq!(output, AgentOutput::success(json!({"caption": "golden hour"})));
    }

    #[test]
    fn test_parse_text_is_string() {
        let output = CommandAgent::parse_stdout("just words\n");
        assert_eq!(output, AgentOutput::success(json!("just words")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cat_echoes_input() {
        let agent = CommandAgent::new(config("cat", &[]));
        let output = agent.process(json!({"n": 1})).await.unwrap();
        assert_eq!(output, AgentOutput::success(json!({"n": 1})));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_input_streams_through() {
        let mut cfg = config("cat", &[]);
        cfg.timeout_secs = 10;
        let agent = CommandAgent::new(cfg);
        let input = json!({"blob": "x".repeat(1_000_000)});
        let output = agent.process(input.clone()).await.unwrap();
        assert_eq!(output, AgentOutput::success(input));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let agent = CommandAgent::new(config("sh", &["-c", "echo broken >&2; exit 3"]));
        let result = agent.process(json!(null)).await;
        match result {
            Err(AgentError::Api(msg)) => {
                assert!(msg.contains("code 3"));
                assert!(msg.contains("broken"));
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let mut cfg = config("sleep", &["5"]);
        cfg.timeout_secs = 1;
        let agent = CommandAgent::new(cfg);
        let result = agent.process(json!(null)).await;
        assert!(matches!(result, Err(AgentError::Timeout(1))));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let agent = CommandAgent::new(config("nonexistent-agent-binary", &[]));
        let result = agent.process(json!(null)).await;
        assert!(matches!(result, Err(AgentError::Internal(_))));
    }
}
