//! Agent capabilities and the registry that resolves them by name

pub mod command;
pub mod response;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub use command::{CommandAgent, CommandAgentConfig};
pub use response::{AgentError, AgentOutput};

/// A unit of work that turns an input into an [`AgentOutput`].
///
/// The orchestrator never looks inside a capability; steps wrap the call.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Process an input value
    async fn process(&self, input: Value) -> Result<AgentOutput, AgentError>;
}

/// Lookup of capabilities by name
pub trait AgentRegistry: Send + Sync {
    /// Whether an agent is registered under `name`
    fn has(&self, name: &str) -> bool;

    /// Get the capability registered under `name`
    fn get(&self, name: &str) -> Option<Arc<dyn Capability>>;

    /// All registered names, sorted
    fn list(&self) -> Vec<String>;
}

/// Registry backed by a map, filled once at startup
#[derive(Default, Clone)]
pub struct InMemoryRegistry {
    agents: HashMap<String, Arc<dyn Capability>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any previous one with the same name
    pub fn register(&mut self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        self.agents.insert(name.into(), capability);
    }

    /// Builder-style registration
    pub fn with(mut self, name: impl Into<String>, capability: Arc<dyn Capability>) -> Self {
        self.register(name, capability);
        self
    }
}

impl AgentRegistry for InMemoryRegistry {
    fn has(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.agents.get(name).cloned()
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Agent that hands its input straight back
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoAgent;

#[async_trait]
impl Capability for EchoAgent {
    async fn process(&self, input: Value) -> Result<AgentOutput, AgentError> {
        Ok(AgentOutput::success(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_lookup() {
        let registry = InMemoryRegistry::new()
            .with("echo", Arc::new(EchoAgent))
            .with("caption", Arc::new(EchoAgent));

        assert!(registry.has("echo"));
        assert!(!registry.has("missing"));
        assert!(registry.get("caption").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.list(), vec!["caption", "echo"]);
    }

    #[tokio::test]
    async fn test_echo_agent() {
        let output = EchoAgent.process(json!({"topic": "sunsets"})).await.unwrap();
        assert!(output.ok);
        assert_eq!(output.data, Some(json!({"topic": "sunsets"})));
    }
}
