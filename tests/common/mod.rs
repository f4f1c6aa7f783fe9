//! Shared helpers for integration tests: spy steps and fake agents

#![allow(dead_code)]

use agent_pipelines::agent::{AgentError, AgentOutput, Capability, InMemoryRegistry};
use agent_pipelines::{PipelineOptions, PipelineService, Step, StepError, Telemetry};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Records step start and end events in the order they happen
#[derive(Clone, Default)]
pub struct Timeline {
    events: Arc<Mutex<Vec<String>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: String) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Position of an event, panicking if it never happened
    pub fn index_of(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {} not recorded in {:?}", event, self.events()))
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }
}

/// Step that logs to the timeline, sleeps, then returns `value`
pub fn spy(name: &str, timeline: &Timeline, delay: Duration, value: Value) -> Step {
    let step_name = name.to_string();
    let timeline = timeline.clone();
    Step::new(name, move |_input: Value, _ctx| {
        let step_name = step_name.clone();
        let timeline = timeline.clone();
        let value = value.clone();
        async move {
            timeline.push(format!("start:{}", step_name));
            tokio::time::sleep(delay).await;
            timeline.push(format!("end:{}", step_name));
            Ok::<_, StepError>(value)
        }
    })
}

/// Step that logs to the timeline, sleeps, then fails
pub fn failing_spy(name: &str, timeline: &Timeline, delay: Duration) -> Step {
    let step_name = name.to_string();
    let timeline = timeline.clone();
    Step::new(name, move |_input: Value, _ctx| {
        let step_name = step_name.clone();
        let timeline = timeline.clone();
        async move {
            timeline.push(format!("start:{}", step_name));
            tokio::time::sleep(delay).await;
            timeline.push(format!("end:{}", step_name));
            Err::<Value, _>(StepError::failed(format!("{} failed", step_name)))
        }
    })
}

/// Step that records the input it was given
pub fn capture_input(name: &str, seen: Arc<Mutex<Option<Value>>>) -> Step {
    Step::new(name, move |input: Value, _ctx| {
        let seen = seen.clone();
        async move {
            *seen.lock() = Some(input.clone());
            Ok::<_, StepError>(input)
        }
    })
}

/// Adds `n` to a numeric context
pub fn add(name: &str, n: i64) -> Step {
    Step::new(name, move |x: Value, _ctx| async move {
        let current = x.as_i64().ok_or_else(|| StepError::failed("expected a number"))?;
        Ok::<_, StepError>(json!(current + n))
    })
}

pub fn double(name: &str) -> Step {
    Step::new(name, |x: Value, _ctx| async move {
        let current = x.as_i64().ok_or_else(|| StepError::failed("expected a number"))?;
        Ok::<_, StepError>(json!(current * 2))
    })
}

pub fn failing(name: &str, message: &str) -> Step {
    let message = message.to_string();
    Step::new(name, move |_x: Value, _ctx| {
        let message = message.clone();
        async move { Err::<Value, _>(StepError::failed(message)) }
    })
}

/// Step whose closure panics before producing a future
pub fn panicking(name: &str) -> Step {
    Step::new(
        name,
        |_x: Value, _ctx| -> futures_util::future::Ready<Result<Value, StepError>> { panic!("kaboom") },
    )
}

/// Step that counts how often it was invoked
pub fn counted(name: &str, calls: Arc<AtomicUsize>) -> Step {
    Step::new(name, move |x: Value, _ctx| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, StepError>(x) }
    })
}

/// What a [`FakeAgent`] does when called
#[derive(Clone)]
pub enum FakeBehavior {
    /// Reply `{ ok: true, data }`
    Reply(Value),
    /// Reply `{ ok: false, error }`
    Refuse(String),
    /// Return an error instead of an output
    Throw(String),
    /// Echo the input after a delay
    Slow(Duration),
}

/// Scripted capability that counts its invocations
pub struct FakeAgent {
    behavior: FakeBehavior,
    calls: AtomicUsize,
}

impl FakeAgent {
    pub fn new(behavior: FakeBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Capability for FakeAgent {
    async fn process(&self, input: Value) -> Result<AgentOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            FakeBehavior::Reply(data) => Ok(AgentOutput::success(data.clone())),
            FakeBehavior::Refuse(error) => Ok(AgentOutput::failure(error.clone())),
            FakeBehavior::Throw(error) => Err(AgentError::Api(error.clone())),
            FakeBehavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(AgentOutput::success(input))
            }
        }
    }
}

/// Registry with a fixed set of fake agents
pub fn fake_registry() -> InMemoryRegistry {
    InMemoryRegistry::new()
        .with("design", FakeAgent::new(FakeBehavior::Reply(json!({"layout": "grid"}))))
        .with("caption", FakeAgent::new(FakeBehavior::Reply(json!("Golden hour"))))
        .with("refuser", FakeAgent::new(FakeBehavior::Refuse("no credits left".into())))
        .with("thrower", FakeAgent::new(FakeBehavior::Throw("upstream 502".into())))
        .with("slow", FakeAgent::new(FakeBehavior::Slow(Duration::from_millis(30))))
        .with("billing", FakeAgent::new(FakeBehavior::Reply(json!("charged"))))
}

/// Service over [`fake_registry`] with `billing` disallowed
pub fn test_service() -> PipelineService {
    PipelineService::new(Arc::new(fake_registry()), Telemetry::default(), PipelineOptions::default())
        .with_disallowed(HashSet::from(["billing".to_string()]))
}
