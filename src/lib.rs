//! agent-pipelines - compose named agents into sequential and parallel
//! pipelines, with trace, metrics and run history

pub mod agent;
pub mod api;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use agent::{AgentError, AgentOutput, AgentRegistry, Capability, InMemoryRegistry};
pub use core::{AppConfig, ExecutionStatus, PipelineResult, Step, StepContext, StepError, ValidationError};
pub use execution::{GroupFailurePolicy, ParallelPipeline, PipelineElement, PipelineOptions, SequentialPipeline};
pub use service::PipelineService;
pub use telemetry::{MetricsAggregator, Telemetry, TraceRecorder};
