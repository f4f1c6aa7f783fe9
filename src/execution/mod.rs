//! Pipeline execution

pub mod executor;
pub mod options;
pub mod parallel;
pub mod run;
pub mod sequential;

pub use executor::{RunControl, StepExecutor};
pub use options::{GroupFailurePolicy, PipelineOptions};
pub use parallel::{ParallelPipeline, PipelineElement};
pub use sequential::SequentialPipeline;
