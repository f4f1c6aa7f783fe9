//! Observability shared across pipeline runs

pub mod metrics;
pub mod trace;

pub use metrics::{MetricsAggregator, MetricsSample};
pub use trace::{summarize, TraceEvent, TracePhase, TraceRecorder, DEFAULT_TRACE_CAPACITY};

use std::sync::Arc;

/// Trace recorder and metrics aggregator handed to orchestrators.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub trace: Arc<TraceRecorder>,
    pub metrics: Arc<MetricsAggregator>,
}

impl Telemetry {
    pub fn new(trace_capacity: usize) -> Self {
        Self {
            trace: Arc::new(TraceRecorder::new(trace_capacity)),
            metrics: Arc::new(MetricsAggregator::new()),
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_CAPACITY)
    }
}
