//! Metrics aggregator - per-step counters and timers
//!
//! Samples accumulate for the lifetime of the aggregator. There is no reset,
//! no windowing and no percentiles; this feeds an internal dashboard, not a
//! metrics backend.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate for one step name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSample {
    /// Invocations, successful or not
    pub count: u64,

    /// Sum of all invocation durations
    pub total_duration_ms: u64,

    /// Failed invocations
    pub failure_count: u64,
}

impl MetricsSample {
    /// Mean duration per invocation
    pub fn average_duration_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.count as f64
    }
}

/// Shared counters keyed by step name
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    samples: Mutex<BTreeMap<String, MetricsSample>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed invocation
    pub fn record(&self, step_name: &str, duration_ms: u64, success: bool) {
        let mut samples = self.samples.lock();
        let sample = samples.entry(step_name.to_string()).or_default();
        sample.count += 1;
        sample.total_duration_ms = sample.total_duration_ms.saturating_add(duration_ms);
        if !success {
            sample.failure_count += 1;
        }
    }

    /// Snapshot of every sample
    pub fn get_all(&self) -> BTreeMap<String, MetricsSample> {
        self.samples.lock().clone()
    }

    /// Snapshot restricted to the given names
    pub fn snapshot_for<'a, I>(&self, names: I) -> BTreeMap<String, MetricsSample>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let samples = self.samples.lock();
        names
            .into_iter()
            .filter_map(|name| samples.get(name).map(|s| (name.to_string(), *s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_success_and_failure() {
        let metrics = MetricsAggregator::new();
        metrics.record("caption", 40, true);
        metrics.record("caption", 60, false);

        let all = metrics.get_all();
        let sample = all["caption"];
        assert_eq!(sample.count, 2);
        assert_eq!(sample.total_duration_ms, 100);
        assert_eq!(sample.failure_count, 1);
        assert_eq!(sample.average_duration_ms(), 50.0);
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let metrics = MetricsAggregator::new();
        metrics.record("a", 1, true);
        assert_eq!(metrics.get_all(), metrics.get_all());
    }

    #[test]
    fn test_snapshot_for_subset() {
        let metrics = MetricsAggregator::new();
        metrics.record("a", 1, true);
        metrics.record("b", 2, true);

        let subset = metrics.snapshot_for(["b", "missing"]);
        assert_eq!(subset.len(), 1);
        assert_eq!(subset["b"].total_duration_ms, 2);
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let metrics = Arc::new(MetricsAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        metrics.record("shared", 1, true);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let sample = metrics.get_all()["shared"];
        assert_eq!(sample.count, 4000);
        assert_eq!(sample.total_duration_ms, 4000);
    }
}
