//! Trace recorder - append-only log of step lifecycle events

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use uuid::Uuid;

/// Default number of events kept by a recorder
pub const DEFAULT_TRACE_CAPACITY: usize = 1000;

/// Lifecycle phase of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracePhase {
    Started,
    Succeeded,
    Failed,
}

/// A single trace entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    /// Run this event belongs to
    pub run_id: Uuid,

    /// Step that emitted the event
    pub step_name: String,

    /// Lifecycle phase
    pub phase: TracePhase,

    /// When the event was recorded
    pub timestamp: DateTime<Utc>,

    /// Bounded output summary on success, error text on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_summary: Option<String>,
}

impl TraceEvent {
    pub fn started(run_id: Uuid, step_name: &str) -> Self {
        Self::new(run_id, step_name, TracePhase::Started, None)
    }

    pub fn succeeded(run_id: Uuid, step_name: &str, summary: String) -> Self {
        Self::new(run_id, step_name, TracePhase::Succeeded, Some(summary))
    }

    pub fn failed(run_id: Uuid, step_name: &str, error: String) -> Self {
        Self::new(run_id, step_name, TracePhase::Failed, Some(error))
    }

    fn new(run_id: Uuid, step_name: &str, phase: TracePhase, payload_summary: Option<String>) -> Self {
        Self {
            run_id,
            step_name: step_name.to_string(),
            phase,
            timestamp: Utc::now(),
            payload_summary,
        }
    }
}

/// Process-wide buffer of trace events shared by concurrent runs.
///
/// The buffer is bounded; once full, the oldest events are evicted.
#[derive(Debug)]
pub struct TraceRecorder {
    events: Mutex<VecDeque<TraceEvent>>,
    capacity: usize,
}

impl TraceRecorder {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_TRACE_CAPACITY))),
            capacity,
        }
    }

    /// Append an event. Never fails.
    pub fn record(&self, event: TraceEvent) {
        let mut events = self.events.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Most recent events across all runs, newest first
    pub fn get_recent(&self, limit: usize) -> Vec<TraceEvent> {
        let events = self.events.lock();
        events.iter().rev().take(limit).cloned().collect()
    }

    /// Events of one run in the order they were recorded
    pub fn for_run(&self, run_id: Uuid) -> Vec<TraceEvent> {
        let events = self.events.lock();
        events.iter().filter(|e| e.run_id == run_id).cloned().collect()
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_CAPACITY)
    }
}

/// Render a value as compact JSON, cut to at most `max_chars` characters
pub fn summarize(value: &Value, max_chars: usize) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if rendered.chars().count() <= max_chars {
        return rendered;
    }

    let mut truncated: String = rendered.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_recent_is_newest_first() {
        let recorder = TraceRecorder::new(10);
        let run = Uuid::new_v4();
        recorder.record(TraceEvent::started(run, "a"));
        recorder.record(TraceEvent::succeeded(run, "a", "1".to_string()));
        recorder.record(TraceEvent::started(run, "b"));

        let recent = recorder.get_recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].step_name, "b");
        assert_eq!(recent[0].phase, TracePhase::Started);
        assert_eq!(recent[1].phase, TracePhase::Succeeded);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let recorder = TraceRecorder::new(3);
        let run = Uuid::new_v4();
        for name in ["a", "b", "c", "d"] {
            recorder.record(TraceEvent::started(run, name));
        }

        assert_eq!(recorder.len(), 3);
        let names: Vec<_> = recorder.for_run(run).into_iter().map(|e| e.step_name).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_for_run_filters_other_runs() {
        let recorder = TraceRecorder::default();
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();
        recorder.record(TraceEvent::started(mine, "a"));
        recorder.record(TraceEvent::started(other, "x"));
        recorder.record(TraceEvent::failed(mine, "a", "boom".to_string()));

        let events = recorder.for_run(mine);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.run_id == mine));
        assert_eq!(events[1].payload_summary.as_deref(), Some("boom"));
    }

    #[test]
    fn test_summarize_bounds_output() {
        assert_eq!(summarize(&json!(10), 200), "10");
        assert_eq!(summarize(&json!("plain"), 200), "plain");
        assert_eq!(summarize(&json!({"a": 1}), 200), r#"{"a":1}"#);

        let long = json!("ééééééééé");
        assert_eq!(summarize(&long, 3), "ééé…");
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = TraceEvent::started(Uuid::nil(), "draft");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["stepName"], "draft");
        assert_eq!(value["phase"], "started");
        assert!(value.get("payloadSummary").is_none());
    }
}
