//! Parallel orchestrator behaviour: barriers, completion order and group
//! failure policies

mod common;

use agent_pipelines::core::ExecutionStatus;
use agent_pipelines::telemetry::TracePhase;
use agent_pipelines::{GroupFailurePolicy, ParallelPipeline, PipelineElement, PipelineOptions, Telemetry};
use common::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn pipeline(elements: Vec<PipelineElement>, policy: GroupFailurePolicy) -> ParallelPipeline {
    ParallelPipeline::new(
        "social",
        elements,
        Telemetry::default(),
        PipelineOptions::default().with_group_policy(policy),
    )
    .unwrap()
}

#[tokio::test]
async fn test_group_is_a_barrier() {
    let timeline = Timeline::new();
    let seen = Arc::new(Mutex::new(None));
    let elements = vec![
        spy("s1", &timeline, ms(0), json!("brief")).into(),
        vec![
            spy("s2a", &timeline, ms(50), json!("slow")),
            spy("s2b", &timeline, ms(10), json!("fast")),
        ]
        .into(),
        capture_input("s3", seen.clone()).into(),
    ];

    let result = pipeline(elements, GroupFailurePolicy::FailFast).run(Value::Null).await;

    assert!(result.ok);
    // Both members started before either finished
    assert!(timeline.index_of("start:s2b") < timeline.index_of("end:s2a"));
    assert!(timeline.index_of("start:s2a") < timeline.index_of("end:s2b"));
    assert_eq!(timeline.events().last().map(String::as_str), Some("end:s2a"));

    // s3 runs after the barrier, on the merged group output
    assert_eq!(*seen.lock(), Some(json!({"s2a": "slow", "s2b": "fast"})));
    let names: Vec<&str> = result.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["s1", "s2b", "s2a", "s3"]);
}

#[tokio::test]
async fn test_trace_follows_completion_order() {
    let timeline = Timeline::new();
    let elements = vec![vec![
        spy("first", &timeline, ms(60), json!(1)),
        spy("second", &timeline, ms(30), json!(2)),
        spy("third", &timeline, ms(5), json!(3)),
    ]
    .into()];

    let result = pipeline(elements, GroupFailurePolicy::FailFast).run(Value::Null).await;

    let events: Vec<(&str, TracePhase)> =
        result.trace.iter().map(|e| (e.step_name.as_str(), e.phase)).collect();
    assert_eq!(
        events,
        vec![
            ("first", TracePhase::Started),
            ("second", TracePhase::Started),
            ("third", TracePhase::Started),
            ("third", TracePhase::Succeeded),
            ("second", TracePhase::Succeeded),
            ("first", TracePhase::Succeeded),
        ]
    );
}

#[tokio::test]
async fn test_group_runs_concurrently() {
    let timeline = Timeline::new();
    let elements = vec![vec![
        spy("a", &timeline, ms(100), json!(1)),
        spy("b", &timeline, ms(100), json!(2)),
        spy("c", &timeline, ms(100), json!(3)),
    ]
    .into()];

    let result = pipeline(elements, GroupFailurePolicy::FailFast).run(Value::Null).await;

    assert!(result.ok);
    assert!(result.duration_ms < 250, "group took {}ms", result.duration_ms);
}

#[tokio::test]
async fn test_partial_failure_fail_fast_halts() {
    let timeline = Timeline::new();
    let elements = vec![
        vec![
            failing_spy("broken", &timeline, ms(5)),
            spy("fine", &timeline, ms(40), json!("ok")),
        ]
        .into(),
        spy("after", &timeline, ms(0), json!("done")).into(),
    ];

    let result = pipeline(elements, GroupFailurePolicy::FailFast).run(Value::Null).await;

    assert!(!result.ok);
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.failed_at.as_deref(), Some("broken"));
    assert_eq!(result.error.as_deref(), Some("broken failed"));

    // The sibling was not cancelled by the failure
    assert_eq!(result.steps.len(), 2);
    assert!(result.step("fine").unwrap().ok);
    assert!(timeline.contains("end:fine"));
    assert!(!timeline.contains("start:after"));
}

#[tokio::test]
async fn test_partial_failure_continue_uses_successful_outputs() {
    let timeline = Timeline::new();
    let seen = Arc::new(Mutex::new(None));
    let elements = vec![
        vec![
            failing_spy("broken", &timeline, ms(5)),
            spy("fine", &timeline, ms(20), json!("ok")),
        ]
        .into(),
        capture_input("after", seen.clone()).into(),
    ];

    let result = pipeline(elements, GroupFailurePolicy::ContinueOnPartialFailure)
        .run(Value::Null)
        .await;

    assert_eq!(*seen.lock(), Some(json!({"fine": "ok"})));
    assert_eq!(result.steps.len(), 3);
    // A failure anywhere keeps ok false
    assert!(!result.ok);
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.failed_at.as_deref(), Some("broken"));
    assert_eq!(result.output, Some(json!({"fine": "ok"})));
}

#[tokio::test]
async fn test_single_step_failure_halts_parallel_pipeline() {
    let timeline = Timeline::new();
    let elements = vec![
        failing_spy("gate", &timeline, ms(0)).into(),
        vec![spy("x", &timeline, ms(0), json!(1))].into(),
    ];

    let result = pipeline(elements, GroupFailurePolicy::ContinueOnPartialFailure)
        .run(Value::Null)
        .await;

    assert_eq!(result.failed_at.as_deref(), Some("gate"));
    assert_eq!(result.steps.len(), 1);
    assert!(!timeline.contains("start:x"));
}

#[tokio::test]
async fn test_metrics_cover_group_members() {
    let telemetry = Telemetry::default();
    let timeline = Timeline::new();
    let parallel = ParallelPipeline::new(
        "metrics",
        vec![vec![
            spy("a", &timeline, ms(5), json!(1)),
            failing_spy("b", &timeline, ms(5)),
        ]
        .into()],
        telemetry.clone(),
        PipelineOptions::default(),
    )
    .unwrap();

    let result = parallel.run(Value::Null).await;

    assert_eq!(result.metrics.len(), 2);
    assert_eq!(result.metrics["a"].failure_count, 0);
    assert_eq!(result.metrics["b"].failure_count, 1);
    assert_eq!(telemetry.metrics.get_all(), result.metrics);
}
