//! CLI output formatting

use crate::core::{ExecutionStatus, PipelineResult, StepOutcome};
use crate::persistence::RunRecord;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Spinner shown while a pipeline runs
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// One line per step outcome
pub fn format_outcome(outcome: &StepOutcome) -> String {
    let agent = outcome
        .agent
        .as_deref()
        .filter(|agent| *agent != outcome.name)
        .map(|agent| format!(" ({})", agent))
        .unwrap_or_default();

    if outcome.ok {
        format!(
            "{} {}{} {}",
            CHECK,
            style(&outcome.name).green(),
            style(agent).dim(),
            style(format_duration(outcome.duration_ms)).dim()
        )
    } else {
        format!(
            "{} {}{}: {}",
            CROSS,
            style(&outcome.name).red(),
            style(agent).dim(),
            style(outcome.error.as_deref().unwrap_or("failed")).dim()
        )
    }
}

/// Closing line of a run
pub fn format_result_summary(result: &PipelineResult) -> String {
    let icon = if result.ok { CHECK } else { CROSS };
    let detail = match (&result.failed_at, &result.error) {
        (Some(step), _) => format!(" at {}", style(step).red()),
        (None, Some(error)) => format!(": {}", style(error).dim()),
        (None, None) => String::new(),
    };

    format!(
        "{} {} {}{} ({}/{} steps, {})",
        icon,
        style(&result.pipeline).bold(),
        format_status(result.status),
        detail,
        result.completed_steps(),
        result.steps.len(),
        format_duration(result.duration_ms)
    )
}

/// Format a stored run for display
pub fn format_run_record(record: &RunRecord) -> String {
    let status_icon = match record.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Cancelled => WARN,
    };
    let id = record.run_id.to_string();

    format!(
        "{} {} - {} - {} - {} ({}/{}) - {}",
        status_icon,
        style(&id[..8]).dim(),
        style(&record.pipeline_name).bold(),
        record.kind.as_str(),
        format_status(record.status),
        record.completed_steps,
        record.total_steps,
        style(record.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

pub fn format_duration(millis: u64) -> String {
    if millis < 1000 {
        return format!("{}ms", millis);
    }
    let secs = millis / 1000;
    if secs < 60 {
        format!("{:.1}s", millis as f64 / 1000.0)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
