//! Persistence layer for pipeline run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::{PipelineKind, PipelineResult};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

/// A stored pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: Uuid,

    pub pipeline_name: String,

    pub kind: PipelineKind,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Number of steps the pipeline declared
    pub total_steps: usize,

    /// Number of steps that succeeded
    pub completed_steps: usize,

    pub failed_at: Option<String>,

    /// The full result as returned to the caller
    pub result: PipelineResult,
}

impl RunRecord {
    pub fn new(result: PipelineResult, total_steps: usize) -> Self {
        Self {
            run_id: result.run_id,
            pipeline_name: result.pipeline.clone(),
            kind: result.kind,
            status: result.status,
            started_at: result.started_at,
            completed_at: result.completed_at,
            total_steps,
            completed_steps: result.completed_steps(),
            failed_at: result.failed_at.clone(),
            result,
        }
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run, replacing any earlier record with the same id
    async fn save_run(&self, record: &RunRecord) -> Result<()>;

    /// Load a run by id
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunRecord>>;

    /// Runs of one pipeline, newest first
    async fn list_runs(&self, pipeline_name: &str, limit: usize) -> Result<Vec<RunRecord>>;

    /// Runs of all pipelines, newest first
    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>>;

    /// All pipeline names with at least one run, sorted
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunRecord>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    async fn newest_first<F>(&self, filter: F, limit: usize) -> Vec<RunRecord>
    where
        F: Fn(&RunRecord) -> bool,
    {
        let runs = self.runs.read().await;
        let mut matching: Vec<RunRecord> = runs.values().filter(|r| filter(r)).cloned().collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching.truncate(limit);
        matching
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, record: &RunRecord) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(record.run_id, record.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: &str, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self
            .newest_first(|r| r.pipeline_name == pipeline_name, limit)
            .await)
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self.newest_first(|_| true, limit).await)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Open the history store at `path`
#[cfg(feature = "sqlite")]
pub async fn open_store(path: &Path) -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(SqliteRunStore::new(path).await?))
}

/// Open the history store at `path`
#[cfg(not(feature = "sqlite"))]
pub async fn open_store(path: &Path) -> Result<Arc<dyn PersistenceBackend>> {
    tracing::warn!(path = %path.display(), "Built without sqlite; run history is kept in memory");
    Ok(Arc::new(InMemoryPersistence::new()))
}

/// Save a record without making the caller wait.
///
/// Failures are logged and otherwise ignored.
pub fn save_in_background(store: Arc<dyn PersistenceBackend>, record: RunRecord) -> JoinHandle<()> {
    tokio::spawn(async move {
        match store.save_run(&record).await {
            Ok(()) => debug!(run_id = %record.run_id, "Saved run history"),
            Err(e) => error!(run_id = %record.run_id, "Failed to save run history: {:#}", e),
        }
    })
}
