//! SQLite-based run history store

use crate::core::{PipelineKind, PipelineResult};
use crate::persistence::{ExecutionStatus, PersistenceBackend, RunRecord};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

const SELECT_RUNS: &str = r#"
    SELECT id, pipeline_name, kind, status, started_at, completed_at,
           total_steps, completed_steps, failed_at, result
    FROM runs
"#;

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Open (or create) the database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Store that lives only as long as the process
    pub async fn in_memory() -> Result<Self> {
        // One connection, otherwise each pooled connection sees its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                total_steps INTEGER NOT NULL DEFAULT 0,
                completed_steps INTEGER NOT NULL DEFAULT 0,
                failed_at TEXT,
                result TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create runs table")?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_runs_pipeline ON runs(pipeline_name)",
            "CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at)",
        ] {
            sqlx::query(index).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Fixed-width RFC 3339 so that text order is time order
    fn encode_time(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn decode_time(value: &str) -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
    }

    fn from_row(row: &SqliteRow) -> Result<RunRecord> {
        let kind: String = row.get("kind");
        let status: String = row.get("status");
        let result: String = row.get("result");
        let result: PipelineResult =
            serde_json::from_str(&result).context("Failed to decode stored result")?;

        Ok(RunRecord {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            kind: PipelineKind::parse(&kind).ok_or_else(|| anyhow!("Unknown pipeline kind: {}", kind))?,
            status: ExecutionStatus::parse(&status).ok_or_else(|| anyhow!("Unknown run status: {}", status))?,
            started_at: Self::decode_time(&row.get::<String, _>("started_at"))?,
            completed_at: Self::decode_time(&row.get::<String, _>("completed_at"))?,
            total_steps: row.get::<i64, _>("total_steps") as usize,
            completed_steps: row.get::<i64, _>("completed_steps") as usize,
            failed_at: row.get("failed_at"),
            result,
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run(&self, record: &RunRecord) -> Result<()> {
        let result = serde_json::to_string(&record.result).context("Failed to encode result")?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_name, kind, status, started_at, completed_at, total_steps, completed_steps, failed_at, result)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(record.run_id.to_string())
        .bind(&record.pipeline_name)
        .bind(record.kind.as_str())
        .bind(record.status.as_str())
        .bind(Self::encode_time(record.started_at))
        .bind(Self::encode_time(record.completed_at))
        .bind(record.total_steps as i64)
        .bind(record.completed_steps as i64)
        .bind(record.failed_at.as_deref())
        .bind(result)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let row = sqlx::query(&format!("{} WHERE id = ?1", SELECT_RUNS))
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_runs(&self, pipeline_name: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE pipeline_name = ?1 ORDER BY started_at DESC LIMIT ?2",
            SELECT_RUNS
        ))
        .bind(pipeline_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(&format!("{} ORDER BY started_at DESC LIMIT ?1", SELECT_RUNS))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list recent runs")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pipeline_name
            FROM runs
            ORDER BY pipeline_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::tests::record;
    use chrono::Duration;

    #[tokio::test]
    async fn test_sqlite_store() {
        let store = SqliteRunStore::in_memory().await.unwrap();
        let rec = record("social", Utc::now());

        store.save_run(&rec).await.unwrap();

        let loaded = store.load_run(rec.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.pipeline_name, rec.pipeline_name);
        assert_eq!(loaded.status, rec.status);
        assert_eq!(loaded.failed_at, rec.failed_at);
        assert_eq!(loaded.result.run_id, rec.run_id);
        assert!(store.load_run(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_newest_first() {
        let store = SqliteRunStore::in_memory().await.unwrap();
        let now = Utc::now();
        let old = record("social", now - Duration::seconds(30));
        let new = record("social", now);
        let other = record("audit", now - Duration::seconds(1));
        for r in [&old, &new, &other] {
            store.save_run(r).await.unwrap();
        }

        let social = store.list_runs("social", 1).await.unwrap();
        assert_eq!(social.len(), 1);
        assert_eq!(social[0].run_id, new.run_id);

        let recent = store.recent_runs(10).await.unwrap();
        assert_eq!(
            recent.iter().map(|r| r.run_id).collect::<Vec<_>>(),
            vec![new.run_id, other.run_id, old.run_id]
        );
        assert_eq!(store.list_pipelines().await.unwrap(), vec!["audit", "social"]);
    }

    #[tokio::test]
    async fn test_sqlite_file_is_created() {
        let dir = std::env::temp_dir().join(format!("agent-pipelines-{}", Uuid::new_v4()));
        let path = dir.join("runs.db");
        let store = SqliteRunStore::new(&path).await.unwrap();
        store.save_run(&record("file", Utc::now())).await.unwrap();
        assert!(path.exists());
        std::fs::remove_dir_all(dir).ok();
    }
}
