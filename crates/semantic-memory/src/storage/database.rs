//! SQLite database for durable pipeline state
//!
//! One row per `(index, document_id)`. The full state is kept as JSON; the
//! version, status and timestamps are duplicated into columns so the
//! compare-and-swap and the in-progress scan stay in SQL.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::PipelineStore;
use crate::error::{Error, Result};
use crate::types::{DataPipeline, PipelineKey, PipelineKind, PipelineStatus};

/// SQLite-based pipeline store
#[derive(Clone)]
pub struct SqlitePipelineStore {
    conn: Arc<Mutex<Connection>>,
}

/// Row counts per derived status
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SqliteStoreStats {
    pub total: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub deleted: usize,
}

impl SqlitePipelineStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::storage(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::storage(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::storage(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pipelines (
                index_name TEXT NOT NULL,
                document_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                execution_id TEXT NOT NULL,
                state_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (index_name, document_id)
            );

            CREATE INDEX IF NOT EXISTS idx_pipelines_status ON pipelines(status);
            CREATE INDEX IF NOT EXISTS idx_pipelines_updated_at ON pipelines(updated_at);
        "#,
        )
        .map_err(|e| Error::storage(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Pipeline database migrations complete");
        Ok(())
    }

    fn get_sync(&self, key: &PipelineKey) -> Result<Option<DataPipeline>> {
        let conn = self.conn.lock();

        let json: Option<String> = conn
            .query_row(
                "SELECT state_json FROM pipelines WHERE index_name = ?1 AND document_id = ?2",
                params![key.index, key.document_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::storage(format!("Failed to read pipeline {}: {}", key, e)))?;

        json.map(|j| serde_json::from_str(&j).map_err(Error::from))
            .transpose()
    }

    fn save_sync(&self, pipeline: &DataPipeline, expected_version: Option<u64>) -> Result<()> {
        let key = pipeline.key();
        let state_json = serde_json::to_string(pipeline)?;
        let mut conn = self.conn.lock();

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::storage(format!("Failed to begin transaction: {}", e)))?;

        let found: Option<i64> = tx
            .query_row(
                "SELECT version FROM pipelines WHERE index_name = ?1 AND document_id = ?2",
                params![key.index, key.document_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::storage(format!("Failed to read version of {}: {}", key, e)))?;

        let found = found.map(|v| v as u64);
        if found != expected_version {
            return Err(Error::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
                found,
            });
        }

        tx.execute(
            r#"
            INSERT INTO pipelines (
                index_name, document_id, version, kind, status, execution_id,
                state_json, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(index_name, document_id) DO UPDATE SET
                version = excluded.version,
                kind = excluded.kind,
                status = excluded.status,
                execution_id = excluded.execution_id,
                state_json = excluded.state_json,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
            params![
                key.index,
                key.document_id,
                pipeline.version as i64,
                kind_to_string(pipeline.kind),
                status_to_string(pipeline.status()),
                pipeline.execution_id.to_string(),
                state_json,
                pipeline.created_at.to_rfc3339(),
                pipeline.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::storage(format!("Failed to write pipeline {}: {}", key, e)))?;

        tx.commit()
            .map_err(|e| Error::storage(format!("Failed to commit pipeline {}: {}", key, e)))?;

        Ok(())
    }

    fn query_states(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<DataPipeline>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let rows: Vec<String> = stmt
            .query_map(args, |row| row.get::<_, String>(0))
            .map_err(|e| Error::storage(format!("Failed to list pipelines: {}", e)))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| Error::storage(format!("Failed to read pipeline row: {}", e)))?;

        rows.iter()
            .map(|j| serde_json::from_str(j).map_err(Error::from))
            .collect()
    }

    /// Row counts per status
    pub fn get_stats(&self) -> Result<SqliteStoreStats> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM pipelines GROUP BY status")
            .map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let counts: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| Error::storage(format!("Failed to count pipelines: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        let mut stats = SqliteStoreStats::default();
        for (status, count) in counts {
            let count = count as usize;
            stats.total += count;
            match status.as_str() {
                "in_progress" => stats.in_progress += count,
                "completed" => stats.completed += count,
                "failed" => stats.failed += count,
                "deleted" => stats.deleted += count,
                other => tracing::warn!("Unknown pipeline status in database: {}", other),
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl PipelineStore for SqlitePipelineStore {
    async fn get(&self, key: &PipelineKey) -> Result<Option<DataPipeline>> {
        let store = self.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || store.get_sync(&key))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }

    async fn save(&self, pipeline: &DataPipeline, expected_version: Option<u64>) -> Result<()> {
        let store = self.clone();
        let pipeline = pipeline.clone();
        tokio::task::spawn_blocking(move || store.save_sync(&pipeline, expected_version))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }

    async fn list(&self, index: &str) -> Result<Vec<DataPipeline>> {
        let store = self.clone();
        let index = index.to_string();
        tokio::task::spawn_blocking(move || {
            store.query_states(
                "SELECT state_json FROM pipelines WHERE index_name = ?1 ORDER BY document_id ASC",
                params![index],
            )
        })
        .await
        .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }

    async fn list_in_progress(&self) -> Result<Vec<DataPipeline>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.query_states(
                "SELECT state_json FROM pipelines WHERE status = 'in_progress' \
                 ORDER BY updated_at ASC",
                params![],
            )
        })
        .await
        .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

fn status_to_string(status: PipelineStatus) -> &'static str {
    match status {
        PipelineStatus::InProgress => "in_progress",
        PipelineStatus::Completed => "completed",
        PipelineStatus::Failed => "failed",
        PipelineStatus::Deleted => "deleted",
    }
}

fn kind_to_string(kind: PipelineKind) -> &'static str {
    match kind {
        PipelineKind::Import => "import",
        PipelineKind::Deletion => "deletion",
    }
}
