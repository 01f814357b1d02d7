//! libSQL-backed similarity store. Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use super::similarity::{Candidate, rank};
use super::{RecordMetadata, SimilarityStore};
use crate::error::MemoryError;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS memory_records (
        id TEXT PRIMARY KEY,
        document TEXT NOT NULL,
        user_input TEXT NOT NULL,
        agent_plan TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_memory_records_created ON memory_records(created_at);
"#;

/// Stores interaction documents in a libSQL table and ranks them in process.
///
/// Holds a single connection reused for all operations.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file.
    pub async fn new_local(path: &Path) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| MemoryError::Open(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Memory database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, MemoryError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| MemoryError::Open(format!("Failed to create in-memory database: {e}")))?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, MemoryError> {
        let conn = db
            .connect()
            .map_err(|e| MemoryError::Open(format!("Failed to create connection: {e}")))?;

        conn.execute_batch(SCHEMA)
            .await
            .map_err(|e| MemoryError::Open(format!("Failed to create schema: {e}")))?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }
}

#[async_trait]
impl SimilarityStore for LibSqlStore {
    async fn add(
        &self,
        id: &str,
        document: &str,
        metadata: &RecordMetadata,
    ) -> Result<(), MemoryError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO memory_records (id, document, user_input, agent_plan, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    document,
                    metadata.user_input.as_str(),
                    metadata.agent_plan.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| MemoryError::Query(format!("add: {e}")))?;
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<String>, MemoryError> {
        let mut rows = self
            .conn
            .query("SELECT document, rowid FROM memory_records", ())
            .await
            .map_err(|e| MemoryError::Query(format!("query: {e}")))?;

        let mut candidates = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| MemoryError::Query(format!("query row: {e}")))?
        {
            let document: String = row
                .get(0)
                .map_err(|e| MemoryError::Serialization(format!("document column: {e}")))?;
            let seq: i64 = row.get(1).unwrap_or(0);
            candidates.push(Candidate {
                document,
                seq: seq.max(0) as u64,
            });
        }

        Ok(rank(text, candidates, k))
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM memory_records", ())
            .await
            .map_err(|e| MemoryError::Query(format!("count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let n: i64 = row
                    .get(0)
                    .map_err(|e| MemoryError::Serialization(format!("count column: {e}")))?;
                Ok(n.max(0) as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(MemoryError::Query(format!("count: {e}"))),
        }
    }
}
