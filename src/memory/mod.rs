//! Plan memory: past (utterance, plan) pairs retrieved by similarity and fed
//! back to the planner as context.
//!
//! The ranking backend is pluggable through [`SimilarityStore`]:
//! - [`InMemoryStore`] for tests and throwaway sessions
//! - [`LibSqlStore`] for a local file that survives restarts

mod libsql_store;
pub mod similarity;
mod store;

pub use libsql_store::LibSqlStore;
pub use store::InMemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::MemoryError;

/// Structured fields stored alongside each document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub user_input: String,
    pub agent_plan: String,
}

/// Backend that stores documents and ranks them against a query.
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Add a document under a unique id. Ids are never reused.
    async fn add(
        &self,
        id: &str,
        document: &str,
        metadata: &RecordMetadata,
    ) -> Result<(), MemoryError>;

    /// Up to `k` documents, most similar to `text` first.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<String>, MemoryError>;

    /// Number of stored documents.
    async fn count(&self) -> Result<usize, MemoryError>;
}

/// A stored interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub user_input: String,
    /// Raw plan text exactly as it was dispatched.
    pub agent_plan: String,
    /// Text the similarity ranking runs against.
    pub document: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(user_input: &str, agent_plan: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_input: user_input.to_string(),
            agent_plan: agent_plan.to_string(),
            document: format!("User asked: '{user_input}'. Agent plan was: {agent_plan}"),
            created_at: Utc::now(),
        }
    }

    pub fn metadata(&self) -> RecordMetadata {
        RecordMetadata {
            user_input: self.user_input.clone(),
            agent_plan: self.agent_plan.clone(),
        }
    }
}

/// Memory of dispatched plans.
#[derive(Clone)]
pub struct PlanMemory {
    store: Arc<dyn SimilarityStore>,
}

impl PlanMemory {
    pub fn new(store: Arc<dyn SimilarityStore>) -> Self {
        Self { store }
    }

    /// Memory backed by a fresh [`InMemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Retrieve up to `k` past interactions relevant to `query`.
    ///
    /// Never fails: an empty store or a backend error yields no context.
    pub async fn retrieve(&self, query: &str, k: usize) -> Vec<String> {
        match self.store.count().await {
            Ok(0) => return Vec::new(),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Memory count failed, continuing without context");
                return Vec::new();
            }
        }

        match self.store.query(query, k).await {
            Ok(docs) => {
                info!(count = docs.len(), "Retrieved relevant memories");
                docs
            }
            Err(e) => {
                warn!(error = %e, "Memory query failed, continuing without context");
                Vec::new()
            }
        }
    }

    /// Record a dispatched plan.
    pub async fn save(&self, user_input: &str, plan: &str) -> Result<MemoryRecord, MemoryError> {
        let record = MemoryRecord::new(user_input, plan);
        self.store
            .add(&record.id.to_string(), &record.document, &record.metadata())
            .await?;
        debug!(record_id = %record.id, "Saved to memory");
        Ok(record)
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.store.count().await
    }
}
