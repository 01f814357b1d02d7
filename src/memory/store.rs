//! In-process similarity store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::similarity::{Candidate, rank};
use super::{RecordMetadata, SimilarityStore};
use crate::error::MemoryError;

#[derive(Debug, Clone)]
struct StoredDocument {
    id: String,
    document: String,
}

/// Documents held in a `Vec`, ranked on every query.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<Vec<StoredDocument>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SimilarityStore for InMemoryStore {
    async fn add(
        &self,
        id: &str,
        document: &str,
        _metadata: &RecordMetadata,
    ) -> Result<(), MemoryError> {
        let mut docs = self.docs.write().await;
        // Same id replaces, matching upsert semantics of persistent stores.
        docs.retain(|d| d.id != id);
        docs.push(StoredDocument {
            id: id.to_string(),
            document: document.to_string(),
        });
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<String>, MemoryError> {
        let candidates = self
            .docs
            .read()
            .await
            .iter()
            .enumerate()
            .map(|(seq, d)| Candidate {
                document: d.document.clone(),
                seq: seq as u64,
            })
            .collect();
        Ok(rank(text, candidates, k))
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.docs.read().await.len())
    }
}
