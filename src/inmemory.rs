//! In-memory vector backend using cosine similarity.
//!
//! This module provides [`InMemoryBackend`], a zero-dependency backend
//! suitable for development, testing, and small-scale use. Collections live
//! in a `HashMap` behind a `tokio::sync::RwLock`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::document::{EmbeddingRecord, RecordPayload};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorBackend, ScoredRecord, cosine_similarity};

struct Collection {
    dimensions: usize,
    /// Records in insertion order. Upserts with a known id replace in place.
    records: Vec<EmbeddingRecord>,
}

/// An in-memory [`VectorBackend`] with exact cosine search.
///
/// Enforces the collection's vector dimension on every write and query,
/// surfacing [`RagError::DimensionMismatch`] instead of silently storing or
/// mis-scoring a wrong-sized vector.
///
/// # Example
///
/// ```rust,ignore
/// use ragpipe::{InMemoryBackend, VectorBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.create_collection("documents", 1536).await?;
/// ```
#[derive(Default)]
pub struct InMemoryBackend {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn missing(collection: &str) -> RagError {
        RagError::VectorStoreError {
            backend: "InMemory".to_string(),
            message: format!("collection '{collection}' does not exist"),
        }
    }
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Collection { dimensions, records: Vec::new() });
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[EmbeddingRecord]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| Self::missing(collection))?;

        for record in records {
            if record.vector.len() != store.dimensions {
                return Err(RagError::DimensionMismatch {
                    expected: store.dimensions,
                    actual: record.vector.len(),
                });
            }
            match store.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => store.records.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&HashMap<String, Value>>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredRecord>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| Self::missing(collection))?;

        if vector.len() != store.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: store.dimensions,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<ScoredRecord> = store
            .records
            .iter()
            .filter(|record| filter.is_none_or(|f| record.payload.matches(f)))
            .map(|record| ScoredRecord {
                id: record.id.clone(),
                score: cosine_similarity(&record.vector, vector),
                payload: record.payload.clone(),
            })
            .filter(|record| score_threshold.is_none_or(|t| record.score >= t))
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_by_doc(&self, collection: &str, doc_id: &str) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| Self::missing(collection))?;

        let before = store.records.len();
        store.records.retain(|record| record.payload.doc_id != doc_id);
        Ok(before - store.records.len())
    }

    async fn list_payloads(&self, collection: &str) -> Result<Vec<RecordPayload>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| Self::missing(collection))?;
        Ok(store.records.iter().map(|record| record.payload.clone()).collect())
    }

    async fn healthy(&self) -> bool {
        true
    }
}
