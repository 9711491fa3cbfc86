//! Vector backend trait for storing and searching embedding records.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{EmbeddingRecord, RecordPayload};
use crate::error::Result;

/// A stored record returned from a backend similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// The record identifier.
    pub id: String,
    /// Similarity score under the backend's distance metric (cosine).
    pub score: f32,
    /// The record payload (chunk text plus provenance).
    pub payload: RecordPayload,
}

/// A storage backend for embedding records with similarity search.
///
/// Implementations manage named collections with a fixed vector dimension
/// and cosine distance. The [`DocumentStore`](crate::store::DocumentStore)
/// owns embedding and payload construction; backends only move records.
///
/// Failure semantics: backends do not retry internally. Network and service
/// errors are mapped to [`RagError::VectorStoreError`](crate::error::RagError)
/// and propagate to the caller.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Create a named collection with the given dimension. Idempotent: an
    /// existing collection is reused, not recreated.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Upsert records into a collection as a single batch.
    async fn upsert(&self, collection: &str, records: &[EmbeddingRecord]) -> Result<()>;

    /// Search for the `top_k` records most similar to `vector`, optionally
    /// restricted to payloads matching all pairs in `filter` (logical AND)
    /// and to scores at or above `score_threshold`.
    ///
    /// Returns results ordered by descending similarity.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&HashMap<String, Value>>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredRecord>>;

    /// Remove every record whose payload `doc_id` matches, in one bulk
    /// operation. Returns the number of records removed (0 when none match).
    async fn delete_by_doc(&self, collection: &str, doc_id: &str) -> Result<usize>;

    /// Return the payloads of all records in a collection, for grouping
    /// into per-document summaries.
    async fn list_payloads(&self, collection: &str) -> Result<Vec<RecordPayload>>;

    /// True iff the backing connection responds to a lightweight control call.
    async fn healthy(&self) -> bool;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
