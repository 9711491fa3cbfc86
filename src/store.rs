//! Document store: embedding-aware facade over a vector backend.
//!
//! [`DocumentStore`] owns the write and read paths of the retrieval core:
//! it embeds chunk texts, constructs payloads, and delegates record
//! movement to a [`VectorBackend`]. Construction is two-phase — the
//! constructor only stores configuration, and [`initialize`](DocumentStore::initialize)
//! establishes the collection. Every other operation fails with
//! [`RagError::NotInitialized`] until initialization completes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::{
    Chunk, DocumentSummary, EmbeddingRecord, Passage, PassageMetadata, RecordPayload,
};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorBackend;

/// Default collection name for document embeddings.
pub const DEFAULT_COLLECTION: &str = "documents";

/// The vector store component: chunk persistence plus similarity search.
///
/// Long-lived and shared across requests. The backend connection and the
/// embedding client are injected once at construction; rebuilding them per
/// request is disallowed for cost and latency reasons.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use ragpipe::{DocumentStore, InMemoryBackend};
///
/// let store = DocumentStore::new(Arc::new(InMemoryBackend::new()), embedder, None);
/// store.initialize().await?;
/// let ids = store.add(&chunks, "doc-1", &HashMap::new()).await?;
/// ```
pub struct DocumentStore {
    backend: Arc<dyn VectorBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
    initialized: OnceCell<()>,
}

impl DocumentStore {
    /// Create a new store. No connection or collection work happens here;
    /// call [`initialize`](DocumentStore::initialize) before any operation.
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: Option<String>,
    ) -> Self {
        Self {
            backend,
            embedder,
            collection: collection.unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            initialized: OnceCell::new(),
        }
    }

    /// Establish the backing collection with the embedder's dimension and
    /// cosine distance. Idempotent: an existing collection is reused, and
    /// repeated calls are no-ops once the first succeeds.
    pub async fn initialize(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                let dimensions = self.embedder.dimensions();
                self.backend.create_collection(&self.collection, dimensions).await?;
                info!(collection = %self.collection, dimensions, "document store initialized");
                Ok(())
            })
            .await
            .copied()
    }

    fn ensure_ready(&self) -> Result<()> {
        self.initialized.get().copied().ok_or(RagError::NotInitialized)
    }

    /// The collection name this store reads and writes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Embed and persist chunks of one document as a single batch upsert.
    ///
    /// `extra` is merged into every record's payload; `filename` and
    /// `content_type` string entries are lifted into the typed payload
    /// fields. Returns the new record ids, in chunk order. Empty input
    /// returns an empty list without contacting the embedder or the backend.
    pub async fn add(
        &self,
        chunks: &[Chunk],
        doc_id: &str,
        extra: &HashMap<String, Value>,
    ) -> Result<Vec<String>> {
        self.ensure_ready()?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let expected = self.embedder.dimensions();
        if let Some(vector) = vectors.iter().find(|v| v.len() != expected) {
            return Err(RagError::DimensionMismatch { expected, actual: vector.len() });
        }

        let filename = extra.get("filename").and_then(Value::as_str).map(str::to_string);
        let content_type = extra.get("content_type").and_then(Value::as_str).map(str::to_string);
        let passthrough: HashMap<String, Value> = extra
            .iter()
            .filter(|(key, _)| key.as_str() != "filename" && key.as_str() != "content_type")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let mut ids = Vec::with_capacity(chunks.len());
        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let id = Uuid::new_v4().to_string();
                ids.push(id.clone());
                EmbeddingRecord {
                    id,
                    vector,
                    payload: RecordPayload {
                        doc_id: doc_id.to_string(),
                        content: chunk.text.clone(),
                        chunk_index: chunk.index,
                        filename: filename.clone(),
                        content_type: content_type.clone(),
                        extra: passthrough.clone(),
                    },
                }
            })
            .collect();

        self.backend.upsert(&self.collection, &records).await?;

        info!(doc_id, chunk_count = records.len(), "added document chunks");
        Ok(ids)
    }

    /// Embed the query and return the `top_k` most similar passages,
    /// optionally restricted by a payload filter (logical AND over all
    /// pairs) and a minimum similarity score.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&HashMap<String, Value>>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<Passage>> {
        self.ensure_ready()?;

        let query_vector = self.embedder.embed(query).await?;
        let results = self
            .backend
            .search(&self.collection, &query_vector, top_k, filter, score_threshold)
            .await?;

        let passages: Vec<Passage> = results
            .into_iter()
            .map(|scored| Passage {
                content: scored.payload.content.clone(),
                score: scored.score,
                metadata: PassageMetadata::from_payload(scored.payload),
            })
            .collect();

        debug!(query_len = query.len(), result_count = passages.len(), "search completed");
        Ok(passages)
    }

    /// Remove all records belonging to `doc_id`. Returns the number of
    /// chunks removed; 0 when nothing matched (not an error).
    pub async fn delete(&self, doc_id: &str) -> Result<usize> {
        self.ensure_ready()?;
        let removed = self.backend.delete_by_doc(&self.collection, doc_id).await?;
        info!(doc_id, removed, "deleted document chunks");
        Ok(removed)
    }

    /// List stored documents grouped by `doc_id`, paginated.
    ///
    /// Summaries appear in first-seen record order; each carries the chunk
    /// count and the filename/content type of the first chunk observed.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<DocumentSummary>> {
        self.ensure_ready()?;

        let payloads = self.backend.list_payloads(&self.collection).await?;
        let mut order: Vec<String> = Vec::new();
        let mut summaries: HashMap<String, DocumentSummary> = HashMap::new();

        for payload in payloads {
            let entry = summaries.entry(payload.doc_id.clone()).or_insert_with(|| {
                order.push(payload.doc_id.clone());
                DocumentSummary {
                    id: payload.doc_id.clone(),
                    filename: payload.filename.clone().unwrap_or_else(|| "unknown".to_string()),
                    content_type: payload
                        .content_type
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    chunk_count: 0,
                }
            });
            entry.chunk_count += 1;
        }

        Ok(order
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|doc_id| summaries.remove(&doc_id))
            .collect())
    }

    /// Count distinct documents currently stored.
    pub async fn count(&self) -> Result<usize> {
        self.ensure_ready()?;
        let payloads = self.backend.list_payloads(&self.collection).await?;
        let unique: HashSet<String> = payloads.into_iter().map(|p| p.doc_id).collect();
        Ok(unique.len())
    }

    /// True iff the store is initialized and the backend responds.
    pub async fn health(&self) -> bool {
        if self.initialized.get().is_none() {
            return false;
        }
        self.backend.healthy().await
    }
}
