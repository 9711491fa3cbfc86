//! Retrieval pipeline orchestrator.
//!
//! The [`RagPipeline`] is the dependency-injection context for the retrieval
//! core: it is constructed once at process start from a [`DocumentStore`], a
//! [`Chunker`], and optional rerank/compress collaborators, and passed to
//! whatever needs retrieval. There is no global state — tests substitute
//! fakes by building a pipeline over mock providers.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragpipe::{RagPipeline, RagConfig, RetrieverKind, InMemoryBackend, TextChunker};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .store(store)
//!     .chunker(Arc::new(TextChunker::new(1000, 200)))
//!     .retriever_kind(RetrieverKind::Semantic)
//!     .build()?;
//!
//! pipeline.initialize().await?;
//! pipeline.ingest(&document).await?;
//! let passages = pipeline.retrieve("search query").await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::chunking::{Chunker, chunk_document};
use crate::compressor::Compressor;
use crate::config::RagConfig;
use crate::document::{Document, DocumentSummary, Passage};
use crate::error::{RagError, Result};
use crate::reranker::Reranker;
use crate::retriever::{Retriever, RetrieverKind, build_retriever};
use crate::store::DocumentStore;

/// The retrieval pipeline orchestrator.
///
/// Coordinates document ingestion (chunk, embed, store) and query execution
/// through the configured retrieval strategy, and re-exposes the store's
/// CRUD surface. Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    store: Arc<DocumentStore>,
    chunker: Arc<dyn Chunker>,
    retriever: Arc<dyn Retriever>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the underlying document store.
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Establish the store's backing collection. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        self.store.initialize().await
    }

    /// Ingest a document: chunk, embed, and store in one batch.
    ///
    /// The document's filename, content type, and metadata are carried into
    /// every stored chunk's payload. Returns the new record ids.
    pub async fn ingest(&self, document: &Document) -> Result<Vec<String>> {
        let chunks = chunk_document(document, self.chunker.as_ref());

        let mut extra: HashMap<String, Value> = document.metadata.clone();
        if let Some(filename) = &document.filename {
            extra.insert("filename".to_string(), Value::String(filename.clone()));
        }
        if let Some(content_type) = &document.content_type {
            extra.insert("content_type".to_string(), Value::String(content_type.clone()));
        }

        let ids = self.store.add(&chunks, &document.id, &extra).await?;
        info!(document_id = %document.id, chunk_count = ids.len(), "ingested document");
        Ok(ids)
    }

    /// Retrieve passages for `query` through the configured strategy.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
        self.retriever.retrieve(query).await
    }

    /// Remove all chunks of a document. Returns the number removed.
    pub async fn delete(&self, doc_id: &str) -> Result<usize> {
        self.store.delete(doc_id).await
    }

    /// List stored documents, paginated.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<DocumentSummary>> {
        self.store.list(limit, offset).await
    }

    /// Count distinct stored documents.
    pub async fn count(&self) -> Result<usize> {
        self.store.count().await
    }

    /// True iff the store is initialized and its backend responds.
    pub async fn health(&self) -> bool {
        self.store.health().await
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `store` and `chunker` are required. The retriever defaults to the
/// semantic strategy; pass a [`RetrieverKind`] plus optional collaborators,
/// or a pre-built retriever, to change it.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    store: Option<Arc<DocumentStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    retriever_kind: RetrieverKind,
    retriever: Option<Arc<dyn Retriever>>,
    reranker: Option<Arc<dyn Reranker>>,
    compressor: Option<Arc<dyn Compressor>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration. Defaults to [`RagConfig::default`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document store.
    pub fn store(mut self, store: Arc<DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Select the retrieval strategy to build.
    pub fn retriever_kind(mut self, kind: RetrieverKind) -> Self {
        self.retriever_kind = kind;
        self
    }

    /// Use a pre-built retriever instead of building one from a kind.
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the reranker used by the advanced strategy.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set the compressor used by the advanced strategy.
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Build the [`RagPipeline`], validating that required parts are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `store` or `chunker` is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        let store =
            self.store.ok_or_else(|| RagError::ConfigError("store is required".to_string()))?;
        let chunker =
            self.chunker.ok_or_else(|| RagError::ConfigError("chunker is required".to_string()))?;

        let retriever = match self.retriever {
            Some(retriever) => retriever,
            None => build_retriever(
                self.retriever_kind,
                Arc::clone(&store),
                &config,
                self.reranker,
                self.compressor,
            ),
        };

        Ok(RagPipeline { config, store, chunker, retriever })
    }
}
