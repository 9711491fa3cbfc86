//! # ragpipe
//!
//! Retrieval pipeline for retrieval-augmented generation services: the
//! chain of components that takes a query and produces a ranked, filtered,
//! optionally compressed set of supporting passages.
//!
//! ## Components
//!
//! - [`Chunker`] — split raw document text into overlapping segments
//!   ([`TextChunker`], [`MarkdownChunker`], [`CodeChunker`])
//! - [`DocumentStore`] — embed and persist chunks, similarity search,
//!   deletion, and per-document listing over a pluggable [`VectorBackend`]
//! - [`Retriever`] — query strategies: semantic, hybrid, contextual, and an
//!   advanced search/rerank/compress pipeline
//! - [`Reranker`] — re-score candidates with a cross-encoder, an external
//!   rerank service, or an LLM judge
//! - [`Compressor`] — reduce passage length to query-relevant content
//!
//! External capabilities are injected behind traits: [`EmbeddingProvider`]
//! for text embeddings, [`LlmProvider`] for completions, and
//! [`VectorBackend`] for record storage. [`RagPipeline`] wires everything
//! together once at process start.
//!
//! ## Features
//!
//! - `openai` — OpenAI-compatible embedding and chat providers
//! - `qdrant` — Qdrant vector backend
//! - `cohere` — external rerank service client
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragpipe::{
//!     Document, DocumentStore, InMemoryBackend, RagConfig, RagPipeline, TextChunker,
//! };
//!
//! let store = Arc::new(DocumentStore::new(
//!     Arc::new(InMemoryBackend::new()),
//!     embedder,
//!     None,
//! ));
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .store(store)
//!     .chunker(Arc::new(TextChunker::new(1000, 200)))
//!     .build()?;
//!
//! pipeline.initialize().await?;
//! pipeline.ingest(&Document::new("doc-1", "...")).await?;
//! let passages = pipeline.retrieve("what does the doc say?").await?;
//! ```

pub mod chunking;
pub mod compressor;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod llm;
pub mod pipeline;
pub mod reranker;
pub mod retriever;
pub mod store;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use chunking::{Chunker, CodeChunker, MarkdownChunker, TextChunker, chunk_document};
pub use compressor::{
    Compressor, CompressorKind, EmbeddingCompressor, ExtractiveCompressor, LlmCompressor,
    build_compressor,
};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, Document, DocumentSummary, EmbeddingRecord, Passage, PassageMetadata, RecordPayload,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use inmemory::InMemoryBackend;
pub use llm::LlmProvider;
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use reranker::{
    CrossEncoderReranker, LlmReranker, PairScorer, Reranker, RerankerKind, build_reranker,
};
#[cfg(feature = "cohere")]
pub use reranker::RemoteReranker;
pub use retriever::{
    AdvancedRetriever, ContextualRetriever, HybridRetriever, Retriever, RetrieverKind,
    SemanticRetriever, build_retriever,
};
pub use store::{DEFAULT_COLLECTION, DocumentStore};
pub use vectorstore::{ScoredRecord, VectorBackend, cosine_similarity};

#[cfg(feature = "openai")]
pub use openai::{OpenAIChatProvider, OpenAIEmbeddingProvider};

#[cfg(feature = "qdrant")]
pub use qdrant::QdrantBackend;
