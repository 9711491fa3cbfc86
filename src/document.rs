//! Data types for documents, chunks, passages, and stored records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A source document containing text content and ingestion metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The raw text content of the document.
    pub text: String,
    /// Original filename, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// MIME type or format label, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Free-form metadata carried through to every stored chunk.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    /// Create a new document with the given id and text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            filename: None,
            content_type: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the original filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// An ordered fragment of a source document produced by a chunker.
///
/// Chunks from one document, concatenated in `index` order, reproduce the
/// cleaned source text modulo chunk-boundary overlap. Chunks are immutable
/// after creation and are removed in bulk when the parent document is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// Zero-based position among sibling chunks of the same document.
    pub index: usize,
    /// Sibling count at creation time.
    pub total_chunks: usize,
}

/// The payload stored alongside each embedding record.
///
/// Well-known fields are typed; provider-specific extras go into the open
/// `extra` map so unknown keys survive a round trip without losing type
/// safety on the fields every stage relies on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordPayload {
    /// Identifier of the owning document.
    pub doc_id: String,
    /// The chunk text this record was embedded from.
    pub content: String,
    /// Position of the chunk among its siblings.
    pub chunk_index: usize,
    /// Original filename, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// MIME type or format label, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Open extension map for provider-specific extras.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl RecordPayload {
    /// Look up a payload field by name, checking well-known fields first.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "doc_id" => Some(Value::String(self.doc_id.clone())),
            "content" => Some(Value::String(self.content.clone())),
            "chunk_index" => Some(Value::from(self.chunk_index as u64)),
            "filename" => self.filename.clone().map(Value::String),
            "content_type" => self.content_type.clone().map(Value::String),
            other => self.extra.get(other).cloned(),
        }
    }

    /// True if every key/value pair in `filter` matches this payload (logical AND).
    pub fn matches(&self, filter: &HashMap<String, Value>) -> bool {
        filter.iter().all(|(key, value)| self.field(key).as_ref() == Some(value))
    }
}

/// The persisted unit in a vector backend: one embedded chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// Opaque unique identifier, stable for the record's lifetime.
    pub id: String,
    /// Fixed-dimension embedding vector.
    pub vector: Vec<f32>,
    /// Chunk text plus provenance metadata.
    pub payload: RecordPayload,
}

/// Metadata carried by a retrieval result.
///
/// `original_score` and `rerank_score` are attached by the reranker; the
/// original score is never overwritten, only superseded for ordering.
/// Compression stamps `compressed` plus the length bookkeeping fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PassageMetadata {
    /// Identifier of the owning document.
    pub doc_id: String,
    /// Position of the source chunk among its siblings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    /// Original filename, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// MIME type or format label, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Score assigned by the reranking stage, normalized to [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    /// The pre-rerank relevance score, preserved for audit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_score: Option<f32>,
    /// True once a compressor has rewritten the passage content.
    #[serde(default)]
    pub compressed: bool,
    /// Content length in bytes before compression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_length: Option<usize>,
    /// Content length in bytes after compression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_length: Option<usize>,
    /// Number of sentences kept by a sentence-level compressor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kept_sentences: Option<usize>,
    /// Number of sentences in the passage before compression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sentences: Option<usize>,
    /// Open extension map carried through from the stored payload.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl PassageMetadata {
    /// Build passage metadata from a stored payload.
    pub fn from_payload(payload: RecordPayload) -> Self {
        Self {
            doc_id: payload.doc_id,
            chunk_index: Some(payload.chunk_index),
            filename: payload.filename,
            content_type: payload.content_type,
            extra: payload.extra,
            ..Self::default()
        }
    }
}

/// A retrieved passage with its relevance score.
///
/// `score` is the ordering key under the most recent stage: the similarity
/// score from the originating search, replaced by the rerank score once
/// reranking has run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    /// The passage text. Compression may rewrite this in place.
    pub content: String,
    /// Relevance score under the current stage's scoring key.
    pub score: f32,
    /// Provenance and stage bookkeeping.
    pub metadata: PassageMetadata,
}

/// One entry in a document listing, grouping all chunks that share a doc id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSummary {
    /// The document identifier.
    pub id: String,
    /// Original filename, or `"unknown"` when the payload carried none.
    pub filename: String,
    /// Content type, or `"unknown"` when the payload carried none.
    pub content_type: String,
    /// Number of stored chunks belonging to this document.
    pub chunk_count: usize,
}
