//! Context compressors: shrink retrieved passages to query-relevant content.
//!
//! This module provides the [`Compressor`] trait and three strategies:
//!
//! - [`LlmCompressor`] — asks an LLM to extract the relevant content, and
//!   drops passages the model marks irrelevant
//! - [`EmbeddingCompressor`] — keeps sentences whose embedding similarity to
//!   the query clears a threshold
//! - [`ExtractiveCompressor`] — heuristic sentence scoring by position,
//!   query overlap, and length

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::document::Passage;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::llm::LlmProvider;
use crate::vectorstore::cosine_similarity;

/// A compressor that reduces passage length to query-relevant content.
///
/// Compressors may drop passages entirely (the LLM strategy removes
/// passages judged irrelevant), so output length can be less than input
/// length in both senses. Every rewritten passage is stamped with
/// `compressed = true` plus before/after length bookkeeping. Empty input
/// returns empty immediately.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Compress `passages` down to the content relevant to `query`.
    async fn compress(&self, query: &str, passages: Vec<Passage>) -> Result<Vec<Passage>>;
}

/// Split text into sentences at `.`, `!`, or `?` followed by whitespace.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') && chars.peek().is_none_or(|c| c.is_whitespace()) {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }

    let sentence = current.trim();
    if !sentence.is_empty() {
        sentences.push(sentence.to_string());
    }
    sentences
}

/// Stamp compression bookkeeping on a passage's metadata.
fn stamp_compressed(
    passage: &mut Passage,
    original_length: usize,
    kept_sentences: Option<usize>,
    total_sentences: Option<usize>,
) {
    passage.metadata.compressed = true;
    passage.metadata.original_length = Some(original_length);
    passage.metadata.compressed_length = Some(passage.content.len());
    passage.metadata.kept_sentences = kept_sentences;
    passage.metadata.total_sentences = total_sentences;
}

/// Prompt template for LLM content extraction.
const COMPRESSION_PROMPT: &str = "Given the following document and question, extract only the parts of the document that are directly relevant to answering the question.
If no parts are relevant, respond with \"NOT_RELEVANT\".
Keep the extracted content concise but complete enough to answer the question.

Question: {question}

Document:
{document}

Relevant content:";

/// Sentinel the LLM returns when a document contains nothing relevant.
const NOT_RELEVANT: &str = "NOT_RELEVANT";

/// Compresses passages by asking an LLM to extract the relevant content.
///
/// Passages the model marks `NOT_RELEVANT` are dropped from the output
/// entirely. A failed extraction call keeps the original passage unmodified
/// rather than dropping it — one bad response must not lose context. Calls
/// are independent per passage and dispatched concurrently up to the
/// configured cap.
pub struct LlmCompressor {
    llm: Arc<dyn LlmProvider>,
    concurrency: usize,
}

impl LlmCompressor {
    /// Create a new LLM compressor with the default concurrency cap (4).
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm, concurrency: 4 }
    }

    /// Set the maximum number of in-flight extraction calls.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

#[async_trait]
impl Compressor for LlmCompressor {
    async fn compress(&self, query: &str, passages: Vec<Passage>) -> Result<Vec<Passage>> {
        use futures::stream::{self, StreamExt};

        if passages.is_empty() {
            return Ok(Vec::new());
        }

        debug!(passage_count = passages.len(), "llm compression");

        let calls = passages.into_iter().map(|mut passage| {
            let prompt = COMPRESSION_PROMPT
                .replace("{question}", query)
                .replace("{document}", &passage.content);
            let llm = Arc::clone(&self.llm);
            async move {
                match llm.complete(&prompt).await {
                    Ok(response) => {
                        let extracted = response.trim();
                        if extracted.eq_ignore_ascii_case(NOT_RELEVANT) {
                            debug!(doc_id = %passage.metadata.doc_id, "passage marked not relevant");
                            return None;
                        }
                        let original_length = passage.content.len();
                        passage.content = extracted.to_string();
                        stamp_compressed(&mut passage, original_length, None, None);
                        Some(passage)
                    }
                    Err(e) => {
                        warn!(error = %e, "compression failed, keeping original passage");
                        Some(passage)
                    }
                }
            }
        });

        let compressed: Vec<Passage> = stream::iter(calls)
            .buffered(self.concurrency)
            .filter_map(|passage| async move { passage })
            .collect()
            .await;

        Ok(compressed)
    }
}

/// Compresses passages by keeping sentences similar to the query embedding.
///
/// The query is embedded once; each passage's sentences are embedded in one
/// batch call. Sentences at or above `similarity_threshold` are kept, up to
/// `max_sentences`, reassembled in score-ranked order — not original textual
/// order, which can read disfluently; preserved as observed behavior rather
/// than silently reordered. If no sentence clears the threshold the original
/// passage is kept unmodified.
pub struct EmbeddingCompressor {
    embedder: Arc<dyn EmbeddingProvider>,
    similarity_threshold: f32,
    max_sentences: usize,
}

impl EmbeddingCompressor {
    /// Create a new embedding compressor with the default threshold (0.7)
    /// and sentence cap (10).
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder, similarity_threshold: 0.7, max_sentences: 10 }
    }

    /// Set the minimum similarity a sentence needs to be kept.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the maximum number of sentences kept per passage.
    pub fn with_max_sentences(mut self, max_sentences: usize) -> Self {
        self.max_sentences = max_sentences.max(1);
        self
    }
}

#[async_trait]
impl Compressor for EmbeddingCompressor {
    async fn compress(&self, query: &str, passages: Vec<Passage>) -> Result<Vec<Passage>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        debug!(passage_count = passages.len(), "embedding compression");

        let query_embedding = self.embedder.embed(query).await?;
        let mut compressed = Vec::with_capacity(passages.len());

        for mut passage in passages {
            let sentences = split_sentences(&passage.content);
            if sentences.is_empty() {
                continue;
            }

            let texts: Vec<&str> = sentences.iter().map(String::as_str).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;

            let mut scored: Vec<(&String, f32)> = sentences
                .iter()
                .zip(embeddings.iter())
                .map(|(sentence, embedding)| {
                    (sentence, cosine_similarity(&query_embedding, embedding))
                })
                .filter(|(_, similarity)| *similarity >= self.similarity_threshold)
                .collect();

            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            scored.truncate(self.max_sentences);

            if scored.is_empty() {
                // Nothing cleared the threshold: keep the passage as-is.
                compressed.push(passage);
                continue;
            }

            let kept = scored.len();
            let total = sentences.len();
            let original_length = passage.content.len();
            passage.content =
                scored.iter().map(|(sentence, _)| sentence.as_str()).collect::<Vec<_>>().join(" ");
            stamp_compressed(&mut passage, original_length, Some(kept), Some(total));
            compressed.push(passage);
        }

        Ok(compressed)
    }
}

/// Compresses passages with heuristic extractive summarization.
///
/// Sentences are scored by position (first sentence highest, last a smaller
/// bonus, middle sentences penalized with distance from the midpoint), query
/// term overlap, and length preference (10-30 words favored, under 5
/// penalized). The top-scoring sentences are selected to hit the target
/// count, then restored to original document order so the compressed passage
/// still reads coherently. Passages at or below `min_sentences` pass through
/// unchanged.
pub struct ExtractiveCompressor {
    compression_ratio: f32,
    min_sentences: usize,
    max_sentences: usize,
}

impl Default for ExtractiveCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractiveCompressor {
    /// Create a new extractive compressor with ratio 0.3 and 2..=10 sentences.
    pub fn new() -> Self {
        Self { compression_ratio: 0.3, min_sentences: 2, max_sentences: 10 }
    }

    /// Set the target ratio of kept sentences to total sentences.
    pub fn with_compression_ratio(mut self, ratio: f32) -> Self {
        self.compression_ratio = ratio;
        self
    }

    /// Set the minimum and maximum number of sentences to keep.
    pub fn with_sentence_bounds(mut self, min_sentences: usize, max_sentences: usize) -> Self {
        self.min_sentences = min_sentences;
        self.max_sentences = max_sentences.max(min_sentences.max(1));
        self
    }

    /// Score a sentence by position, query overlap, and length.
    fn score_sentence(
        sentence: &str,
        position: usize,
        total_sentences: usize,
        query_terms: &HashSet<String>,
    ) -> f32 {
        let mut score = 0.0f32;

        // Position bonus: openings carry the topic, endings the conclusion.
        if position == 0 {
            score += 0.3;
        } else if position == total_sentences - 1 {
            score += 0.1;
        } else {
            let midpoint = total_sentences as f32 / 2.0;
            let distance = (position as f32 - midpoint).abs() / total_sentences as f32;
            score += 0.1 * (1.0 - distance);
        }

        // Query term overlap.
        let sentence_terms: HashSet<String> =
            sentence.to_lowercase().split_whitespace().map(str::to_string).collect();
        let overlap = query_terms.intersection(&sentence_terms).count();
        score += 0.4 * (overlap as f32 / query_terms.len().max(1) as f32);

        // Length preference.
        let word_count = sentence.split_whitespace().count();
        if (10..=30).contains(&word_count) {
            score += 0.2;
        } else if word_count < 5 {
            score -= 0.1;
        }

        score
    }
}

#[async_trait]
impl Compressor for ExtractiveCompressor {
    async fn compress(&self, query: &str, passages: Vec<Passage>) -> Result<Vec<Passage>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        debug!(passage_count = passages.len(), "extractive compression");

        let query_terms: HashSet<String> =
            query.to_lowercase().split_whitespace().map(str::to_string).collect();

        let mut compressed = Vec::with_capacity(passages.len());
        for mut passage in passages {
            let sentences = split_sentences(&passage.content);
            let total = sentences.len();

            if total <= self.min_sentences {
                // Too short to bother: pass through byte-identical.
                compressed.push(passage);
                continue;
            }

            let mut scored: Vec<(usize, f32)> = sentences
                .iter()
                .enumerate()
                .map(|(i, sentence)| {
                    (i, Self::score_sentence(sentence, i, total, &query_terms))
                })
                .collect();

            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

            let target = (total as f32 * self.compression_ratio).round() as usize;
            let target = target.clamp(self.min_sentences, self.max_sentences);
            scored.truncate(target);

            // Restore original document order for coherence.
            scored.sort_by_key(|(index, _)| *index);

            let kept = scored.len();
            let original_length = passage.content.len();
            passage.content = scored
                .iter()
                .map(|(index, _)| sentences[*index].as_str())
                .collect::<Vec<_>>()
                .join(" ");
            stamp_compressed(&mut passage, original_length, Some(kept), Some(total));
            compressed.push(passage);
        }

        Ok(compressed)
    }
}

/// Compression strategy selection.
///
/// Each variant carries the collaborator it needs; resolve to a shared
/// [`Compressor`] through [`build_compressor`].
#[derive(Clone)]
pub enum CompressorKind {
    /// LLM extraction of relevant content.
    Llm {
        /// The LLM provider used for extraction.
        provider: Arc<dyn LlmProvider>,
    },
    /// Sentence filtering by embedding similarity to the query.
    Embedding {
        /// The embedding provider used for sentence similarity.
        provider: Arc<dyn EmbeddingProvider>,
    },
    /// Heuristic extractive summarization.
    Extractive,
}

/// Resolve a [`CompressorKind`] into a compressor instance.
pub fn build_compressor(kind: CompressorKind) -> Arc<dyn Compressor> {
    match kind {
        CompressorKind::Llm { provider } => Arc::new(LlmCompressor::new(provider)),
        CompressorKind::Embedding { provider } => Arc::new(EmbeddingCompressor::new(provider)),
        CompressorKind::Extractive => Arc::new(ExtractiveCompressor::new()),
    }
}
