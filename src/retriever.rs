//! Retrieval strategies: turn a query into a ranked list of passages.
//!
//! This module provides the [`Retriever`] trait and four strategies:
//!
//! - [`SemanticRetriever`] — top-k cosine similarity, the baseline
//! - [`HybridRetriever`] — semantic similarity blended with keyword overlap
//! - [`ContextualRetriever`] — enriches the query with recent conversation turns
//! - [`AdvancedRetriever`] — semantic search, then optional rerank and compress

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::compressor::Compressor;
use crate::config::RagConfig;
use crate::document::Passage;
use crate::error::Result;
use crate::reranker::Reranker;
use crate::store::DocumentStore;

/// A strategy that turns a query into an ordered list of passages.
///
/// Stateless across calls (the contextual strategy's accumulated
/// conversation buffer is the one exception) and without internal caching.
/// Passage order always reflects descending relevance under the strategy's
/// scoring key, with ties preserving prior order.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve passages relevant to `query`.
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>>;
}

/// Baseline retrieval: delegate directly to the store's similarity search.
pub struct SemanticRetriever {
    store: Arc<DocumentStore>,
    top_k: usize,
    score_threshold: Option<f32>,
    filter: Option<HashMap<String, Value>>,
}

impl SemanticRetriever {
    /// Create a new semantic retriever returning `top_k` passages.
    pub fn new(store: Arc<DocumentStore>, top_k: usize) -> Self {
        Self { store, top_k, score_threshold: None, filter: None }
    }

    /// Drop results scoring below `threshold`.
    pub fn with_score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Restrict results to payloads matching all pairs in `filter`.
    pub fn with_filter(mut self, filter: HashMap<String, Value>) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[async_trait]
impl Retriever for SemanticRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
        self.store.search(query, self.top_k, self.filter.as_ref(), self.score_threshold).await
    }
}

/// Blends semantic similarity with lexical keyword overlap.
///
/// Pure embedding similarity can miss exact matches on identifiers and
/// names; the keyword term rewards literal overlap without a separate
/// sparse index. Fetches `2 x top_k` candidates semantically, scores each
/// as `semantic_weight * similarity + keyword_weight * overlap_fraction`,
/// deduplicates by `(doc_id, chunk_index)`, re-sorts, and truncates.
///
/// The combined score is intentionally not renormalized when the weights do
/// not sum to 1; callers use that as a tuning knob.
pub struct HybridRetriever {
    store: Arc<DocumentStore>,
    top_k: usize,
    semantic_weight: f32,
    keyword_weight: f32,
}

impl HybridRetriever {
    /// Create a new hybrid retriever with the default 0.7/0.3 blend.
    pub fn new(store: Arc<DocumentStore>, top_k: usize) -> Self {
        Self { store, top_k, semantic_weight: 0.7, keyword_weight: 0.3 }
    }

    /// Set the blend weights.
    pub fn with_weights(mut self, semantic_weight: f32, keyword_weight: f32) -> Self {
        self.semantic_weight = semantic_weight;
        self.keyword_weight = keyword_weight;
        self
    }

    /// Fraction of query terms present in `content` (lower-cased,
    /// whitespace-tokenized).
    fn keyword_overlap(query_terms: &HashSet<String>, content: &str) -> f32 {
        let content_terms: HashSet<String> =
            content.to_lowercase().split_whitespace().map(str::to_string).collect();
        let overlap = query_terms.intersection(&content_terms).count();
        overlap as f32 / query_terms.len().max(1) as f32
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
        // Fetch a wider candidate set for re-scoring.
        let candidates = self.store.search(query, self.top_k * 2, None, None).await?;

        let query_terms: HashSet<String> =
            query.to_lowercase().split_whitespace().map(str::to_string).collect();

        let mut seen: HashSet<(String, Option<usize>)> = HashSet::new();
        let mut scored: Vec<Passage> = Vec::with_capacity(candidates.len());
        for mut passage in candidates {
            let key = (passage.metadata.doc_id.clone(), passage.metadata.chunk_index);
            if !seen.insert(key) {
                continue;
            }
            let keyword_score = Self::keyword_overlap(&query_terms, &passage.content);
            passage.score =
                self.semantic_weight * passage.score + self.keyword_weight * keyword_score;
            scored.push(passage);
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(self.top_k);

        debug!(query_len = query.len(), result_count = scored.len(), "hybrid retrieval completed");
        Ok(scored)
    }
}

/// Maximum conversation turns retained by the contextual retriever.
const MAX_CONTEXT_TURNS: usize = 10;

/// Number of recent turns prepended to the query.
const CONTEXT_WINDOW: usize = 3;

/// Wraps a base retriever and enriches queries with conversation context.
///
/// [`add_context`](ContextualRetriever::add_context) appends a turn and
/// evicts the oldest once more than 10 are held. At retrieval time the last
/// 3 turns are prepended to the query text; the base retriever then runs on
/// the enriched string. The buffer lives only for the process lifetime —
/// session durability belongs to the caller.
pub struct ContextualRetriever {
    base: Arc<dyn Retriever>,
    context: Mutex<VecDeque<String>>,
}

impl ContextualRetriever {
    /// Create a new contextual retriever over `base`.
    pub fn new(base: Arc<dyn Retriever>) -> Self {
        Self { base, context: Mutex::new(VecDeque::new()) }
    }

    /// Record a conversation turn, evicting the oldest beyond the cap.
    pub fn add_context(&self, message: impl Into<String>) {
        let mut context = self.context.lock().expect("context lock poisoned");
        context.push_back(message.into());
        while context.len() > MAX_CONTEXT_TURNS {
            context.pop_front();
        }
    }

    /// Number of turns currently held.
    pub fn context_len(&self) -> usize {
        self.context.lock().expect("context lock poisoned").len()
    }

    /// Snapshot of the current turns, oldest first.
    pub fn context(&self) -> Vec<String> {
        self.context.lock().expect("context lock poisoned").iter().cloned().collect()
    }

    fn enrich(&self, query: &str) -> String {
        let context = self.context.lock().expect("context lock poisoned");
        if context.is_empty() {
            return query.to_string();
        }
        let skip = context.len().saturating_sub(CONTEXT_WINDOW);
        let recent: Vec<&str> = context.iter().skip(skip).map(String::as_str).collect();
        format!("{} {query}", recent.join(" "))
    }
}

#[async_trait]
impl Retriever for ContextualRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
        let enriched = self.enrich(query);
        debug!(enriched_len = enriched.len(), "contextual retrieval");
        self.base.retrieve(&enriched).await
    }
}

/// Fixed three-stage pipeline: semantic search, optional rerank, optional
/// compression.
///
/// When reranking is enabled the first stage fetches `initial_k` candidates
/// so the reranker has a wide pool to narrow to `top_k`; otherwise it
/// fetches `top_k` directly. Stages run in fixed order — each consumes the
/// previous stage's full output, so they are never parallelized.
pub struct AdvancedRetriever {
    store: Arc<DocumentStore>,
    top_k: usize,
    initial_k: usize,
    reranker: Option<Arc<dyn Reranker>>,
    compressor: Option<Arc<dyn Compressor>>,
}

impl AdvancedRetriever {
    /// Create a new advanced retriever with no rerank or compression stage.
    pub fn new(store: Arc<DocumentStore>, top_k: usize, initial_k: usize) -> Self {
        Self { store, top_k, initial_k, reranker: None, compressor: None }
    }

    /// Enable the reranking stage.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Enable the compression stage.
    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }
}

#[async_trait]
impl Retriever for AdvancedRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
        let fetch_k = if self.reranker.is_some() { self.initial_k } else { self.top_k };
        let mut passages = self.store.search(query, fetch_k, None, None).await?;
        debug!(candidate_count = passages.len(), "initial retrieval complete");

        if let Some(reranker) = &self.reranker {
            if !passages.is_empty() {
                passages = reranker.rerank(query, passages, self.top_k).await?;
                debug!(result_count = passages.len(), "reranking complete");
            }
        }

        if let Some(compressor) = &self.compressor {
            if !passages.is_empty() {
                passages = compressor.compress(query, passages).await?;
                debug!(result_count = passages.len(), "compression complete");
            }
        }

        Ok(passages)
    }
}

/// Retrieval strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrieverKind {
    /// Plain top-k similarity search. The fallback default.
    #[default]
    Semantic,
    /// Semantic similarity blended with keyword overlap.
    Hybrid,
    /// Semantic search over a context-enriched query.
    Contextual,
    /// Semantic search, then rerank and/or compress.
    Advanced,
}

/// Resolve a [`RetrieverKind`] into a retriever instance.
///
/// `reranker` and `compressor` only apply to the advanced strategy; the
/// other strategies ignore them.
pub fn build_retriever(
    kind: RetrieverKind,
    store: Arc<DocumentStore>,
    config: &RagConfig,
    reranker: Option<Arc<dyn Reranker>>,
    compressor: Option<Arc<dyn Compressor>>,
) -> Arc<dyn Retriever> {
    match kind {
        RetrieverKind::Semantic => Arc::new(
            SemanticRetriever::new(store, config.top_k)
                .with_score_threshold(config.score_threshold),
        ),
        RetrieverKind::Hybrid => Arc::new(
            HybridRetriever::new(store, config.top_k)
                .with_weights(config.semantic_weight, config.keyword_weight),
        ),
        RetrieverKind::Contextual => {
            let base = SemanticRetriever::new(store, config.top_k)
                .with_score_threshold(config.score_threshold);
            Arc::new(ContextualRetriever::new(Arc::new(base)))
        }
        RetrieverKind::Advanced => {
            let mut retriever = AdvancedRetriever::new(store, config.top_k, config.initial_k);
            if let Some(reranker) = reranker {
                retriever = retriever.with_reranker(reranker);
            }
            if let Some(compressor) = compressor {
                retriever = retriever.with_compressor(compressor);
            }
            Arc::new(retriever)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PassageMetadata;

    /// Records the queries it receives and returns a canned result.
    struct RecordingRetriever {
        queries: Mutex<Vec<String>>,
    }

    impl RecordingRetriever {
        fn new() -> Self {
            Self { queries: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Retriever for RecordingRetriever {
        async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(vec![Passage {
                content: "result".to_string(),
                score: 1.0,
                metadata: PassageMetadata { doc_id: "d".to_string(), ..Default::default() },
            }])
        }
    }

    #[tokio::test]
    async fn context_buffer_evicts_beyond_ten_turns() {
        let retriever = ContextualRetriever::new(Arc::new(RecordingRetriever::new()));
        for i in 0..12 {
            retriever.add_context(format!("turn {i}"));
        }

        assert_eq!(retriever.context_len(), 10);
        let context = retriever.context();
        assert_eq!(context.first().map(String::as_str), Some("turn 2"));
        assert_eq!(context.last().map(String::as_str), Some("turn 11"));
    }

    #[tokio::test]
    async fn contextual_prepends_last_three_turns() {
        let base = Arc::new(RecordingRetriever::new());
        let retriever = ContextualRetriever::new(Arc::clone(&base) as Arc<dyn Retriever>);

        for turn in ["one", "two", "three", "four"] {
            retriever.add_context(turn);
        }
        retriever.retrieve("question").await.unwrap();

        let queries = base.queries.lock().unwrap();
        assert_eq!(queries[0], "two three four question");
    }

    #[tokio::test]
    async fn contextual_without_context_passes_query_through() {
        let base = Arc::new(RecordingRetriever::new());
        let retriever = ContextualRetriever::new(Arc::clone(&base) as Arc<dyn Retriever>);

        retriever.retrieve("bare question").await.unwrap();
        assert_eq!(base.queries.lock().unwrap()[0], "bare question");
    }

    #[test]
    fn keyword_overlap_is_a_fraction_of_query_terms() {
        let terms: HashSet<String> =
            ["error".to_string(), "code".to_string()].into_iter().collect();
        assert_eq!(HybridRetriever::keyword_overlap(&terms, "the error code is 42"), 1.0);
        assert_eq!(HybridRetriever::keyword_overlap(&terms, "an error occurred"), 0.5);
        assert_eq!(HybridRetriever::keyword_overlap(&terms, "nothing relevant"), 0.0);
    }

    #[test]
    fn keyword_overlap_with_empty_query_is_zero() {
        let terms = HashSet::new();
        assert_eq!(HybridRetriever::keyword_overlap(&terms, "any content"), 0.0);
    }
}
