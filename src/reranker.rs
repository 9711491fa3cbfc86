//! Rerankers: re-score an initial candidate set with a more accurate model.
//!
//! This module provides the [`Reranker`] trait and three strategies:
//!
//! - [`CrossEncoderReranker`] — joint (query, passage) scoring through a
//!   [`PairScorer`] model, off-loaded to a blocking worker thread
//! - [`RemoteReranker`] — one batched call to an external rerank service
//!   (feature `cohere`)
//! - [`LlmReranker`] — LLM-as-judge scoring, one call per passage

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::document::Passage;
use crate::error::{RagError, Result};
use crate::llm::LlmProvider;

/// A reranker that re-scores and reorders retrieved passages.
///
/// All strategies attach `rerank_score` and `original_score` to passage
/// metadata, sort descending by the new score (stable, so prior order breaks
/// ties), and truncate to `top_k`. An empty input returns an empty sequence
/// immediately without any model or network call.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank `passages` against `query`, keeping the top `top_k`.
    async fn rerank(&self, query: &str, passages: Vec<Passage>, top_k: usize)
    -> Result<Vec<Passage>>;
}

/// Record the new score on a passage, preserving the pre-rerank score.
fn attach_rerank_score(passage: &mut Passage, score: f32) {
    passage.metadata.original_score = Some(passage.score);
    passage.metadata.rerank_score = Some(score);
    passage.score = score;
}

/// Stable sort by descending score, then truncate to `top_k`.
fn sort_and_truncate(mut passages: Vec<Passage>, top_k: usize) -> Vec<Passage> {
    passages.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    passages.truncate(top_k);
    passages
}

/// A model that scores (query, passage) pairs jointly.
///
/// Cross-encoder inference is CPU/GPU-bound and synchronous; implementations
/// wrap a local model (e.g. an ONNX or candle sequence-classification head)
/// and are called from a blocking worker thread so scoring never stalls the
/// async scheduler.
pub trait PairScorer: Send + Sync + 'static {
    /// Score each of `texts` against `query`. Returns one raw score per
    /// text, in input order. Higher means more relevant.
    fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>>;
}

/// Reranks by scoring each (query, passage) pair jointly with a model that
/// attends to both texts at once — more accurate than comparing independent
/// embeddings.
///
/// Scoring runs on a blocking worker thread in batches of `batch_size`.
pub struct CrossEncoderReranker {
    scorer: Arc<dyn PairScorer>,
    batch_size: usize,
}

impl CrossEncoderReranker {
    /// Create a new cross-encoder reranker with the default batch size (32).
    pub fn new(scorer: Arc<dyn PairScorer>) -> Self {
        Self { scorer, batch_size: 32 }
    }

    /// Set the inference batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn rerank(
        &self,
        query: &str,
        mut passages: Vec<Passage>,
        top_k: usize,
    ) -> Result<Vec<Passage>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let scorer = Arc::clone(&self.scorer);
        let batch_size = self.batch_size;
        let query = query.to_string();
        let texts: Vec<String> = passages.iter().map(|p| p.content.clone()).collect();

        debug!(candidate_count = texts.len(), "cross-encoder reranking");

        let scores = tokio::task::spawn_blocking(move || -> Result<Vec<f32>> {
            let mut scores = Vec::with_capacity(texts.len());
            for batch in texts.chunks(batch_size) {
                scores.extend(scorer.score_pairs(&query, batch)?);
            }
            Ok(scores)
        })
        .await
        .map_err(|e| RagError::RerankerError {
            reranker: "cross-encoder".to_string(),
            message: format!("scoring task failed: {e}"),
        })??;

        if scores.len() != passages.len() {
            return Err(RagError::RerankerError {
                reranker: "cross-encoder".to_string(),
                message: format!("expected {} scores, got {}", passages.len(), scores.len()),
            });
        }

        for (passage, score) in passages.iter_mut().zip(scores) {
            attach_rerank_score(passage, score);
        }
        Ok(sort_and_truncate(passages, top_k))
    }
}

/// Reranks through an external rerank service with one batched request.
///
/// The service receives the query and every candidate text, and returns
/// indices with relevance scores; scores are mapped back to the original
/// passages by index. Transport and protocol failures propagate.
#[cfg(feature = "cohere")]
pub struct RemoteReranker {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[cfg(feature = "cohere")]
mod remote {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    pub(super) struct RerankRequest<'a> {
        pub model: &'a str,
        pub query: &'a str,
        pub documents: Vec<&'a str>,
        pub top_n: usize,
    }

    #[derive(Deserialize)]
    pub(super) struct RerankResponse {
        pub results: Vec<RerankEntry>,
    }

    #[derive(Deserialize)]
    pub(super) struct RerankEntry {
        pub index: usize,
        pub relevance_score: f32,
    }
}

#[cfg(feature = "cohere")]
impl RemoteReranker {
    /// Default rerank endpoint.
    pub const DEFAULT_ENDPOINT: &str = "https://api.cohere.com/v2/rerank";
    /// Default rerank model.
    pub const DEFAULT_MODEL: &str = "rerank-english-v3.0";

    /// Create a new remote reranker with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::RerankerError {
                reranker: "remote".to_string(),
                message: "API key must not be empty".to_string(),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: Self::DEFAULT_MODEL.to_string(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// Set the rerank model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the rerank endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn transport_err(message: String) -> RagError {
        RagError::RerankerError { reranker: "remote".to_string(), message }
    }
}

#[cfg(feature = "cohere")]
#[async_trait]
impl Reranker for RemoteReranker {
    async fn rerank(
        &self,
        query: &str,
        passages: Vec<Passage>,
        top_k: usize,
    ) -> Result<Vec<Passage>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let request = remote::RerankRequest {
            model: &self.model,
            query,
            documents: passages.iter().map(|p| p.content.as_str()).collect(),
            top_n: top_k,
        };

        debug!(candidate_count = passages.len(), model = %self.model, "remote reranking");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::transport_err(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Self::transport_err(format!("service returned {status}")));
        }

        let parsed: remote::RerankResponse = response
            .json()
            .await
            .map_err(|e| Self::transport_err(format!("failed to parse response: {e}")))?;

        // Map service indices back to the original passage objects.
        let mut slots: Vec<Option<Passage>> = passages.into_iter().map(Some).collect();
        let mut reranked = Vec::with_capacity(parsed.results.len());
        for entry in parsed.results {
            let mut passage = slots
                .get_mut(entry.index)
                .and_then(Option::take)
                .ok_or_else(|| Self::transport_err(format!("invalid index {}", entry.index)))?;
            attach_rerank_score(&mut passage, entry.relevance_score);
            reranked.push(passage);
        }

        Ok(sort_and_truncate(reranked, top_k))
    }
}

/// Prompt template for LLM relevance scoring.
const SCORING_PROMPT: &str = "Rate the relevance of this document to the query on a scale of 0-10.
Only respond with a single number.

Query: {query}

Document:
{document}

Relevance score (0-10):";

/// Maximum passage characters sent to the LLM per scoring call.
const SCORING_MAX_CHARS: usize = 1000;

/// Neutral raw score used when the LLM response cannot be parsed.
const DEFAULT_RAW_SCORE: f32 = 5.0;

/// Reranks by asking an LLM to rate each passage's relevance from 0 to 10.
///
/// More expensive than embedding similarity but can judge complex queries.
/// Passage text is truncated before scoring to bound cost. Non-numeric
/// responses fall back to the neutral default score rather than failing the
/// batch; transport failures propagate. Per-passage calls are independent
/// and dispatched concurrently up to the configured cap, with final ordering
/// determined by the scores, not call-completion order.
pub struct LlmReranker {
    llm: Arc<dyn LlmProvider>,
    concurrency: usize,
}

impl LlmReranker {
    /// Create a new LLM reranker with the default concurrency cap (4).
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm, concurrency: 4 }
    }

    /// Set the maximum number of in-flight scoring calls.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Parse a 0-10 relevance score, clamping the range and falling back to
    /// the neutral default on malformed output.
    fn parse_score(response: &str) -> f32 {
        response.trim().parse::<f32>().map_or(DEFAULT_RAW_SCORE, |score| score.clamp(0.0, 10.0))
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(
        &self,
        query: &str,
        mut passages: Vec<Passage>,
        top_k: usize,
    ) -> Result<Vec<Passage>> {
        use futures::stream::{self, StreamExt, TryStreamExt};

        if passages.is_empty() {
            return Ok(Vec::new());
        }

        debug!(candidate_count = passages.len(), "llm reranking");

        let calls: Vec<_> = passages
            .iter()
            .map(|passage| {
                let truncated: String =
                    passage.content.chars().take(SCORING_MAX_CHARS).collect();
                let prompt = SCORING_PROMPT
                    .replace("{query}", query)
                    .replace("{document}", &truncated);
                let llm = Arc::clone(&self.llm);
                async move {
                    let response = llm.complete(&prompt).await?;
                    Ok::<f32, RagError>(Self::parse_score(&response) / 10.0)
                }
            })
            .collect();

        let scores: Vec<f32> =
            stream::iter(calls).buffered(self.concurrency).try_collect().await?;

        for (passage, score) in passages.iter_mut().zip(scores) {
            attach_rerank_score(passage, score);
        }
        Ok(sort_and_truncate(passages, top_k))
    }
}

/// Reranking strategy selection.
///
/// Each variant carries the collaborator it needs; resolve to a shared
/// [`Reranker`] through [`build_reranker`].
#[derive(Clone)]
pub enum RerankerKind {
    /// Joint (query, passage) scoring through a local model.
    CrossEncoder {
        /// The pair-scoring model.
        scorer: Arc<dyn PairScorer>,
    },
    /// One batched call to an external rerank service.
    #[cfg(feature = "cohere")]
    Remote {
        /// API key for the rerank service.
        api_key: String,
    },
    /// LLM-as-judge scoring, one call per passage.
    Llm {
        /// The LLM provider used for scoring.
        provider: Arc<dyn LlmProvider>,
    },
}

/// Resolve a [`RerankerKind`] into a reranker instance.
pub fn build_reranker(kind: RerankerKind) -> Result<Arc<dyn Reranker>> {
    match kind {
        RerankerKind::CrossEncoder { scorer } => Ok(Arc::new(CrossEncoderReranker::new(scorer))),
        #[cfg(feature = "cohere")]
        RerankerKind::Remote { api_key } => Ok(Arc::new(RemoteReranker::new(api_key)?)),
        RerankerKind::Llm { provider } => Ok(Arc::new(LlmReranker::new(provider))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use super::*;
    use crate::document::PassageMetadata;

    fn passage(doc_id: &str, content: &str, score: f32) -> Passage {
        Passage {
            content: content.to_string(),
            score,
            metadata: PassageMetadata { doc_id: doc_id.to_string(), ..Default::default() },
        }
    }

    /// Scores pairs from a fixed table keyed by passage text.
    struct TableScorer {
        scores: Vec<(&'static str, f32)>,
        calls: AtomicUsize,
    }

    impl PairScorer for TableScorer {
        fn score_pairs(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(texts
                .iter()
                .map(|text| {
                    self.scores
                        .iter()
                        .find(|(t, _)| t == text)
                        .map(|(_, s)| *s)
                        .unwrap_or_default()
                })
                .collect())
        }
    }

    /// Replies with a fixed response and counts invocations.
    struct FixedLlm {
        response: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for FixedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn empty_input_skips_the_model() {
        let scorer = Arc::new(TableScorer { scores: vec![], calls: AtomicUsize::new(0) });
        let reranker = CrossEncoderReranker::new(Arc::clone(&scorer) as Arc<dyn PairScorer>);

        let result = reranker.rerank("query", Vec::new(), 5).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(scorer.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cross_encoder_orders_and_truncates() {
        let scorer = Arc::new(TableScorer {
            scores: vec![("doc a", 0.9), ("doc b", 0.5), ("doc c", 0.7)],
            calls: AtomicUsize::new(0),
        });
        let reranker = CrossEncoderReranker::new(scorer);

        let passages =
            vec![passage("A", "doc a", 0.1), passage("B", "doc b", 0.2), passage("C", "doc c", 0.3)];
        let result = reranker.rerank("query", passages, 2).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].metadata.doc_id, "A");
        assert_eq!(result[0].score, 0.9);
        assert_eq!(result[1].metadata.doc_id, "C");
        assert_eq!(result[1].score, 0.7);
    }

    #[tokio::test]
    async fn cross_encoder_preserves_original_score() {
        let scorer = Arc::new(TableScorer {
            scores: vec![("doc a", 0.9)],
            calls: AtomicUsize::new(0),
        });
        let reranker = CrossEncoderReranker::new(scorer);

        let result = reranker.rerank("query", vec![passage("A", "doc a", 0.42)], 1).await.unwrap();
        assert_eq!(result[0].metadata.original_score, Some(0.42));
        assert_eq!(result[0].metadata.rerank_score, Some(0.9));
    }

    #[tokio::test]
    async fn llm_parse_failure_falls_back_to_neutral_score() {
        let llm = Arc::new(FixedLlm {
            response: "not a number".to_string(),
            calls: AtomicUsize::new(0),
        });
        let reranker = LlmReranker::new(llm);

        let result = reranker.rerank("query", vec![passage("A", "text", 0.8)], 5).await.unwrap();
        assert_eq!(result[0].metadata.rerank_score, Some(0.5));
        assert_eq!(result[0].score, 0.5);
    }

    #[tokio::test]
    async fn llm_scores_are_normalized_and_clamped() {
        let llm = Arc::new(FixedLlm { response: "15".to_string(), calls: AtomicUsize::new(0) });
        let reranker = LlmReranker::new(llm);

        let result = reranker.rerank("query", vec![passage("A", "text", 0.1)], 5).await.unwrap();
        assert_eq!(result[0].score, 1.0);
    }

    #[tokio::test]
    async fn llm_reranker_makes_one_call_per_passage() {
        let llm = Arc::new(FixedLlm { response: "7".to_string(), calls: AtomicUsize::new(0) });
        let reranker = LlmReranker::new(Arc::clone(&llm) as Arc<dyn LlmProvider>);

        let passages = vec![passage("A", "a", 0.1), passage("B", "b", 0.2), passage("C", "c", 0.3)];
        reranker.rerank("query", passages, 5).await.unwrap();
        assert_eq!(llm.calls.load(AtomicOrdering::SeqCst), 3);
    }

    #[tokio::test]
    async fn llm_empty_input_makes_no_calls() {
        let llm = Arc::new(FixedLlm { response: "7".to_string(), calls: AtomicUsize::new(0) });
        let reranker = LlmReranker::new(Arc::clone(&llm) as Arc<dyn LlmProvider>);

        let result = reranker.rerank("query", Vec::new(), 5).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(llm.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn parse_score_handles_whitespace_and_clamps() {
        assert_eq!(LlmReranker::parse_score(" 7 "), 7.0);
        assert_eq!(LlmReranker::parse_score("-3"), 0.0);
        assert_eq!(LlmReranker::parse_score("12"), 10.0);
        assert_eq!(LlmReranker::parse_score("n/a"), 5.0);
    }

    #[tokio::test]
    async fn ties_preserve_prior_order() {
        let scorer = Arc::new(TableScorer {
            scores: vec![("first", 0.5), ("second", 0.5), ("third", 0.5)],
            calls: AtomicUsize::new(0),
        });
        let reranker = CrossEncoderReranker::new(scorer);

        let passages =
            vec![passage("1", "first", 0.9), passage("2", "second", 0.8), passage("3", "third", 0.7)];
        let result = reranker.rerank("query", passages, 3).await.unwrap();

        assert_eq!(result[0].metadata.doc_id, "1");
        assert_eq!(result[1].metadata.doc_id, "2");
        assert_eq!(result[2].metadata.doc_id, "3");
    }
}
