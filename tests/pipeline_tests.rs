//! End-to-end tests for the retrieval pipeline over the in-memory backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ragpipe::{
    Chunk, Document, DocumentStore, EmbeddingProvider, InMemoryBackend, RagConfig, RagError,
    RagPipeline, Result, RetrieverKind, TextChunker,
};
use serde_json::Value;

/// Deterministic embedding: hash each term into a bucket and L2-normalize
/// the counts, so texts sharing words land close in cosine space.
struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    fn new() -> Self {
        Self { dimensions: 64 }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        for term in text.to_lowercase().split_whitespace() {
            let mut hash = 0usize;
            for byte in term.bytes() {
                hash = hash.wrapping_mul(31).wrapping_add(byte as usize);
            }
            vector[hash % self.dimensions] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn make_store() -> Arc<DocumentStore> {
    Arc::new(DocumentStore::new(Arc::new(InMemoryBackend::new()), Arc::new(HashEmbedder::new()), None))
}

fn make_pipeline(store: Arc<DocumentStore>, kind: RetrieverKind) -> RagPipeline {
    RagPipeline::builder()
        .config(RagConfig::default())
        .store(store)
        .chunker(Arc::new(TextChunker::new(200, 40)))
        .retriever_kind(kind)
        .build()
        .unwrap()
}

#[tokio::test]
async fn operations_before_initialize_fail() {
    let store = make_store();

    let err = store.search("anything", 5, None, None).await.unwrap_err();
    assert!(matches!(err, RagError::NotInitialized));

    let err = store.delete("doc-1").await.unwrap_err();
    assert!(matches!(err, RagError::NotInitialized));

    let err = store.count().await.unwrap_err();
    assert!(matches!(err, RagError::NotInitialized));

    assert!(!store.health().await);
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let store = make_store();
    store.initialize().await.unwrap();
    store.initialize().await.unwrap();
    assert!(store.health().await);
}

#[tokio::test]
async fn add_empty_chunks_returns_empty_ids() {
    let store = make_store();
    store.initialize().await.unwrap();

    let ids = store.add(&[], "doc-1", &HashMap::new()).await.unwrap();
    assert!(ids.is_empty());
}

#[tokio::test]
async fn round_trip_ingest_search_delete() {
    let store = make_store();
    let pipeline = make_pipeline(Arc::clone(&store), RetrieverKind::Semantic);
    pipeline.initialize().await.unwrap();

    let document = Document::new(
        "doc-zebra",
        "Zebra migration happens across the savanna every year. \
         Large herds travel north following the seasonal rains.",
    )
    .with_filename("zebra.txt")
    .with_content_type("text/plain");

    let ids = pipeline.ingest(&document).await.unwrap();
    assert!(!ids.is_empty());

    let passages = pipeline.retrieve("zebra migration savanna").await.unwrap();
    assert!(!passages.is_empty());
    assert_eq!(passages[0].metadata.doc_id, "doc-zebra");
    assert_eq!(passages[0].metadata.filename.as_deref(), Some("zebra.txt"));

    let removed = pipeline.delete("doc-zebra").await.unwrap();
    assert_eq!(removed, ids.len());

    let passages = pipeline.retrieve("zebra migration savanna").await.unwrap();
    assert!(passages.iter().all(|p| p.metadata.doc_id != "doc-zebra"));

    // Deleting again is not an error, just a zero count.
    assert_eq!(pipeline.delete("doc-zebra").await.unwrap(), 0);
}

#[tokio::test]
async fn filtered_search_restricts_by_doc_id() {
    let store = make_store();
    store.initialize().await.unwrap();

    let chunk = |text: &str| Chunk { text: text.to_string(), index: 0, total_chunks: 1 };
    store.add(&[chunk("shared topic words here")], "doc-a", &HashMap::new()).await.unwrap();
    store.add(&[chunk("shared topic words there")], "doc-b", &HashMap::new()).await.unwrap();

    let mut filter = HashMap::new();
    filter.insert("doc_id".to_string(), Value::String("doc-b".to_string()));
    let passages = store.search("shared topic words", 10, Some(&filter), None).await.unwrap();

    assert!(!passages.is_empty());
    assert!(passages.iter().all(|p| p.metadata.doc_id == "doc-b"));
}

#[tokio::test]
async fn list_groups_by_document_and_paginates() {
    let store = make_store();
    store.initialize().await.unwrap();

    for (doc_id, text) in [
        ("doc-one", "first document body text"),
        ("doc-two", "second document body text"),
        ("doc-three", "third document body text"),
    ] {
        let chunks = vec![
            Chunk { text: text.to_string(), index: 0, total_chunks: 2 },
            Chunk { text: format!("{text} continued"), index: 1, total_chunks: 2 },
        ];
        let mut extra = HashMap::new();
        extra.insert("filename".to_string(), Value::String(format!("{doc_id}.txt")));
        store.add(&chunks, doc_id, &extra).await.unwrap();
    }

    assert_eq!(store.count().await.unwrap(), 3);

    let all = store.list(10, 0).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, "doc-one");
    assert_eq!(all[0].chunk_count, 2);
    assert_eq!(all[0].filename, "doc-one.txt");

    let page = store.list(1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "doc-two");
}

#[tokio::test]
async fn extra_metadata_survives_the_round_trip() {
    let store = make_store();
    store.initialize().await.unwrap();

    let chunks = vec![Chunk { text: "tagged content body".to_string(), index: 0, total_chunks: 1 }];
    let mut extra = HashMap::new();
    extra.insert("source".to_string(), Value::String("upload".to_string()));
    store.add(&chunks, "doc-tagged", &extra).await.unwrap();

    let passages = store.search("tagged content body", 5, None, None).await.unwrap();
    assert_eq!(
        passages[0].metadata.extra.get("source"),
        Some(&Value::String("upload".to_string()))
    );
}

/// Embeds from a fixed table so semantic scores can be pinned per text.
struct TableEmbedder {
    table: Vec<(&'static str, Vec<f32>)>,
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.table
            .iter()
            .find(|(t, _)| *t == text)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| RagError::EmbeddingError {
                provider: "table".to_string(),
                message: format!("unknown text: {text}"),
            })
    }

    fn dimensions(&self) -> usize {
        3
    }
}

/// A keyword weight large enough makes the lexically-matching passage
/// outrank the semantically-closer one — the blend shifts ranking, it does
/// not just re-label scores.
#[tokio::test]
async fn hybrid_weighting_can_overturn_semantic_order() {
    let query = "needle term";
    let lexical_match = "the needle term appears here";
    let semantic_match = "unrelated words only";

    let embedder = TableEmbedder {
        table: vec![
            (query, vec![1.0, 0.0, 0.0]),
            // Lexical match: cosine 0.6 against the query.
            (lexical_match, vec![0.6, 0.8, 0.0]),
            // Semantic match: cosine ~0.95 against the query.
            (semantic_match, vec![0.95, 0.312, 0.0]),
        ],
    };

    let store = Arc::new(DocumentStore::new(
        Arc::new(InMemoryBackend::new()),
        Arc::new(embedder),
        None,
    ));
    store.initialize().await.unwrap();

    let chunk = |text: &str| Chunk { text: text.to_string(), index: 0, total_chunks: 1 };
    store.add(&[chunk(lexical_match)], "doc-x", &HashMap::new()).await.unwrap();
    store.add(&[chunk(semantic_match)], "doc-y", &HashMap::new()).await.unwrap();

    // Pure semantic weighting: the semantically-closer passage wins.
    let semantic_only = ragpipe::HybridRetriever::new(Arc::clone(&store), 2).with_weights(1.0, 0.0);
    let results = ragpipe::Retriever::retrieve(&semantic_only, query).await.unwrap();
    assert_eq!(results[0].metadata.doc_id, "doc-y");

    // Keyword weight in play: the verbatim match overtakes it.
    let blended = ragpipe::HybridRetriever::new(Arc::clone(&store), 2).with_weights(0.7, 0.3);
    let results = ragpipe::Retriever::retrieve(&blended, query).await.unwrap();
    assert_eq!(results[0].metadata.doc_id, "doc-x");
}

#[tokio::test]
async fn advanced_pipeline_reranks_and_compresses() {
    use ragpipe::{CrossEncoderReranker, ExtractiveCompressor, PairScorer};

    /// Scores passages by how early the word "relevant" appears.
    struct KeywordScorer;

    impl PairScorer for KeywordScorer {
        fn score_pairs(&self, _query: &str, texts: &[String]) -> Result<Vec<f32>> {
            Ok(texts
                .iter()
                .map(|text| if text.contains("relevant") { 1.0 } else { 0.1 })
                .collect())
        }
    }

    let store = make_store();
    store.initialize().await.unwrap();

    let chunk = |text: &str| Chunk { text: text.to_string(), index: 0, total_chunks: 1 };
    store
        .add(&[chunk("filler passage with common words about things")], "doc-filler", &HashMap::new())
        .await
        .unwrap();
    store
        .add(
            &[chunk(
                "This passage is relevant to the query. It covers common words about things. \
                 It also rambles on with extra sentences for padding purposes here.",
            )],
            "doc-relevant",
            &HashMap::new(),
        )
        .await
        .unwrap();

    let pipeline = RagPipeline::builder()
        .config(RagConfig::builder().top_k(1).initial_k(10).build().unwrap())
        .store(Arc::clone(&store))
        .chunker(Arc::new(TextChunker::new(500, 50)))
        .retriever_kind(RetrieverKind::Advanced)
        .reranker(Arc::new(CrossEncoderReranker::new(Arc::new(KeywordScorer))))
        .compressor(Arc::new(ExtractiveCompressor::new().with_sentence_bounds(2, 2)))
        .build()
        .unwrap();

    let passages = pipeline.retrieve("common words about things").await.unwrap();

    assert_eq!(passages.len(), 1);
    assert_eq!(passages[0].metadata.doc_id, "doc-relevant");
    assert_eq!(passages[0].metadata.rerank_score, Some(1.0));
    assert!(passages[0].metadata.original_score.is_some());
    assert!(passages[0].metadata.compressed);
    assert!(passages[0].content.len() <= passages[0].metadata.original_length.unwrap());
}

#[tokio::test]
async fn contextual_retrieval_uses_conversation_turns() {
    use ragpipe::{ContextualRetriever, SemanticRetriever};

    let store = make_store();
    store.initialize().await.unwrap();

    let chunk = |text: &str| Chunk { text: text.to_string(), index: 0, total_chunks: 1 };
    store.add(&[chunk("gearbox assembly manual steps")], "doc-gearbox", &HashMap::new()).await.unwrap();

    let retriever =
        ContextualRetriever::new(Arc::new(SemanticRetriever::new(Arc::clone(&store), 5)));
    retriever.add_context("we were discussing the gearbox assembly manual");

    let passages = ragpipe::Retriever::retrieve(&retriever, "what are the steps").await.unwrap();
    assert!(!passages.is_empty());
    assert_eq!(passages[0].metadata.doc_id, "doc-gearbox");
}
