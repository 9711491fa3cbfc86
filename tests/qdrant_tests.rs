//! Integration tests for the Qdrant backend. These require a running
//! Qdrant instance at localhost:6334 and are ignored by default:
//!
//! ```sh
//! cargo test --features qdrant -- --ignored
//! ```

#![cfg(feature = "qdrant")]

use std::collections::HashMap;

use ragpipe::document::{EmbeddingRecord, RecordPayload};
use ragpipe::qdrant::QdrantBackend;
use ragpipe::vectorstore::VectorBackend;
use serde_json::Value;

const DIM: usize = 4;

fn record(id: &str, doc_id: &str, chunk_index: usize, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        id: id.to_string(),
        vector,
        payload: RecordPayload {
            doc_id: doc_id.to_string(),
            content: format!("content of {id}"),
            chunk_index,
            ..Default::default()
        },
    }
}

#[tokio::test]
#[ignore] // Integration test - requires Qdrant
async fn round_trip_against_live_qdrant() {
    let backend = QdrantBackend::default_url().unwrap();
    let collection = "ragpipe_test_round_trip";

    backend.create_collection(collection, DIM).await.unwrap();
    // Creating again must be a no-op, not an error.
    backend.create_collection(collection, DIM).await.unwrap();

    let records = vec![
        record("11111111-1111-1111-1111-111111111111", "doc-a", 0, vec![1.0, 0.0, 0.0, 0.0]),
        record("22222222-2222-2222-2222-222222222222", "doc-a", 1, vec![0.9, 0.1, 0.0, 0.0]),
        record("33333333-3333-3333-3333-333333333333", "doc-b", 0, vec![0.0, 1.0, 0.0, 0.0]),
    ];
    backend.upsert(collection, &records).await.unwrap();

    let results =
        backend.search(collection, &[1.0, 0.0, 0.0, 0.0], 10, None, None).await.unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].payload.doc_id, "doc-a");

    let mut filter = HashMap::new();
    filter.insert("doc_id".to_string(), Value::String("doc-b".to_string()));
    let filtered = backend
        .search(collection, &[1.0, 0.0, 0.0, 0.0], 10, Some(&filter), None)
        .await
        .unwrap();
    assert!(filtered.iter().all(|r| r.payload.doc_id == "doc-b"));

    assert_eq!(backend.delete_by_doc(collection, "doc-a").await.unwrap(), 2);
    assert_eq!(backend.delete_by_doc(collection, "doc-a").await.unwrap(), 0);

    let payloads = backend.list_payloads(collection).await.unwrap();
    assert!(payloads.iter().all(|p| p.doc_id == "doc-b"));

    assert!(backend.healthy().await);
}
