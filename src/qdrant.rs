//! Qdrant vector backend.
//!
//! Provides [`QdrantBackend`], a [`VectorBackend`] over the
//! [qdrant-client](https://docs.rs/qdrant-client) gRPC API. Only available
//! when the `qdrant` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragpipe::qdrant::QdrantBackend;
//!
//! let backend = QdrantBackend::new("http://localhost:6334")?;
//! backend.create_collection("documents", 1536).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::Value;
use tracing::debug;

use crate::document::{EmbeddingRecord, RecordPayload};
use crate::error::{RagError, Result};
use crate::vectorstore::{ScoredRecord, VectorBackend};

/// A [`VectorBackend`] backed by [Qdrant](https://qdrant.tech/).
///
/// Collections use cosine distance. Record payloads are stored flat so the
/// well-known fields stay filterable through Qdrant field conditions.
pub struct QdrantBackend {
    client: Qdrant,
}

impl QdrantBackend {
    /// Create a new backend connecting to the given URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Create a new backend with the default URL (`http://localhost:6334`).
    pub fn default_url() -> Result<Self> {
        Self::new("http://localhost:6334")
    }

    /// Create a new backend from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::VectorStoreError { backend: "qdrant".to_string(), message: e.to_string() }
    }

    /// Build Qdrant match conditions from a payload filter (logical AND).
    fn build_filter(filter: &HashMap<String, Value>) -> Filter {
        let conditions: Vec<Condition> = filter
            .iter()
            .filter_map(|(key, value)| match value {
                Value::String(s) => Some(Condition::matches(key.clone(), s.clone())),
                Value::Number(n) => n.as_i64().map(|i| Condition::matches(key.clone(), i)),
                Value::Bool(b) => Some(Condition::matches(key.clone(), *b)),
                _ => None,
            })
            .collect();
        Filter::must(conditions)
    }

    /// Convert a record payload into a flat Qdrant payload.
    fn to_payload(payload: &RecordPayload) -> Payload {
        let mut map = serde_json::Map::new();
        map.insert("doc_id".to_string(), Value::String(payload.doc_id.clone()));
        map.insert("content".to_string(), Value::String(payload.content.clone()));
        map.insert("chunk_index".to_string(), Value::from(payload.chunk_index as u64));
        if let Some(filename) = &payload.filename {
            map.insert("filename".to_string(), Value::String(filename.clone()));
        }
        if let Some(content_type) = &payload.content_type {
            map.insert("content_type".to_string(), Value::String(content_type.clone()));
        }
        for (key, value) in &payload.extra {
            map.insert(key.clone(), value.clone());
        }
        Payload::try_from(Value::Object(map)).unwrap_or_default()
    }

    /// Rebuild a record payload from a Qdrant payload map.
    fn from_payload(mut payload: HashMap<String, QdrantValue>) -> RecordPayload {
        let doc_id = payload.remove("doc_id").and_then(|v| extract_string(&v)).unwrap_or_default();
        let content =
            payload.remove("content").and_then(|v| extract_string(&v)).unwrap_or_default();
        let chunk_index = payload
            .remove("chunk_index")
            .and_then(|v| extract_integer(&v))
            .unwrap_or_default() as usize;
        let filename = payload.remove("filename").and_then(|v| extract_string(&v));
        let content_type = payload.remove("content_type").and_then(|v| extract_string(&v));

        let extra: HashMap<String, Value> = payload
            .into_iter()
            .filter_map(|(key, value)| to_json_value(&value).map(|v| (key, v)))
            .collect();

        RecordPayload { doc_id, content, chunk_index, filename, content_type, extra }
    }

    /// Scroll all point ids matching a doc id filter, page by page.
    async fn scroll_ids_by_doc(&self, collection: &str, doc_id: &str) -> Result<Vec<PointId>> {
        let filter = Filter::must([Condition::matches("doc_id", doc_id.to_string())]);
        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .filter(filter.clone())
                .limit(1000)
                .with_payload(false)
                .with_vectors(false);
            if let Some(offset) = offset.take() {
                builder = builder.offset(offset);
            }

            let response = self.client.scroll(builder).await.map_err(Self::map_err)?;
            ids.extend(response.result.into_iter().filter_map(|point| point.id));

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }
}

fn extract_string(value: &QdrantValue) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn extract_integer(value: &QdrantValue) -> Option<i64> {
    match &value.kind {
        Some(Kind::IntegerValue(i)) => Some(*i),
        _ => None,
    }
}

fn to_json_value(value: &QdrantValue) -> Option<Value> {
    match value.kind.as_ref()? {
        Kind::StringValue(s) => Some(Value::String(s.clone())),
        Kind::IntegerValue(i) => Some(Value::from(*i)),
        Kind::DoubleValue(f) => serde_json::Number::from_f64(*f).map(Value::Number),
        Kind::BoolValue(b) => Some(Value::Bool(*b)),
        _ => None,
    }
}

fn point_id_to_string(id: &PointId) -> String {
    match &id.point_id_options {
        Some(PointIdOptions::Uuid(s)) => s.clone(),
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let collections = self.client.list_collections().await.map_err(Self::map_err)?;
        let exists = collections.collections.iter().any(|c| c.name == name);
        if exists {
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[EmbeddingRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = records
            .iter()
            .map(|record| {
                PointStruct::new(
                    record.id.clone(),
                    record.vector.clone(),
                    Self::to_payload(&record.payload),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = records.len(), "upserted records to qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&HashMap<String, Value>>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredRecord>> {
        let mut builder =
            SearchPointsBuilder::new(collection, vector.to_vec(), top_k as u64).with_payload(true);
        if let Some(filter) = filter {
            builder = builder.filter(Self::build_filter(filter));
        }
        if let Some(threshold) = score_threshold {
            builder = builder.score_threshold(threshold);
        }

        let response = self.client.search_points(builder).await.map_err(Self::map_err)?;

        Ok(response
            .result
            .into_iter()
            .map(|scored| ScoredRecord {
                id: scored.id.as_ref().map(point_id_to_string).unwrap_or_default(),
                score: scored.score,
                payload: Self::from_payload(scored.payload),
            })
            .collect())
    }

    async fn delete_by_doc(&self, collection: &str, doc_id: &str) -> Result<usize> {
        let ids = self.scroll_ids_by_doc(collection, doc_id).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let count = ids.len();
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection, doc_id, count, "deleted points from qdrant");
        Ok(count)
    }

    async fn list_payloads(&self, collection: &str) -> Result<Vec<RecordPayload>> {
        let mut payloads = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .limit(1000)
                .with_payload(true)
                .with_vectors(false);
            if let Some(offset) = offset.take() {
                builder = builder.offset(offset);
            }

            let response = self.client.scroll(builder).await.map_err(Self::map_err)?;
            payloads
                .extend(response.result.into_iter().map(|point| Self::from_payload(point.payload)));

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(payloads)
    }

    async fn healthy(&self) -> bool {
        self.client.health_check().await.is_ok()
    }
}
