//! Per-agent vector index. The production backend is Qdrant with one
//! collection per agent; an in-memory index backs tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeleteCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use thiserror::Error;

use concierge_core::domain::agent::AgentId;
use concierge_core::domain::document::{Fragment, KnowledgeDocumentId};

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("vector backend error: {0}")]
    Backend(String),
    #[error("payload encoding failed: {0}")]
    Payload(String),
}

impl From<qdrant_client::QdrantError> for VectorError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// One search hit with its similarity score and retrieval metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredFragment {
    pub text: String,
    pub section: String,
    pub page: i64,
    pub filename: String,
    pub document_id: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert fragments into the agent's collection, creating it on first
    /// use.
    async fn upsert(
        &self,
        agent_id: AgentId,
        filename: &str,
        fragments: &[Fragment],
    ) -> Result<(), VectorError>;

    async fn search(
        &self,
        agent_id: AgentId,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredFragment>, VectorError>;

    /// Remove exactly the fragments belonging to one document.
    async fn delete_by_document(
        &self,
        agent_id: AgentId,
        document_id: &KnowledgeDocumentId,
    ) -> Result<(), VectorError>;

    /// Drop the agent's whole collection.
    async fn delete_collection(&self, agent_id: AgentId) -> Result<(), VectorError>;
}

fn collection_name(agent_id: AgentId) -> String {
    format!("agent_{}", agent_id.0)
}

pub struct QdrantIndex {
    client: Qdrant,
    dimension: u64,
}

impl QdrantIndex {
    pub fn connect(url: &str, dimension: usize) -> Result<Self, VectorError> {
        let client = Qdrant::from_url(url).build()?;
        Ok(Self { client, dimension: dimension as u64 })
    }

    async fn ensure_collection(&self, name: &str) -> Result<(), VectorError> {
        if self.client.collection_exists(name).await? {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine)),
            )
            .await?;
        tracing::info!(event_name = "rag.vector.collection_created", collection = name);
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(
        &self,
        agent_id: AgentId,
        filename: &str,
        fragments: &[Fragment],
    ) -> Result<(), VectorError> {
        if fragments.is_empty() {
            return Ok(());
        }

        let name = collection_name(agent_id);
        self.ensure_collection(&name).await?;

        let mut points = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let payload = Payload::try_from(serde_json::json!({
                "chunk_text": fragment.text,
                "document_id": fragment.document_id.to_string(),
                "filename": filename,
                "section_title": fragment.section,
                "page_number": fragment.page,
                "chunk_index": fragment.chunk_index,
            }))
            .map_err(|e| VectorError::Payload(e.to_string()))?;

            points.push(PointStruct::new(
                fragment.id.to_string(),
                fragment.embedding.clone(),
                payload,
            ));
        }

        self.client.upsert_points(UpsertPointsBuilder::new(&name, points)).await?;
        tracing::info!(
            event_name = "rag.vector.upserted",
            collection = %name,
            count = fragments.len(),
        );
        Ok(())
    }

    async fn search(
        &self,
        agent_id: AgentId,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredFragment>, VectorError> {
        let name = collection_name(agent_id);
        if !self.client.collection_exists(&name).await? {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&name, query.to_vec(), top_k as u64).with_payload(true),
            )
            .await?;

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            let payload = serde_json::to_value(&point.payload)
                .map_err(|e| VectorError::Payload(e.to_string()))?;
            hits.push(ScoredFragment {
                text: string_field(&payload, "chunk_text"),
                section: string_field(&payload, "section_title"),
                page: payload.get("page_number").and_then(|v| v.as_i64()).unwrap_or(0),
                filename: string_field(&payload, "filename"),
                document_id: string_field(&payload, "document_id"),
                score: point.score,
            });
        }
        Ok(hits)
    }

    async fn delete_by_document(
        &self,
        agent_id: AgentId,
        document_id: &KnowledgeDocumentId,
    ) -> Result<(), VectorError> {
        let name = collection_name(agent_id);
        if !self.client.collection_exists(&name).await? {
            return Ok(());
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&name)
                    .points(Filter::must([Condition::matches(
                        "document_id",
                        document_id.to_string(),
                    )]))
                    .wait(true),
            )
            .await?;
        tracing::info!(
            event_name = "rag.vector.document_deleted",
            collection = %name,
            document_id = %document_id,
        );
        Ok(())
    }

    async fn delete_collection(&self, agent_id: AgentId) -> Result<(), VectorError> {
        let name = collection_name(agent_id);
        if self.client.collection_exists(&name).await? {
            self.client.delete_collection(DeleteCollectionBuilder::new(&name)).await?;
            tracing::info!(event_name = "rag.vector.collection_deleted", collection = %name);
        }
        Ok(())
    }
}

fn string_field(payload: &serde_json::Value, key: &str) -> String {
    payload.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

#[derive(Clone, Debug)]
struct StoredPoint {
    document_id: String,
    filename: String,
    text: String,
    section: String,
    page: i64,
    embedding: Vec<f32>,
}

/// Cosine-similarity index over plain vectors, for tests.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    collections: Mutex<HashMap<String, Vec<StoredPoint>>>,
}

impl InMemoryVectorIndex {
    pub fn fragment_count(&self, agent_id: AgentId) -> usize {
        self.lock().get(&collection_name(agent_id)).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<StoredPoint>>> {
        match self.collections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        agent_id: AgentId,
        filename: &str,
        fragments: &[Fragment],
    ) -> Result<(), VectorError> {
        let mut collections = self.lock();
        let points = collections.entry(collection_name(agent_id)).or_default();
        for fragment in fragments {
            points.push(StoredPoint {
                document_id: fragment.document_id.to_string(),
                filename: filename.to_string(),
                text: fragment.text.clone(),
                section: fragment.section.clone(),
                page: fragment.page,
                embedding: fragment.embedding.clone(),
            });
        }
        Ok(())
    }

    async fn search(
        &self,
        agent_id: AgentId,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredFragment>, VectorError> {
        let collections = self.lock();
        let Some(points) = collections.get(&collection_name(agent_id)) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<ScoredFragment> = points
            .iter()
            .map(|point| ScoredFragment {
                text: point.text.clone(),
                section: point.section.clone(),
                page: point.page,
                filename: point.filename.clone(),
                document_id: point.document_id.clone(),
                score: cosine_similarity(query, &point.embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_by_document(
        &self,
        agent_id: AgentId,
        document_id: &KnowledgeDocumentId,
    ) -> Result<(), VectorError> {
        let target = document_id.to_string();
        if let Some(points) = self.lock().get_mut(&collection_name(agent_id)) {
            points.retain(|point| point.document_id != target);
        }
        Ok(())
    }

    async fn delete_collection(&self, agent_id: AgentId) -> Result<(), VectorError> {
        self.lock().remove(&collection_name(agent_id));
        Ok(())
    }
}
