use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnowledgeDocumentId(pub Uuid);

impl KnowledgeDocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for KnowledgeDocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for KnowledgeDocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(Self::Processing),
            "ready" => Some(Self::Ready),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One uploaded source file per agent. Transitions to ready/error exactly
/// once, driven by the ingestion pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: KnowledgeDocumentId,
    pub agent_id: AgentId,
    pub filename: String,
    pub byte_size: i64,
    pub page_count: i64,
    pub status: DocumentStatus,
    pub chunk_count: i64,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeDocument {
    pub fn uploaded(agent_id: AgentId, filename: impl Into<String>, byte_size: i64) -> Self {
        Self {
            id: KnowledgeDocumentId::new(),
            agent_id,
            filename: filename.into(),
            byte_size,
            page_count: 0,
            status: DocumentStatus::Processing,
            chunk_count: 0,
            error_detail: None,
            created_at: Utc::now(),
        }
    }
}

/// The unit of retrieval: a chunk of source text plus its embedding vector.
/// Lives only in the vector index, never in the relational store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: Uuid,
    pub document_id: KnowledgeDocumentId,
    pub text: String,
    pub section: String,
    pub page: i64,
    pub chunk_index: i64,
    pub embedding: Vec<f32>,
}
