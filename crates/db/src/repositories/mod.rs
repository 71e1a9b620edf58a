use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use concierge_core::booking::BookedSlot;
use concierge_core::domain::agent::{Agent, AgentId};
use concierge_core::domain::appointment::{Appointment, AppointmentId};
use concierge_core::domain::compliment::Compliment;
use concierge_core::domain::conversation::{Conversation, ConversationId, Message};
use concierge_core::domain::document::{KnowledgeDocument, KnowledgeDocumentId};

pub mod agent;
pub mod appointment;
pub mod compliment;
pub mod conversation;
pub mod document;
pub mod memory;

pub use agent::SqlAgentRepository;
pub use appointment::SqlAppointmentRepository;
pub use compliment::SqlComplimentRepository;
pub use conversation::SqlConversationRepository;
pub use document::SqlDocumentRepository;
pub use memory::{
    InMemoryAgentRepository, InMemoryAppointmentRepository, InMemoryComplimentRepository,
    InMemoryConversationRepository, InMemoryDocumentRepository,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn insert(&self, agent: &Agent) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError>;
    async fn find_active_by_routing_key(
        &self,
        routing_key: &str,
    ) -> Result<Option<Agent>, RepositoryError>;
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Returns the existing conversation for (agent, customer) or creates
    /// an active one. The unique (agent_id, customer_external_id) constraint
    /// guarantees a single thread per pair under concurrency.
    async fn find_or_create(
        &self,
        agent_id: AgentId,
        customer_external_id: &str,
    ) -> Result<Conversation, RepositoryError>;

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError>;

    /// Appends a message and bumps the owning conversation's counters in the
    /// same transaction, keeping message_count equal to COUNT(messages).
    async fn append_message(&self, message: &Message) -> Result<(), RepositoryError>;

    /// Most recent `limit` messages, returned oldest-first.
    async fn recent_messages(
        &self,
        conversation_id: ConversationId,
        limit: i64,
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Non-cancelled intervals for an agent within [from, to], for the
    /// availability engine.
    async fn booked_slots(
        &self,
        agent_id: AgentId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BookedSlot>, RepositoryError>;

    /// Creates the appointment only if no non-cancelled appointment for the
    /// same agent overlaps it. Check and insert happen in one statement so
    /// two racing creates cannot both succeed.
    async fn create_if_free(&self, appointment: &Appointment) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &AppointmentId)
        -> Result<Option<Appointment>, RepositoryError>;

    /// Persists a status transition (cancel/complete/no-show).
    async fn update_status(&self, appointment: &Appointment) -> Result<(), RepositoryError>;

    async fn list_for_customer(
        &self,
        agent_id: AgentId,
        customer_external_id: &str,
    ) -> Result<Vec<Appointment>, RepositoryError>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn insert(&self, document: &KnowledgeDocument) -> Result<(), RepositoryError>;
    async fn find_by_id(
        &self,
        id: &KnowledgeDocumentId,
    ) -> Result<Option<KnowledgeDocument>, RepositoryError>;
    async fn mark_ready(
        &self,
        id: &KnowledgeDocumentId,
        page_count: i64,
        chunk_count: i64,
    ) -> Result<(), RepositoryError>;
    async fn mark_error(
        &self,
        id: &KnowledgeDocumentId,
        detail: &str,
    ) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &KnowledgeDocumentId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ComplimentRepository: Send + Sync {
    async fn insert(&self, compliment: &Compliment) -> Result<(), RepositoryError>;
}
