//! In-memory repositories backing unit tests in downstream crates. Each one
//! mirrors the atomicity promises of its SQL counterpart with a mutex.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;

use concierge_core::booking::BookedSlot;
use concierge_core::domain::agent::{Agent, AgentId};
use concierge_core::domain::appointment::{Appointment, AppointmentId};
use concierge_core::domain::compliment::Compliment;
use concierge_core::domain::conversation::{Conversation, ConversationId, Message};
use concierge_core::domain::document::{DocumentStatus, KnowledgeDocument, KnowledgeDocumentId};

use super::{
    AgentRepository, AppointmentRepository, ComplimentRepository, ConversationRepository,
    DocumentRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryAgentRepository {
    agents: Mutex<Vec<Agent>>,
}

impl InMemoryAgentRepository {
    pub fn with_agent(agent: Agent) -> Self {
        Self { agents: Mutex::new(vec![agent]) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Agent>> {
        match self.agents.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait::async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn insert(&self, agent: &Agent) -> Result<(), RepositoryError> {
        self.lock().push(agent.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.lock().iter().find(|agent| agent.id == *id).cloned())
    }

    async fn find_active_by_routing_key(
        &self,
        routing_key: &str,
    ) -> Result<Option<Agent>, RepositoryError> {
        Ok(self
            .lock()
            .iter()
            .find(|agent| agent.routing_key == routing_key && agent.is_active)
            .cloned())
    }

    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        let mut agents = self.lock();
        if let Some(slot) = agents.iter_mut().find(|existing| existing.id == agent.id) {
            *slot = agent.clone();
        }
        Ok(())
    }
}

#[derive(Default)]
struct ConversationState {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    state: Mutex<ConversationState>,
}

impl InMemoryConversationRepository {
    fn lock(&self) -> std::sync::MutexGuard<'_, ConversationState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.lock().conversations.iter().find(|c| c.id == id).cloned()
    }

    pub fn message_count(&self, id: ConversationId) -> usize {
        self.lock().messages.iter().filter(|m| m.conversation_id == id).count()
    }
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_or_create(
        &self,
        agent_id: AgentId,
        customer_external_id: &str,
    ) -> Result<Conversation, RepositoryError> {
        let mut state = self.lock();
        if let Some(existing) = state
            .conversations
            .iter()
            .find(|c| c.agent_id == agent_id && c.customer_external_id == customer_external_id)
        {
            return Ok(existing.clone());
        }

        let fresh = Conversation::open(agent_id, customer_external_id);
        state.conversations.push(fresh.clone());
        Ok(fresh)
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if let Some(slot) =
            state.conversations.iter_mut().find(|existing| existing.id == conversation.id)
        {
            // Same column set as the SQL update; message_count is owned by
            // append_message.
            slot.customer_display_name = conversation.customer_display_name.clone();
            slot.status = conversation.status;
            slot.result = conversation.result.clone();
            slot.metadata = conversation.metadata.clone();
            slot.last_message_at = conversation.last_message_at;
        }
        Ok(())
    }

    async fn append_message(&self, message: &Message) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        state.messages.push(message.clone());
        if let Some(conversation) =
            state.conversations.iter_mut().find(|c| c.id == message.conversation_id)
        {
            conversation.message_count += 1;
            conversation.last_message_at = Some(message.created_at);
        }
        Ok(())
    }

    async fn recent_messages(
        &self,
        conversation_id: ConversationId,
        limit: i64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.lock();
        let mut matching: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        let limit = usize::try_from(limit).unwrap_or(0);
        if matching.len() > limit {
            matching.drain(..matching.len() - limit);
        }
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    appointments: Mutex<Vec<Appointment>>,
}

impl InMemoryAppointmentRepository {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Appointment>> {
        match self.appointments.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn all(&self) -> Vec<Appointment> {
        self.lock().clone()
    }

    pub fn seed(&self, appointment: Appointment) {
        self.lock().push(appointment);
    }
}

#[async_trait::async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn booked_slots(
        &self,
        agent_id: AgentId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BookedSlot>, RepositoryError> {
        let mut slots: Vec<BookedSlot> = self
            .lock()
            .iter()
            .filter(|appt| {
                appt.agent_id == Some(agent_id)
                    && appt.date >= from
                    && appt.date <= to
                    && appt.status != concierge_core::domain::appointment::AppointmentStatus::Cancelled
            })
            .map(|appt| BookedSlot {
                date: appt.date,
                start_minute: appt.start_minute,
                duration_minutes: appt.duration_minutes,
            })
            .collect();
        slots.sort_by_key(|slot| (slot.date, slot.start_minute));
        Ok(slots)
    }

    async fn create_if_free(&self, appointment: &Appointment) -> Result<(), RepositoryError> {
        // Check and insert under one lock, matching the SQL single-statement
        // guarantee.
        let mut appointments = self.lock();
        if appointments.iter().any(|existing| existing.conflicts_with(appointment)) {
            return Err(RepositoryError::Conflict(format!(
                "slot {} on {} is already booked",
                appointment.start_minute, appointment.date
            )));
        }
        appointments.push(appointment.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError> {
        Ok(self.lock().iter().find(|appt| appt.id == *id).cloned())
    }

    async fn update_status(&self, appointment: &Appointment) -> Result<(), RepositoryError> {
        let mut appointments = self.lock();
        if let Some(slot) = appointments.iter_mut().find(|existing| existing.id == appointment.id)
        {
            slot.status = appointment.status;
            slot.cancellation_reason = appointment.cancellation_reason.clone();
        }
        Ok(())
    }

    async fn list_for_customer(
        &self,
        agent_id: AgentId,
        customer_external_id: &str,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let mut matching: Vec<Appointment> = self
            .lock()
            .iter()
            .filter(|appt| {
                appt.agent_id == Some(agent_id)
                    && appt.customer_external_id == customer_external_id
            })
            .cloned()
            .collect();
        matching.sort_by_key(|appt| (appt.date, appt.start_minute));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryDocumentRepository {
    documents: Mutex<HashMap<KnowledgeDocumentId, KnowledgeDocument>>,
}

impl InMemoryDocumentRepository {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<KnowledgeDocumentId, KnowledgeDocument>> {
        match self.documents.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait::async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn insert(&self, document: &KnowledgeDocument) -> Result<(), RepositoryError> {
        self.lock().insert(document.id, document.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &KnowledgeDocumentId,
    ) -> Result<Option<KnowledgeDocument>, RepositoryError> {
        Ok(self.lock().get(id).cloned())
    }

    async fn mark_ready(
        &self,
        id: &KnowledgeDocumentId,
        page_count: i64,
        chunk_count: i64,
    ) -> Result<(), RepositoryError> {
        if let Some(document) = self.lock().get_mut(id) {
            document.status = DocumentStatus::Ready;
            document.page_count = page_count;
            document.chunk_count = chunk_count;
            document.error_detail = None;
        }
        Ok(())
    }

    async fn mark_error(
        &self,
        id: &KnowledgeDocumentId,
        detail: &str,
    ) -> Result<(), RepositoryError> {
        if let Some(document) = self.lock().get_mut(id) {
            document.status = DocumentStatus::Error;
            document.error_detail = Some(detail.to_string());
        }
        Ok(())
    }

    async fn delete(&self, id: &KnowledgeDocumentId) -> Result<(), RepositoryError> {
        self.lock().remove(id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryComplimentRepository {
    compliments: Mutex<Vec<Compliment>>,
}

impl InMemoryComplimentRepository {
    pub fn all(&self) -> Vec<Compliment> {
        match self.compliments.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait::async_trait]
impl ComplimentRepository for InMemoryComplimentRepository {
    async fn insert(&self, compliment: &Compliment) -> Result<(), RepositoryError> {
        match self.compliments.lock() {
            Ok(mut guard) => guard.push(compliment.clone()),
            Err(poisoned) => poisoned.into_inner().push(compliment.clone()),
        }
        Ok(())
    }
}
