use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::agent::AgentId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Resolved,
    Escalated,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "resolved" => Some(Self::Resolved),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }
}

/// Tag derived from the last successful side-effecting tool of a turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationResult {
    #[default]
    None,
    AppointmentCreated,
    EmailSent,
    Compliment,
}

impl ConversationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::AppointmentCreated => "appointment_created",
            Self::EmailSent => "email_sent",
            Self::Compliment => "compliment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "appointment_created" => Some(Self::AppointmentCreated),
            "email_sent" => Some(Self::EmailSent),
            "compliment" => Some(Self::Compliment),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Customer,
    Assistant,
    System,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "customer" => Some(Self::Customer),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Write-once record of one executed tool call within an assistant message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub arguments: Value,
    pub result_summary: String,
}

/// Append-only entry in a conversation. Immutable once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: SenderRole,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn customer(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            sender: SenderRole::Customer,
            content: content.into(),
            tool_calls: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(
        conversation_id: ConversationId,
        content: impl Into<String>,
        tool_calls: Option<Vec<ToolCallRecord>>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            sender: SenderRole::Assistant,
            content: content.into(),
            tool_calls,
            created_at: Utc::now(),
        }
    }
}

/// One customer thread per (agent, external customer identity).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub agent_id: AgentId,
    pub customer_external_id: String,
    pub customer_display_name: Option<String>,
    pub status: ConversationStatus,
    pub result: ConversationResult,
    pub message_count: i64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn open(agent_id: AgentId, customer_external_id: impl Into<String>) -> Self {
        Self {
            id: ConversationId::new(),
            agent_id,
            customer_external_id: customer_external_id.into(),
            customer_display_name: None,
            status: ConversationStatus::Active,
            result: ConversationResult::None,
            message_count: 0,
            metadata: Value::Object(Default::default()),
            created_at: Utc::now(),
            last_message_at: None,
        }
    }

    /// Merge semantic tags into `metadata.tags`, preserving order and
    /// dropping duplicates.
    pub fn add_tags<I>(&mut self, tags: I)
    where
        I: IntoIterator<Item = String>,
    {
        let object = match &mut self.metadata {
            Value::Object(map) => map,
            other => {
                *other = Value::Object(Default::default());
                match other {
                    Value::Object(map) => map,
                    _ => unreachable!(),
                }
            }
        };

        let existing = object
            .entry("tags")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = existing {
            for tag in tags {
                if !list.iter().any(|entry| entry.as_str() == Some(tag.as_str())) {
                    list.push(Value::String(tag));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Conversation, ConversationResult, ConversationStatus};
    use crate::domain::agent::AgentId;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ConversationStatus::Active,
            ConversationStatus::Resolved,
            ConversationStatus::Escalated,
        ] {
            assert_eq!(ConversationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ConversationStatus::parse("archived"), None);
    }

    #[test]
    fn result_tags_parse() {
        assert_eq!(
            ConversationResult::parse("appointment_created"),
            Some(ConversationResult::AppointmentCreated)
        );
        assert_eq!(ConversationResult::parse("unknown"), None);
    }

    #[test]
    fn tags_accumulate_without_duplicates() {
        let mut conversation = Conversation::open(AgentId::new(), "cust-1");
        conversation.add_tags(vec!["knowledge_used".to_string()]);
        conversation
            .add_tags(vec!["knowledge_used".to_string(), "availability_checked".to_string()]);

        let tags = conversation.metadata["tags"].as_array().expect("tags array");
        assert_eq!(tags.len(), 2);
    }
}
