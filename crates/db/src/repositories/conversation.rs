use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use concierge_core::domain::agent::AgentId;
use concierge_core::domain::conversation::{
    Conversation, ConversationId, ConversationResult, ConversationStatus, Message, MessageId,
    SenderRole, ToolCallRecord,
};

use super::agent::parse_uuid;
use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const CONVERSATION_COLUMNS: &str = "id, agent_id, customer_external_id, customer_display_name,
    status, result, message_count, metadata_json, created_at, last_message_at";

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_or_create(
        &self,
        agent_id: AgentId,
        customer_external_id: &str,
    ) -> Result<Conversation, RepositoryError> {
        // ON CONFLICT DO NOTHING makes concurrent first-contact races safe;
        // the follow-up select always observes exactly one row.
        let fresh = Conversation::open(agent_id, customer_external_id);
        sqlx::query(
            "INSERT INTO conversation (
                id, agent_id, customer_external_id, status, result,
                message_count, metadata_json, created_at
             ) VALUES (?, ?, ?, ?, ?, 0, '{}', ?)
             ON CONFLICT (agent_id, customer_external_id) DO NOTHING",
        )
        .bind(fresh.id.0.to_string())
        .bind(agent_id.0.to_string())
        .bind(customer_external_id)
        .bind(fresh.status.as_str())
        .bind(fresh.result.as_str())
        .bind(fresh.created_at)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversation
             WHERE agent_id = ? AND customer_external_id = ?"
        ))
        .bind(agent_id.0.to_string())
        .bind(customer_external_id)
        .fetch_one(&self.pool)
        .await?;

        conversation_from_row(row)
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE conversation SET
                customer_display_name = ?, status = ?, result = ?,
                metadata_json = ?, last_message_at = ?
             WHERE id = ?",
        )
        .bind(&conversation.customer_display_name)
        .bind(conversation.status.as_str())
        .bind(conversation.result.as_str())
        .bind(conversation.metadata.to_string())
        .bind(conversation.last_message_at)
        .bind(conversation.id.0.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_message(&self, message: &Message) -> Result<(), RepositoryError> {
        let tool_calls_json = message
            .tool_calls
            .as_ref()
            .map(|calls| serde_json::to_string(calls))
            .transpose()
            .map_err(|e| RepositoryError::decode(e.to_string()))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO message (
                id, conversation_id, sender_role, content, tool_calls_json, created_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id.0.to_string())
        .bind(message.conversation_id.0.to_string())
        .bind(message.sender.as_str())
        .bind(&message.content)
        .bind(tool_calls_json)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE conversation SET message_count = message_count + 1, last_message_at = ?
             WHERE id = ?",
        )
        .bind(message.created_at)
        .bind(message.conversation_id.0.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        conversation_id: ConversationId,
        limit: i64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, sender_role, content, tool_calls_json, created_at
             FROM message
             WHERE conversation_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(conversation_id.0.to_string())
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .into_iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}

fn conversation_from_row(row: SqliteRow) -> Result<Conversation, RepositoryError> {
    let id: String = row.try_get("id")?;
    let agent_id: String = row.try_get("agent_id")?;
    let status: String = row.try_get("status")?;
    let result: String = row.try_get("result")?;
    let metadata_json: String = row.try_get("metadata_json")?;

    Ok(Conversation {
        id: ConversationId(parse_uuid(&id)?),
        agent_id: AgentId(parse_uuid(&agent_id)?),
        customer_external_id: row.try_get("customer_external_id")?,
        customer_display_name: row.try_get("customer_display_name")?,
        status: ConversationStatus::parse(&status)
            .ok_or_else(|| RepositoryError::decode(format!("unknown status `{status}`")))?,
        result: ConversationResult::parse(&result)
            .ok_or_else(|| RepositoryError::decode(format!("unknown result `{result}`")))?,
        message_count: row.try_get("message_count")?,
        metadata: serde_json::from_str(&metadata_json)
            .map_err(|e| RepositoryError::decode(format!("metadata_json: {e}")))?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        last_message_at: row.try_get::<Option<DateTime<Utc>>, _>("last_message_at")?,
    })
}

fn message_from_row(row: SqliteRow) -> Result<Message, RepositoryError> {
    let id: String = row.try_get("id")?;
    let conversation_id: String = row.try_get("conversation_id")?;
    let sender_role: String = row.try_get("sender_role")?;
    let tool_calls_json: Option<String> = row.try_get("tool_calls_json")?;

    let tool_calls = tool_calls_json
        .map(|raw| serde_json::from_str::<Vec<ToolCallRecord>>(&raw))
        .transpose()
        .map_err(|e| RepositoryError::decode(format!("tool_calls_json: {e}")))?;

    Ok(Message {
        id: MessageId(parse_uuid(&id)?),
        conversation_id: ConversationId(parse_uuid(&conversation_id)?),
        sender: SenderRole::parse(&sender_role)
            .ok_or_else(|| RepositoryError::decode(format!("unknown role `{sender_role}`")))?,
        content: row.try_get("content")?,
        tool_calls,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
