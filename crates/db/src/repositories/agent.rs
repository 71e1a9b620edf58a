use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use concierge_core::domain::agent::{Agent, AgentId, LlmSettings, PermissionSet};

use super::{AgentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAgentRepository {
    pool: DbPool,
}

impl SqlAgentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AgentRepository for SqlAgentRepository {
    async fn insert(&self, agent: &Agent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO agent (
                id, routing_key, name, system_context,
                permissions_json, llm_config_json, is_active, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(agent.id.0.to_string())
        .bind(&agent.routing_key)
        .bind(&agent.name)
        .bind(&agent.system_context)
        .bind(encode_json(&agent.permissions)?)
        .bind(encode_json(&agent.llm)?)
        .bind(agent.is_active)
        .bind(agent.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, routing_key, name, system_context,
                    permissions_json, llm_config_json, is_active, created_at
             FROM agent WHERE id = ?",
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(agent_from_row).transpose()
    }

    async fn find_active_by_routing_key(
        &self,
        routing_key: &str,
    ) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, routing_key, name, system_context,
                    permissions_json, llm_config_json, is_active, created_at
             FROM agent WHERE routing_key = ? AND is_active = 1",
        )
        .bind(routing_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(agent_from_row).transpose()
    }

    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE agent SET
                routing_key = ?, name = ?, system_context = ?,
                permissions_json = ?, llm_config_json = ?, is_active = ?
             WHERE id = ?",
        )
        .bind(&agent.routing_key)
        .bind(&agent.name)
        .bind(&agent.system_context)
        .bind(encode_json(&agent.permissions)?)
        .bind(encode_json(&agent.llm)?)
        .bind(agent.is_active)
        .bind(agent.id.0.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::decode(e.to_string()))
}

fn agent_from_row(row: SqliteRow) -> Result<Agent, RepositoryError> {
    let id: String = row.try_get("id")?;
    let permissions_json: String = row.try_get("permissions_json")?;
    let llm_config_json: String = row.try_get("llm_config_json")?;

    let permissions: PermissionSet = serde_json::from_str(&permissions_json)
        .map_err(|e| RepositoryError::decode(format!("permissions_json: {e}")))?;
    let llm: LlmSettings = serde_json::from_str(&llm_config_json)
        .map_err(|e| RepositoryError::decode(format!("llm_config_json: {e}")))?;

    Ok(Agent {
        id: AgentId(parse_uuid(&id)?),
        routing_key: row.try_get("routing_key")?,
        name: row.try_get("name")?,
        system_context: row.try_get("system_context")?,
        permissions,
        llm,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, RepositoryError> {
    value.parse().map_err(|_| RepositoryError::decode(format!("invalid uuid `{value}`")))
}
