use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use concierge_core::domain::agent::AgentId;
use concierge_core::domain::document::{DocumentStatus, KnowledgeDocument, KnowledgeDocumentId};

use super::agent::parse_uuid;
use super::{DocumentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDocumentRepository {
    pool: DbPool,
}

impl SqlDocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DocumentRepository for SqlDocumentRepository {
    async fn insert(&self, document: &KnowledgeDocument) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO knowledge_document (
                id, agent_id, filename, byte_size, page_count,
                status, chunk_count, error_detail, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(document.id.0.to_string())
        .bind(document.agent_id.0.to_string())
        .bind(&document.filename)
        .bind(document.byte_size)
        .bind(document.page_count)
        .bind(document.status.as_str())
        .bind(document.chunk_count)
        .bind(&document.error_detail)
        .bind(document.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &KnowledgeDocumentId,
    ) -> Result<Option<KnowledgeDocument>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, agent_id, filename, byte_size, page_count,
                    status, chunk_count, error_detail, created_at
             FROM knowledge_document WHERE id = ?",
        )
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(document_from_row).transpose()
    }

    async fn mark_ready(
        &self,
        id: &KnowledgeDocumentId,
        page_count: i64,
        chunk_count: i64,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE knowledge_document SET
                status = 'ready', page_count = ?, chunk_count = ?, error_detail = NULL
             WHERE id = ?",
        )
        .bind(page_count)
        .bind(chunk_count)
        .bind(id.0.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_error(
        &self,
        id: &KnowledgeDocumentId,
        detail: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE knowledge_document SET status = 'error', error_detail = ? WHERE id = ?")
            .bind(detail)
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &KnowledgeDocumentId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM knowledge_document WHERE id = ?")
            .bind(id.0.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn document_from_row(row: SqliteRow) -> Result<KnowledgeDocument, RepositoryError> {
    let id: String = row.try_get("id")?;
    let agent_id: String = row.try_get("agent_id")?;
    let status: String = row.try_get("status")?;

    Ok(KnowledgeDocument {
        id: KnowledgeDocumentId(parse_uuid(&id)?),
        agent_id: AgentId(parse_uuid(&agent_id)?),
        filename: row.try_get("filename")?,
        byte_size: row.try_get("byte_size")?,
        page_count: row.try_get("page_count")?,
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| RepositoryError::decode(format!("unknown status `{status}`")))?,
        chunk_count: row.try_get("chunk_count")?,
        error_detail: row.try_get("error_detail")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
