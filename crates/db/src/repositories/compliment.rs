use concierge_core::domain::compliment::Compliment;

use super::{ComplimentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlComplimentRepository {
    pool: DbPool,
}

impl SqlComplimentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ComplimentRepository for SqlComplimentRepository {
    async fn insert(&self, compliment: &Compliment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO compliment (id, agent_id, customer_external_id, text, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(compliment.id.0.to_string())
        .bind(compliment.agent_id.0.to_string())
        .bind(&compliment.customer_external_id)
        .bind(&compliment.text)
        .bind(compliment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
