use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use concierge_core::config::DatabaseConfig;

    use super::run_pending;
    use crate::{connect, DbPool};

    async fn memory_pool() -> DbPool {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 5,
        };
        connect(&config).await.expect("connect")
    }

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "agent",
        "conversation",
        "message",
        "appointment",
        "knowledge_document",
        "compliment",
        "idx_message_conversation_created",
        "idx_appointment_slot",
        "idx_appointment_agent_date",
        "idx_appointment_customer",
        "idx_knowledge_document_agent",
        "idx_compliment_agent",
    ];

    #[tokio::test]
    async fn migrations_create_the_full_schema() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("migrate");

        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'index') AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%'",
        )
        .fetch_all(&pool)
        .await
        .expect("query sqlite_master");

        let names: Vec<String> = rows.iter().map(|row| row.get::<String, _>("name")).collect();
        for object in MANAGED_SCHEMA_OBJECTS {
            assert!(names.iter().any(|name| name == object), "missing schema object: {object}");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run");
    }
}
