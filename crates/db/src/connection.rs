use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use concierge_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Open the pool described by `config`. Every connection gets the pragmas the
/// schema relies on: enforced foreign keys, WAL journaling, and a busy
/// timeout matching the configured acquire timeout so concurrent writers
/// queue instead of failing immediately.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let acquire_timeout = Duration::from_secs(config.timeout_secs.max(1));
    let busy_timeout_ms = acquire_timeout.as_millis() as u64;

    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(acquire_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
}
