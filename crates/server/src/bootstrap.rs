use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use concierge_agent::{
    CollectComplimentTool, ConversationOrchestrator, HttpChatClient, ManageAppointmentTool,
    NoopDelivery, NoopEmailer, ProviderRouter, SearchKnowledgeTool, SendEmailTool, ToolRegistry,
};
use concierge_core::config::{AppConfig, ConfigError, LoadOptions};
use concierge_db::repositories::{
    SqlAgentRepository, SqlAppointmentRepository, SqlComplimentRepository,
    SqlConversationRepository,
};
use concierge_db::{connect, migrations, DbPool};
use concierge_rag::{EmbedError, EmbeddingClient, QdrantIndex, VectorError};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<ConversationOrchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("embedding client setup failed: {0}")]
    Embedding(#[from] EmbedError),
    #[error("vector store connection failed: {0}")]
    Vector(#[from] VectorError),
    #[error("chat provider setup failed: {0}")]
    Provider(#[from] concierge_agent::ProviderError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied");

    let embedder = Arc::new(EmbeddingClient::new(&config.embedding)?);
    let index = Arc::new(QdrantIndex::connect(&config.vector.qdrant_url, config.embedding.dimension)?);
    info!(
        event_name = "system.bootstrap.vector_connected",
        url = %config.vector.qdrant_url,
        dimension = config.embedding.dimension,
    );

    let appointments = Arc::new(SqlAppointmentRepository::new(db_pool.clone()));
    let compliments = Arc::new(SqlComplimentRepository::new(db_pool.clone()));
    let emailer = Arc::new(NoopEmailer);

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SearchKnowledgeTool::new(embedder.clone(), index.clone())));
    registry.register(Arc::new(ManageAppointmentTool::new(
        appointments,
        emailer.clone(),
        config.booking.clone(),
    )));
    registry.register(Arc::new(SendEmailTool::new(emailer)));
    registry.register(Arc::new(CollectComplimentTool::new(compliments)));

    let chat = Arc::new(HttpChatClient::new(&config.llm)?);
    let providers =
        Arc::new(ProviderRouter::single(config.llm.provider.as_str(), chat));
    let orchestrator = Arc::new(ConversationOrchestrator::new(
        Arc::new(SqlAgentRepository::new(db_pool.clone())),
        Arc::new(SqlConversationRepository::new(db_pool.clone())),
        Arc::new(registry),
        providers,
        Arc::new(NoopDelivery),
        config.orchestrator.clone(),
    ));
    info!(event_name = "system.bootstrap.orchestrator_ready");

    Ok(Application { config, db_pool, orchestrator })
}
