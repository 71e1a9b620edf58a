use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use concierge_agent::{ConversationOrchestrator, InboundMessage, OrchestratorError};
use concierge_db::DbPool;

use crate::health;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub orchestrator: Arc<ConversationOrchestrator>,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.db_pool.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/inbound/message", post(inbound_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire shape of one inbound customer event.
#[derive(Debug, Deserialize)]
pub struct InboundEvent {
    pub agent_routing_key: String,
    pub customer_external_id: String,
    #[serde(default)]
    pub customer_display_name: Option<String>,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct InboundResponse {
    pub conversation_id: String,
    pub reply: String,
    pub segments: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub async fn inbound_message(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> Result<Json<InboundResponse>, (StatusCode, Json<ErrorResponse>)> {
    if event.text.trim().is_empty() {
        return Err(reject(StatusCode::UNPROCESSABLE_ENTITY, "text must not be empty"));
    }
    if event.agent_routing_key.trim().is_empty() || event.customer_external_id.trim().is_empty() {
        return Err(reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            "agent_routing_key and customer_external_id are required",
        ));
    }

    let report = state
        .orchestrator
        .handle(InboundMessage {
            agent_routing_key: event.agent_routing_key,
            customer_external_id: event.customer_external_id,
            customer_display_name: event.customer_display_name,
            text: event.text,
        })
        .await
        .map_err(|err| match err {
            OrchestratorError::UnknownAgent(key) => {
                reject(StatusCode::NOT_FOUND, format!("no active agent for `{key}`"))
            }
            OrchestratorError::Repository(inner) => {
                tracing::error!(event_name = "server.inbound.failed", error = %inner);
                reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        })?;

    Ok(Json(InboundResponse {
        conversation_id: report.conversation_id.to_string(),
        reply: report.reply,
        segments: report.segments,
        tags: report.tags,
    }))
}

fn reject(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: message.into() }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::Json;
    use serde_json::json;

    use concierge_agent::llm::{
        ChatCompletionPort, Completion, CompletionRequest, ProviderError, ProviderRouter,
    };
    use concierge_agent::tools::{CollectComplimentTool, ToolRegistry};
    use concierge_agent::{ConversationOrchestrator, NoopDelivery};
    use concierge_core::config::{DatabaseConfig, OrchestratorConfig};
    use concierge_core::domain::agent::Agent;
    use concierge_db::connect;
    use concierge_db::repositories::{
        InMemoryAgentRepository, InMemoryComplimentRepository, InMemoryConversationRepository,
    };

    use super::{inbound_message, AppState, InboundEvent};

    struct CannedChat;

    #[async_trait]
    impl ChatCompletionPort for CannedChat {
        async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
            Ok(Completion::Text("Hello from the bot".to_string()))
        }
    }

    async fn state_with_agent(agent: Option<Agent>) -> AppState {
        let agents = match agent {
            Some(agent) => Arc::new(InMemoryAgentRepository::with_agent(agent)),
            None => Arc::new(InMemoryAgentRepository::default()),
        };
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CollectComplimentTool::new(Arc::new(
            InMemoryComplimentRepository::default(),
        ))));

        let orchestrator = Arc::new(ConversationOrchestrator::new(
            agents,
            Arc::new(InMemoryConversationRepository::default()),
            Arc::new(registry),
            Arc::new(ProviderRouter::single("groq", Arc::new(CannedChat))),
            Arc::new(NoopDelivery),
            OrchestratorConfig {
                history_limit: 10,
                max_rounds: 5,
                turn_budget_secs: 60,
                segment_limit: 1000,
            },
        ));
        let database = DatabaseConfig {
            url: "sqlite::memory:?cache=shared".to_string(),
            max_connections: 1,
            timeout_secs: 5,
        };
        let db_pool = connect(&database).await.expect("pool");
        AppState { db_pool, orchestrator }
    }

    fn event(routing_key: &str, text: &str) -> InboundEvent {
        serde_json::from_value(json!({
            "agent_routing_key": routing_key,
            "customer_external_id": "cust-1",
            "text": text,
        }))
        .expect("event")
    }

    #[tokio::test]
    async fn inbound_turn_returns_the_reply() {
        let state =
            state_with_agent(Some(Agent::new("insta:shop", "Shop Bot", "A shop."))).await;

        let Json(response) =
            inbound_message(State(state), Json(event("insta:shop", "hi"))).await.expect("turn");

        assert_eq!(response.reply, "Hello from the bot");
        assert_eq!(response.segments.len(), 1);
    }

    #[tokio::test]
    async fn unknown_routing_key_is_not_found() {
        let state = state_with_agent(None).await;

        let (status, Json(body)) = inbound_message(State(state), Json(event("insta:ghost", "hi")))
            .await
            .expect_err("unknown agent");

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.error.contains("insta:ghost"));
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let state =
            state_with_agent(Some(Agent::new("insta:shop", "Shop Bot", "A shop."))).await;

        let (status, _) = inbound_message(State(state), Json(event("insta:shop", "   ")))
            .await
            .expect_err("blank text");

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
