//! Chat-completion provider port and the OpenAI-compatible HTTP adapter
//! (Groq, OpenAI, Azure deployments).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use concierge_core::config::{LlmConfig, LlmProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("no chat adapter is configured for provider `{0}`")]
    UnknownProvider(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) | Self::UnknownProvider(_) => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry in the provider conversation context.
#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ProviderToolCall>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into(), tool_call_id: None, tool_calls: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into(), tool_call_id: None, tool_calls: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Assistant turn that requested tool calls, echoed back to the provider.
    pub fn assistant_tool_calls(calls: &[ToolCallRequest]) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: Some(calls.iter().map(ProviderToolCall::from).collect()),
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
        }
    }
}

/// A tool invocation requested by the model, arguments already parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition offered to the provider.
#[derive(Clone, Debug, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

#[async_trait]
pub trait ChatCompletionPort: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;
}

/// Configured adapters keyed by provider id. Each agent names its provider
/// in `llm_config`, and every turn resolves the adapter here, so agents on
/// the same deployment can talk to different providers.
#[derive(Default)]
pub struct ProviderRouter {
    adapters: HashMap<String, Arc<dyn ChatCompletionPort>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(provider: impl Into<String>, adapter: Arc<dyn ChatCompletionPort>) -> Self {
        let mut router = Self::new();
        router.register(provider, adapter);
        router
    }

    pub fn register(&mut self, provider: impl Into<String>, adapter: Arc<dyn ChatCompletionPort>) {
        self.adapters.insert(normalize(&provider.into()), adapter);
    }

    pub fn resolve(&self, provider: &str) -> Result<Arc<dyn ChatCompletionPort>, ProviderError> {
        self.adapters
            .get(&normalize(provider))
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(provider.to_string()))
    }
}

fn normalize(provider: &str) -> String {
    provider.trim().to_ascii_lowercase()
}

// Wire types for the OpenAI-compatible chat completions API.

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ProviderFunctionCall,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderFunctionCall {
    pub name: String,
    pub arguments: String,
}

impl From<&ToolCallRequest> for ProviderToolCall {
    fn from(call: &ToolCallRequest) -> Self {
        Self {
            id: call.id.clone(),
            kind: "function".to_string(),
            function: ProviderFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        }
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSpec,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ProviderToolCall>,
}

/// HTTP adapter for OpenAI-compatible providers. The provider id selects the
/// base URL and auth header; everything else shares one code path.
pub struct HttpChatClient {
    http: reqwest::Client,
    provider: LlmProvider,
    url: String,
    api_key: Option<String>,
    default_model: String,
    max_retries: u32,
}

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

impl HttpChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let url = match config.provider {
            // Azure deployment URLs carry the full path and api-version.
            LlmProvider::Azure => config
                .base_url
                .clone()
                .ok_or_else(|| ProviderError::Transport("azure requires base_url".to_string()))?,
            LlmProvider::Groq => format!(
                "{}/chat/completions",
                config.base_url.as_deref().unwrap_or(GROQ_BASE_URL).trim_end_matches('/')
            ),
            LlmProvider::OpenAi => format!(
                "{}/chat/completions",
                config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL).trim_end_matches('/')
            ),
        };

        Ok(Self {
            http,
            provider: config.provider,
            url,
            api_key: config.api_key.as_ref().map(|key| key.expose_secret().to_string()),
            default_model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn request_once(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let body = WireRequest {
            model,
            messages: &request.messages,
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool { kind: "function", function: tool })
                .collect(),
            tool_choice: (!request.tools.is_empty()).then_some("auto"),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut http_request = self.http.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            http_request = match self.provider {
                LlmProvider::Azure => http_request.header("api-key", key),
                LlmProvider::Groq | LlmProvider::OpenAi => http_request.bearer_auth(key),
            };
        }

        let response = http_request.send().await.map_err(|err| {
            if err.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Transport(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let wire: WireResponse =
            response.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_completion(wire)
    }
}

fn parse_completion(wire: WireResponse) -> Result<Completion, ProviderError> {
    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("response carried no choices".to_string()))?;

    if !choice.message.tool_calls.is_empty() {
        let mut calls = Vec::with_capacity(choice.message.tool_calls.len());
        for call in choice.message.tool_calls {
            let arguments: serde_json::Value = serde_json::from_str(&call.function.arguments)
                .map_err(|e| {
                    ProviderError::Malformed(format!(
                        "tool call `{}` has invalid arguments: {e}",
                        call.function.name
                    ))
                })?;
            calls.push(ToolCallRequest { id: call.id, name: call.function.name, arguments });
        }
        return Ok(Completion::ToolCalls(calls));
    }

    Ok(Completion::Text(choice.message.content.unwrap_or_default()))
}

#[async_trait]
impl ChatCompletionPort for HttpChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.request_once(&request).await {
                Ok(completion) => return Ok(completion),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        event_name = "agent.llm.retry",
                        attempt,
                        error = %err,
                    );
                    tokio::time::sleep(Duration::from_millis(250 * (1 << attempt))).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
