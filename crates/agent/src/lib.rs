//! Conversation orchestration: chat-completion providers, the tool registry,
//! per-conversation locking and the round loop that ties them together.

pub mod llm;
pub mod locks;
pub mod orchestrator;
pub mod ports;
pub mod tools;

pub use llm::{
    ChatCompletionPort, ChatMessage, ChatRole, Completion, CompletionRequest, HttpChatClient,
    ProviderError, ProviderRouter, ToolCallRequest, ToolSpec,
};
pub use locks::ConversationLocks;
pub use orchestrator::{ConversationOrchestrator, InboundMessage, OrchestratorError, TurnReport};
pub use ports::{DeliveryPort, EmailPort, NoopDelivery, NoopEmailer, PortError};
pub use tools::{
    CollectComplimentTool, ManageAppointmentTool, SearchKnowledgeTool, SendEmailTool, Tool,
    ToolContext, ToolRegistry,
};
