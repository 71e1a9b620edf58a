//! End-to-end turns through the orchestrator with a scripted chat provider
//! and in-memory repositories.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use concierge_agent::llm::{
    ChatCompletionPort, Completion, CompletionRequest, ProviderError, ProviderRouter,
    ToolCallRequest,
};
use concierge_agent::ports::{DeliveryPort, NoopEmailer, PortError};
use concierge_agent::tools::{
    CollectComplimentTool, ManageAppointmentTool, SearchKnowledgeTool, SendEmailTool, ToolRegistry,
};
use concierge_agent::{ConversationOrchestrator, InboundMessage};
use concierge_core::config::{BookingConfig, OrchestratorConfig};
use concierge_core::domain::agent::Agent;
use concierge_core::domain::conversation::ConversationResult;
use concierge_db::repositories::{
    InMemoryAgentRepository, InMemoryAppointmentRepository, InMemoryComplimentRepository,
    InMemoryConversationRepository,
};
use concierge_rag::{EmbedError, EmbeddingPort, InMemoryVectorIndex};

/// Replays a fixed sequence of completions and records every request.
#[derive(Default)]
struct ScriptedChat {
    script: Mutex<VecDeque<Completion>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedChat {
    fn with_script(completions: Vec<Completion>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(completions.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> CompletionRequest {
        self.requests.lock().unwrap().last().cloned().expect("at least one request")
    }
}

#[async_trait]
impl ChatCompletionPort for ScriptedChat {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Malformed("script exhausted".to_string()))
    }
}

#[derive(Default)]
struct RecordingDelivery {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingDelivery {
    fn segments(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, s)| s.clone()).collect()
    }
}

#[async_trait]
impl DeliveryPort for RecordingDelivery {
    async fn deliver(&self, customer_external_id: &str, segment: &str) -> Result<(), PortError> {
        self.sent
            .lock()
            .unwrap()
            .push((customer_external_id.to_string(), segment.to_string()));
        Ok(())
    }
}

struct UnitEmbedder;

#[async_trait]
impl EmbeddingPort for UnitEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(vec![1.0, 0.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

struct Harness {
    orchestrator: ConversationOrchestrator,
    chat: Arc<ScriptedChat>,
    delivery: Arc<RecordingDelivery>,
    conversations: Arc<InMemoryConversationRepository>,
    appointments: Arc<InMemoryAppointmentRepository>,
    agent: Agent,
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        history_limit: 10,
        max_rounds: 5,
        turn_budget_secs: 60,
        segment_limit: 1000,
    }
}

fn booking() -> BookingConfig {
    BookingConfig {
        open_minute: 540,
        close_minute: 1080,
        slot_step_minutes: 30,
        suggestion_horizon_days: 7,
        max_suggestions: 5,
    }
}

fn harness(agent: Agent, script: Vec<Completion>) -> Harness {
    let chat = ScriptedChat::with_script(script);
    let delivery = Arc::new(RecordingDelivery::default());
    let conversations = Arc::new(InMemoryConversationRepository::default());
    let appointments = Arc::new(InMemoryAppointmentRepository::default());

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SearchKnowledgeTool::new(
        Arc::new(UnitEmbedder),
        Arc::new(InMemoryVectorIndex::default()),
    )));
    registry.register(Arc::new(ManageAppointmentTool::new(
        appointments.clone(),
        Arc::new(NoopEmailer),
        booking(),
    )));
    registry.register(Arc::new(SendEmailTool::new(Arc::new(NoopEmailer))));
    registry.register(Arc::new(CollectComplimentTool::new(Arc::new(
        InMemoryComplimentRepository::default(),
    ))));

    let orchestrator = ConversationOrchestrator::new(
        Arc::new(InMemoryAgentRepository::with_agent(agent.clone())),
        conversations.clone(),
        Arc::new(registry),
        Arc::new(ProviderRouter::single("groq", chat.clone())),
        delivery.clone(),
        config(),
    );

    Harness { orchestrator, chat, delivery, conversations, appointments, agent }
}

fn inbound(text: &str) -> InboundMessage {
    InboundMessage {
        agent_routing_key: "insta:bakery".to_string(),
        customer_external_id: "cust-1".to_string(),
        customer_display_name: Some("Ada".to_string()),
        text: text.to_string(),
    }
}

fn sample_agent() -> Agent {
    let mut agent = Agent::new("insta:bakery", "Bakery Bot", "We are a family bakery.");
    agent.permissions.manage_appointments = true;
    agent
}

fn tool_call(name: &str, arguments: serde_json::Value) -> Completion {
    Completion::ToolCalls(vec![ToolCallRequest {
        id: "call_1".to_string(),
        name: name.to_string(),
        arguments,
    }])
}

#[tokio::test]
async fn plain_text_turn_persists_both_messages_and_delivers() {
    let h = harness(sample_agent(), vec![Completion::Text("We open at nine!".to_string())]);

    let report = h.orchestrator.handle(inbound("When do you open?")).await.expect("turn");

    assert_eq!(report.reply, "We open at nine!");
    assert_eq!(report.segments, vec!["We open at nine!".to_string()]);
    assert_eq!(h.delivery.segments(), vec!["We open at nine!".to_string()]);
    assert_eq!(h.conversations.message_count(report.conversation_id), 2);

    let conversation =
        h.conversations.conversation(report.conversation_id).expect("conversation");
    assert_eq!(conversation.customer_display_name.as_deref(), Some("Ada"));
    assert_eq!(conversation.message_count, 2);
    assert!(conversation.last_message_at.is_some());
}

#[tokio::test]
async fn booking_flow_creates_the_appointment_and_tags_the_conversation() {
    let h = harness(
        sample_agent(),
        vec![
            tool_call(
                "manage_appointment",
                json!({"action": "check_availability", "date": "2099-06-03"}),
            ),
            tool_call(
                "manage_appointment",
                json!({
                    "action": "create",
                    "date": "2099-06-03",
                    "time": "10:00",
                    "customer_name": "Ada",
                    "customer_surname": "Lovelace",
                    "subject": "cake tasting",
                }),
            ),
            Completion::Text("Booked you in for 10:00 on June 3rd!".to_string()),
        ],
    );

    let report = h.orchestrator.handle(inbound("Book me a cake tasting")).await.expect("turn");

    assert_eq!(h.appointments.all().len(), 1);
    assert_eq!(h.appointments.all()[0].subject, "cake tasting");
    assert!(report.tags.contains(&"availability_checked".to_string()));
    assert!(report.tags.contains(&"appointment_created".to_string()));

    let conversation =
        h.conversations.conversation(report.conversation_id).expect("conversation");
    assert_eq!(conversation.result, ConversationResult::AppointmentCreated);
    let tags = conversation.metadata["tags"].as_array().expect("tags");
    assert!(tags.iter().any(|t| t == "appointment_created"));
}

#[tokio::test]
async fn conflicting_booking_feeds_alternatives_back_to_the_model() {
    let h = harness(
        sample_agent(),
        vec![
            tool_call(
                "manage_appointment",
                json!({
                    "action": "create",
                    "date": "2099-06-03",
                    "time": "10:00",
                    "customer_name": "Ada",
                    "customer_surname": "Lovelace",
                    "subject": "tasting",
                }),
            ),
            Completion::Text("That slot is taken; how about 10:30?".to_string()),
        ],
    );
    h.appointments.seed(occupied_slot(&h.agent));

    let report = h.orchestrator.handle(inbound("Book me 10:00")).await.expect("turn");

    assert_eq!(report.reply, "That slot is taken; how about 10:30?");
    assert_eq!(h.appointments.all().len(), 1);
    assert!(report.tags.is_empty());

    // The second model request carries the conflict payload with alternatives.
    let last = h.chat.last_request();
    let tool_message = last
        .messages
        .iter()
        .find(|m| m.tool_call_id.is_some())
        .expect("tool result message");
    assert!(tool_message.content.contains("available_slots"));
    assert!(tool_message.content.contains("error"));
}

fn occupied_slot(agent: &Agent) -> concierge_core::domain::appointment::Appointment {
    use concierge_core::domain::appointment::{
        Appointment, AppointmentId, AppointmentStatus, CreatedVia,
    };
    Appointment {
        id: AppointmentId::new(),
        agent_id: Some(agent.id),
        account_id: None,
        customer_external_id: "cust-9".to_string(),
        customer_name: "Someone Else".to_string(),
        date: "2099-06-03".parse().expect("date"),
        start_minute: 600,
        duration_minutes: 30,
        subject: "busy".to_string(),
        status: AppointmentStatus::Confirmed,
        created_via: CreatedVia::Manual,
        cancellation_reason: None,
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn endless_tool_requests_stop_at_the_round_cap() {
    let script: Vec<Completion> = (0..6)
        .map(|_| {
            tool_call(
                "manage_appointment",
                json!({"action": "check_availability", "date": "2099-06-03"}),
            )
        })
        .collect();
    let h = harness(sample_agent(), script);

    let report = h.orchestrator.handle(inbound("availability?")).await.expect("turn");

    // 5 rounds, no sixth request.
    assert_eq!(h.chat.request_count(), 5);
    assert!(report.reply.contains("sorry") || report.reply.contains("again"));
    assert_eq!(h.conversations.message_count(report.conversation_id), 2);
}

#[tokio::test]
async fn revoked_permissions_hide_tools_and_block_calls() {
    // send_email stays disabled in the default permission set.
    let h = harness(
        sample_agent(),
        vec![
            tool_call("send_email", json!({"subject": "Hi", "body": "Body"})),
            Completion::Text("I can't send emails, sorry.".to_string()),
        ],
    );

    let report = h.orchestrator.handle(inbound("email the owner")).await.expect("turn");

    let first = h.chat.requests.lock().unwrap()[0].clone();
    let offered: Vec<&str> = first.tools.iter().map(|t| t.name.as_str()).collect();
    assert!(!offered.contains(&"send_email"));
    assert!(offered.contains(&"manage_appointment"));
    assert!(offered.contains(&"search_knowledge"));
    assert!(offered.contains(&"collect_compliment"));

    // The unauthorized call itself came back as a tool error, not a crash.
    let last = h.chat.last_request();
    let tool_message = last
        .messages
        .iter()
        .find(|m| m.tool_call_id.is_some())
        .expect("tool result message");
    assert!(tool_message.content.contains("not enabled"));
    assert_eq!(report.reply, "I can't send emails, sorry.");
}

#[tokio::test]
async fn provider_failure_falls_back_to_an_apology() {
    let h = harness(sample_agent(), Vec::new());

    let report = h.orchestrator.handle(inbound("hello?")).await.expect("turn");

    assert!(!report.reply.is_empty());
    assert_eq!(h.conversations.message_count(report.conversation_id), 2);
    assert_eq!(h.delivery.segments().len(), 1);
}

#[tokio::test]
async fn unknown_routing_key_is_an_error() {
    let h = harness(sample_agent(), Vec::new());
    let mut message = inbound("hello");
    message.agent_routing_key = "insta:nobody".to_string();

    let err = h.orchestrator.handle(message).await.expect_err("unknown agent");
    assert!(err.to_string().contains("insta:nobody"));
}

#[tokio::test]
async fn write_disabled_persists_but_does_not_deliver() {
    let mut agent = sample_agent();
    agent.permissions.write_messages = false;
    let h = harness(agent, vec![Completion::Text("Noted.".to_string())]);

    let report = h.orchestrator.handle(inbound("just saying hi")).await.expect("turn");

    assert_eq!(report.segments, vec!["Noted.".to_string()]);
    assert!(h.delivery.segments().is_empty());
    assert_eq!(h.conversations.message_count(report.conversation_id), 2);
}

#[tokio::test]
async fn read_disabled_skips_the_turn_entirely() {
    let mut agent = sample_agent();
    agent.permissions.read_messages = false;
    let h = harness(agent, vec![Completion::Text("should never appear".to_string())]);

    let report = h.orchestrator.handle(inbound("hello")).await.expect("turn");

    assert!(report.reply.is_empty());
    assert!(report.segments.is_empty());
    assert_eq!(h.chat.request_count(), 0);
    assert_eq!(h.conversations.message_count(report.conversation_id), 0);
}

#[tokio::test]
async fn long_replies_are_delivered_in_segments_in_order() {
    let first = "a".repeat(600);
    let second = "b".repeat(600);
    let reply = format!("{first}\n\n{second}");
    let h = harness(sample_agent(), vec![Completion::Text(reply)]);

    let report = h.orchestrator.handle(inbound("tell me everything")).await.expect("turn");

    assert_eq!(report.segments.len(), 2);
    assert_eq!(h.delivery.segments(), vec![first, second]);
}

#[tokio::test]
async fn agents_reach_the_adapter_their_provider_names() {
    use concierge_db::repositories::AgentRepository;

    let groq = ScriptedChat::with_script(vec![Completion::Text("groq reply".to_string())]);
    let azure = ScriptedChat::with_script(vec![Completion::Text("azure reply".to_string())]);
    let mut router = ProviderRouter::new();
    router.register("groq", groq.clone());
    router.register("azure", azure.clone());

    let agents = Arc::new(InMemoryAgentRepository::default());
    agents.insert(&sample_agent()).await.expect("insert bakery agent");
    let mut florist = Agent::new("insta:florist", "Florist Bot", "We sell flowers.");
    florist.llm.provider = "azure".to_string();
    agents.insert(&florist).await.expect("insert florist agent");

    let orchestrator = ConversationOrchestrator::new(
        agents,
        Arc::new(InMemoryConversationRepository::default()),
        Arc::new(ToolRegistry::new()),
        Arc::new(router),
        Arc::new(RecordingDelivery::default()),
        config(),
    );

    let bakery_report = orchestrator.handle(inbound("hi")).await.expect("bakery turn");
    let mut florist_message = inbound("hi");
    florist_message.agent_routing_key = "insta:florist".to_string();
    let florist_report = orchestrator.handle(florist_message).await.expect("florist turn");

    assert_eq!(bakery_report.reply, "groq reply");
    assert_eq!(florist_report.reply, "azure reply");
    assert_eq!(groq.request_count(), 1);
    assert_eq!(azure.request_count(), 1);
}

#[tokio::test]
async fn unconfigured_provider_falls_back_without_reaching_an_adapter() {
    let mut agent = sample_agent();
    agent.llm.provider = "mystery".to_string();
    let h = harness(agent, vec![Completion::Text("should never appear".to_string())]);

    let report = h.orchestrator.handle(inbound("hello")).await.expect("turn");

    assert_eq!(h.chat.request_count(), 0);
    assert!(report.reply.contains("sorry"));
    // The customer message and the fallback reply still persist.
    assert_eq!(h.conversations.message_count(report.conversation_id), 2);
}

#[tokio::test]
async fn history_is_replayed_to_the_model_oldest_first() {
    let h = harness(
        sample_agent(),
        vec![
            Completion::Text("Hi Ada!".to_string()),
            Completion::Text("We open at nine.".to_string()),
        ],
    );

    h.orchestrator.handle(inbound("hello")).await.expect("first turn");
    h.orchestrator.handle(inbound("when do you open?")).await.expect("second turn");

    let last = h.chat.last_request();
    let contents: Vec<&str> = last.messages.iter().map(|m| m.content.as_str()).collect();
    let hello = contents.iter().position(|c| *c == "hello").expect("first user message");
    let reply = contents.iter().position(|c| *c == "Hi Ada!").expect("first reply");
    let question =
        contents.iter().position(|c| *c == "when do you open?").expect("second user message");
    assert!(hello < reply && reply < question);
}
