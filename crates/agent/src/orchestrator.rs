//! The multi-round conversation loop. One inbound customer message becomes
//! one assistant reply: history is loaded, the model is called with the
//! agent's permitted tools, requested tool calls are executed and fed back,
//! and the final text is segmented and delivered.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;

use concierge_core::config::OrchestratorConfig;
use concierge_core::domain::agent::Agent;
use concierge_core::domain::conversation::{
    Conversation, ConversationResult, Message, SenderRole, ToolCallRecord,
};
use concierge_core::errors::ToolError;
use concierge_core::segment::segment_message;
use concierge_db::repositories::{
    AgentRepository, ConversationRepository, RepositoryError,
};

use crate::llm::{ChatCompletionPort, ChatMessage, Completion, CompletionRequest, ProviderRouter};
use crate::locks::ConversationLocks;
use crate::ports::DeliveryPort;
use crate::tools::{ToolContext, ToolRegistry};

const FALLBACK_REPLY: &str =
    "I'm sorry, I wasn't able to handle that just now. Could you try again in a moment?";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no active agent is registered for routing key `{0}`")]
    UnknownAgent(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// One inbound customer event, already resolved to a channel identity.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub agent_routing_key: String,
    pub customer_external_id: String,
    pub customer_display_name: Option<String>,
    pub text: String,
}

/// What one turn produced. `segments` is what went (or would go) out to the
/// customer, in delivery order.
#[derive(Clone, Debug)]
pub struct TurnReport {
    pub conversation_id: concierge_core::domain::conversation::ConversationId,
    pub reply: String,
    pub segments: Vec<String>,
    pub tags: Vec<String>,
}

pub struct ConversationOrchestrator {
    agents: Arc<dyn AgentRepository>,
    conversations: Arc<dyn ConversationRepository>,
    registry: Arc<ToolRegistry>,
    providers: Arc<ProviderRouter>,
    delivery: Arc<dyn DeliveryPort>,
    locks: ConversationLocks,
    config: OrchestratorConfig,
}

impl ConversationOrchestrator {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        conversations: Arc<dyn ConversationRepository>,
        registry: Arc<ToolRegistry>,
        providers: Arc<ProviderRouter>,
        delivery: Arc<dyn DeliveryPort>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            agents,
            conversations,
            registry,
            providers,
            delivery,
            locks: ConversationLocks::new(),
            config,
        }
    }

    /// Process one inbound message end to end. Turns for the same
    /// (agent, customer) pair are serialized; everything else runs
    /// concurrently.
    pub async fn handle(&self, inbound: InboundMessage) -> Result<TurnReport, OrchestratorError> {
        let agent = self
            .agents
            .find_active_by_routing_key(&inbound.agent_routing_key)
            .await?
            .ok_or_else(|| OrchestratorError::UnknownAgent(inbound.agent_routing_key.clone()))?;

        if !agent.permissions.read_messages {
            tracing::info!(
                event_name = "agent.turn.read_disabled",
                agent_id = %agent.id,
            );
            let conversation = self
                .conversations
                .find_or_create(agent.id, &inbound.customer_external_id)
                .await?;
            return Ok(TurnReport {
                conversation_id: conversation.id,
                reply: String::new(),
                segments: Vec::new(),
                tags: Vec::new(),
            });
        }

        let _guard = self.locks.acquire(agent.id, &inbound.customer_external_id).await;

        let mut conversation = self
            .conversations
            .find_or_create(agent.id, &inbound.customer_external_id)
            .await?;

        if let Some(name) = &inbound.customer_display_name {
            if conversation.customer_display_name.as_deref() != Some(name.as_str()) {
                conversation.customer_display_name = Some(name.clone());
            }
        }

        self.conversations
            .append_message(&Message::customer(conversation.id, inbound.text.clone()))
            .await?;

        let history = self
            .conversations
            .recent_messages(conversation.id, self.config.history_limit)
            .await?;

        let context = ToolContext {
            agent_id: agent.id,
            conversation_id: conversation.id,
            customer_external_id: inbound.customer_external_id.clone(),
            today: Utc::now().date_naive(),
        };

        let budget = Duration::from_secs(self.config.turn_budget_secs);
        let outcome =
            match tokio::time::timeout(budget, self.run_rounds(&agent, &context, &history)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        event_name = "agent.turn.budget_exceeded",
                        conversation_id = %conversation.id,
                        budget_secs = self.config.turn_budget_secs,
                    );
                    TurnOutcome::fallback()
                }
            };

        let records =
            if outcome.records.is_empty() { None } else { Some(outcome.records.clone()) };
        self.conversations
            .append_message(&Message::assistant(conversation.id, outcome.reply.clone(), records))
            .await?;

        self.finish_conversation(&mut conversation, &outcome).await?;

        let segments = segment_message(&outcome.reply, self.config.segment_limit);
        if agent.permissions.write_messages {
            self.deliver(&inbound.customer_external_id, &segments).await;
        } else {
            tracing::info!(
                event_name = "agent.turn.write_disabled",
                conversation_id = %conversation.id,
            );
        }

        tracing::info!(
            event_name = "agent.turn.completed",
            conversation_id = %conversation.id,
            rounds = outcome.rounds,
            segments = segments.len(),
            tags = ?outcome.tags,
        );

        Ok(TurnReport {
            conversation_id: conversation.id,
            reply: outcome.reply,
            segments,
            tags: outcome.tags,
        })
    }

    /// Drive one turn through the round state machine. The round counter is
    /// advanced exactly once per completion request, so the cap is enforced
    /// in one place.
    async fn run_rounds(
        &self,
        agent: &Agent,
        context: &ToolContext,
        history: &[Message],
    ) -> TurnOutcome {
        // Each agent talks to the adapter its llm_config names.
        let chat = match self.providers.resolve(&agent.llm.provider) {
            Ok(chat) => chat,
            Err(err) => {
                tracing::error!(
                    event_name = "agent.turn.provider_unresolved",
                    conversation_id = %context.conversation_id,
                    provider = %agent.llm.provider,
                    error = %err,
                );
                return TurnOutcome::fallback();
            }
        };

        let specs = self.registry.specs_for(&agent.permissions);
        let mut messages: Vec<ChatMessage> = Vec::new();
        let mut outcome = TurnOutcome::default();
        let mut state = TurnState::Loading;

        loop {
            state = match state {
                TurnState::Loading => {
                    messages.reserve(history.len() + 1);
                    messages.push(ChatMessage::system(system_prompt(agent, context)));
                    for entry in history {
                        messages.push(match entry.sender {
                            SenderRole::Customer => ChatMessage::user(entry.content.clone()),
                            SenderRole::Assistant => ChatMessage::assistant(entry.content.clone()),
                            SenderRole::System => ChatMessage::system(entry.content.clone()),
                        });
                    }
                    TurnState::AwaitingCompletion
                }

                TurnState::AwaitingCompletion => {
                    if outcome.rounds >= self.config.max_rounds {
                        TurnState::Exhausted
                    } else {
                        outcome.rounds += 1;
                        let request = CompletionRequest {
                            messages: messages.clone(),
                            tools: specs.clone(),
                            model: agent.llm.model.clone(),
                            temperature: agent.llm.temperature,
                            max_tokens: agent.llm.max_tokens,
                        };
                        match chat.complete(request).await {
                            Ok(Completion::Text(text)) if text.trim().is_empty() => {
                                TurnState::Answered(FALLBACK_REPLY.to_string())
                            }
                            Ok(Completion::Text(text)) => TurnState::Answered(text),
                            Ok(Completion::ToolCalls(calls)) => TurnState::ExecutingTools(calls),
                            Err(err) => {
                                tracing::error!(
                                    event_name = "agent.turn.provider_failed",
                                    conversation_id = %context.conversation_id,
                                    round = outcome.rounds,
                                    error = %err,
                                );
                                TurnState::Answered(FALLBACK_REPLY.to_string())
                            }
                        }
                    }
                }

                TurnState::ExecutingTools(calls) => {
                    messages.push(ChatMessage::assistant_tool_calls(&calls));
                    for call in calls {
                        let result = self
                            .registry
                            .dispatch(&call.name, &call.arguments, &agent.permissions, context)
                            .await;
                        apply_turn_effects(&call.name, &result, &mut outcome);

                        let payload = render_tool_result(&result);
                        tracing::debug!(
                            event_name = "agent.turn.tool_executed",
                            conversation_id = %context.conversation_id,
                            tool = call.name,
                            ok = result.is_ok(),
                        );
                        outcome.records.push(ToolCallRecord {
                            tool: call.name.clone(),
                            arguments: call.arguments.clone(),
                            result_summary: payload.clone(),
                        });
                        messages.push(ChatMessage::tool_result(call.id, payload));
                    }
                    TurnState::AwaitingCompletion
                }

                TurnState::Answered(text) => {
                    outcome.reply = text;
                    return outcome;
                }

                TurnState::Exhausted => {
                    // The model kept asking for tools past the round cap.
                    tracing::warn!(
                        event_name = "agent.turn.rounds_exhausted",
                        conversation_id = %context.conversation_id,
                        max_rounds = self.config.max_rounds,
                    );
                    outcome.reply = FALLBACK_REPLY.to_string();
                    return outcome;
                }
            };
        }
    }

    async fn finish_conversation(
        &self,
        conversation: &mut Conversation,
        outcome: &TurnOutcome,
    ) -> Result<(), RepositoryError> {
        conversation.add_tags(outcome.tags.iter().cloned());
        if let Some(result) = outcome.result {
            conversation.result = result;
        }
        conversation.last_message_at = Some(Utc::now());
        self.conversations.update(conversation).await
    }

    async fn deliver(&self, customer_external_id: &str, segments: &[String]) {
        for segment in segments {
            if let Err(err) = self.delivery.deliver(customer_external_id, segment).await {
                tracing::warn!(
                    event_name = "agent.turn.delivery_failed",
                    customer = customer_external_id,
                    error = %err,
                );
                // Later segments would arrive out of order; stop here.
                return;
            }
        }
    }
}

/// Round-loop states: `Loading -> AwaitingCompletion ->
/// (ExecutingTools -> AwaitingCompletion)* -> Answered | Exhausted`.
enum TurnState {
    Loading,
    AwaitingCompletion,
    ExecutingTools(Vec<crate::llm::ToolCallRequest>),
    Answered(String),
    Exhausted,
}

#[derive(Clone, Debug, Default)]
struct TurnOutcome {
    reply: String,
    records: Vec<ToolCallRecord>,
    tags: Vec<String>,
    result: Option<ConversationResult>,
    rounds: u32,
}

impl TurnOutcome {
    fn fallback() -> Self {
        Self { reply: FALLBACK_REPLY.to_string(), ..Self::default() }
    }

    fn tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|existing| existing == tag) {
            self.tags.push(tag.to_string());
        }
    }
}

fn system_prompt(agent: &Agent, context: &ToolContext) -> String {
    format!(
        "{context_block}\n\n\
        You are {name}, a messaging assistant for this business. Today is {today}.\n\
        Rules:\n\
        - Answer from the business knowledge base; use search_knowledge before \
        answering factual questions about the business.\n\
        - Never invent details you do not have. If a tool needs information the \
        customer has not given, ask for it instead of guessing.\n\
        - Before booking an appointment, check availability first.\n\
        - Keep replies short and friendly, in the customer's language.",
        context_block = agent.system_context,
        name = agent.name,
        today = context.today,
    )
}

/// Success payloads go back to the model verbatim; errors become an `error`
/// object so the model can correct the call or relay the problem.
fn render_tool_result(result: &Result<Value, ToolError>) -> String {
    match result {
        Ok(value) => value.to_string(),
        Err(ToolError::Conflict { message, suggestions }) => {
            json!({ "error": message, "available_slots": suggestions }).to_string()
        }
        Err(other) => json!({ "error": other.to_string() }).to_string(),
    }
}

/// Map a completed tool call onto conversation tags and the turn result.
fn apply_turn_effects(
    tool: &str,
    result: &Result<Value, ToolError>,
    outcome: &mut TurnOutcome,
) {
    let Ok(value) = result else { return };
    match tool {
        "manage_appointment" => {
            match value.get("status").and_then(Value::as_str) {
                Some("confirmed") => {
                    outcome.tag("appointment_created");
                    outcome.result = Some(ConversationResult::AppointmentCreated);
                }
                Some("cancelled") => outcome.tag("appointment_cancelled"),
                _ => {}
            }
            if value.get("available_slots").is_some() {
                outcome.tag("availability_checked");
            }
        }
        "collect_compliment" => {
            if value.get("status").and_then(Value::as_str) == Some("recorded") {
                outcome.tag("compliment");
                if outcome.result.is_none() {
                    outcome.result = Some(ConversationResult::Compliment);
                }
            }
        }
        "send_email" => {
            if value.get("status").and_then(Value::as_str) == Some("sent") {
                outcome.tag("email_sent");
                if outcome.result.is_none() {
                    outcome.result = Some(ConversationResult::EmailSent);
                }
            }
        }
        "search_knowledge" => {
            if value.get("result_count").and_then(Value::as_u64).unwrap_or(0) > 0 {
                outcome.tag("knowledge_used");
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use concierge_core::domain::conversation::ConversationResult;
    use concierge_core::errors::ToolError;

    use super::{apply_turn_effects, render_tool_result, TurnOutcome};

    #[test]
    fn booking_confirmation_sets_tag_and_result() {
        let mut outcome = TurnOutcome::default();
        apply_turn_effects(
            "manage_appointment",
            &Ok(json!({"status": "confirmed", "appointment_id": "x"})),
            &mut outcome,
        );
        assert_eq!(outcome.tags, vec!["appointment_created"]);
        assert_eq!(outcome.result, Some(ConversationResult::AppointmentCreated));
    }

    #[test]
    fn availability_listing_is_tagged_without_a_result() {
        let mut outcome = TurnOutcome::default();
        apply_turn_effects(
            "manage_appointment",
            &Ok(json!({"available": true, "available_slots": ["09:00"]})),
            &mut outcome,
        );
        assert_eq!(outcome.tags, vec!["availability_checked"]);
        assert_eq!(outcome.result, None);
    }

    #[test]
    fn appointment_created_wins_over_later_email() {
        let mut outcome = TurnOutcome::default();
        apply_turn_effects("manage_appointment", &Ok(json!({"status": "confirmed"})), &mut outcome);
        apply_turn_effects("send_email", &Ok(json!({"status": "sent"})), &mut outcome);
        // The appointment result is not displaced, but the email result
        // overwrites nothing-yet.
        assert_eq!(outcome.result, Some(ConversationResult::AppointmentCreated));
        assert_eq!(outcome.tags, vec!["appointment_created", "email_sent"]);
    }

    #[test]
    fn failed_tools_leave_no_tags() {
        let mut outcome = TurnOutcome::default();
        apply_turn_effects(
            "manage_appointment",
            &Err(ToolError::validation("bad date")),
            &mut outcome,
        );
        assert!(outcome.tags.is_empty());
        assert_eq!(outcome.result, None);
    }

    #[test]
    fn empty_searches_are_not_tagged() {
        let mut outcome = TurnOutcome::default();
        apply_turn_effects(
            "search_knowledge",
            &Ok(json!({"result_count": 0, "message": "nothing"})),
            &mut outcome,
        );
        assert!(outcome.tags.is_empty());
    }

    #[test]
    fn conflict_errors_render_with_alternatives() {
        let rendered = render_tool_result(&Err(ToolError::Conflict {
            message: "10:00 is taken".to_string(),
            suggestions: vec!["2025-06-03 10:30".to_string()],
        }));
        let parsed: serde_json::Value = serde_json::from_str(&rendered).expect("json");
        assert_eq!(parsed["error"], "10:00 is taken");
        assert_eq!(parsed["available_slots"][0], "2025-06-03 10:30");
    }

    #[test]
    fn duplicate_tags_collapse() {
        let mut outcome = TurnOutcome::default();
        outcome.tag("knowledge_used");
        outcome.tag("knowledge_used");
        assert_eq!(outcome.tags.len(), 1);
    }
}
