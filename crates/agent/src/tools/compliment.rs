use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use concierge_core::domain::agent::PermissionSet;
use concierge_core::domain::compliment::Compliment;
use concierge_core::errors::ToolError;
use concierge_db::repositories::ComplimentRepository;

use super::{non_placeholder, ParamSpec, Tool, ToolContext, ToolSchema};

const SCHEMA: ToolSchema = ToolSchema {
    name: "collect_compliment",
    description: "Record positive feedback the customer gives about the business. \
        Call this when the customer expresses genuine praise, quoting their words.",
    params: &[ParamSpec::string("text", true, "The customer's compliment, verbatim")],
};

pub struct CollectComplimentTool {
    compliments: Arc<dyn ComplimentRepository>,
}

impl CollectComplimentTool {
    pub fn new(compliments: Arc<dyn ComplimentRepository>) -> Self {
        Self { compliments }
    }
}

#[async_trait]
impl Tool for CollectComplimentTool {
    fn schema(&self) -> &ToolSchema {
        &SCHEMA
    }

    fn is_permitted(&self, _permissions: &PermissionSet) -> bool {
        true
    }

    async fn execute(&self, context: &ToolContext, args: &Value) -> Result<Value, ToolError> {
        let text = non_placeholder(args, "text", "what did the customer say?")?;

        let compliment =
            Compliment::new(context.agent_id, context.customer_external_id.clone(), text);
        self.compliments
            .insert(&compliment)
            .await
            .map_err(|e| ToolError::failed(format!("could not record the compliment: {e}")))?;

        tracing::info!(
            event_name = "agent.tool.compliment_recorded",
            conversation_id = %context.conversation_id,
        );
        Ok(json!({ "status": "recorded" }))
    }
}
