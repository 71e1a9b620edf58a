use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use concierge_core::domain::agent::PermissionSet;
use concierge_core::errors::ToolError;

use super::{non_placeholder, ParamSpec, Tool, ToolContext, ToolSchema};
use crate::ports::EmailPort;

const SCHEMA: ToolSchema = ToolSchema {
    name: "send_email",
    description: "Send a notification email to the business owner, for example \
        when the customer asks for something that needs a human follow-up. \
        Write a concrete subject and body; never send placeholders.",
    params: &[
        ParamSpec::string("subject", true, "Short subject line"),
        ParamSpec::string("body", true, "Email body with the customer's request"),
    ],
};

pub struct SendEmailTool {
    email: Arc<dyn EmailPort>,
}

impl SendEmailTool {
    pub fn new(email: Arc<dyn EmailPort>) -> Self {
        Self { email }
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn schema(&self) -> &ToolSchema {
        &SCHEMA
    }

    fn is_permitted(&self, permissions: &PermissionSet) -> bool {
        permissions.send_email
    }

    async fn execute(&self, context: &ToolContext, args: &Value) -> Result<Value, ToolError> {
        let subject = non_placeholder(args, "subject", "what should the email be about?")?;
        let body = non_placeholder(args, "body", "what should the email say?")?;

        self.email
            .send(subject, body)
            .await
            .map_err(|e| ToolError::failed(format!("email delivery failed: {e}")))?;

        tracing::info!(
            event_name = "agent.tool.email_sent",
            conversation_id = %context.conversation_id,
        );
        Ok(json!({ "status": "sent", "subject": subject }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;

    use concierge_core::domain::agent::{AgentId, PermissionSet};
    use concierge_core::domain::conversation::ConversationId;
    use concierge_core::errors::ToolError;

    use super::SendEmailTool;
    use crate::ports::{EmailPort, PortError};
    use crate::tools::{Tool, ToolContext};

    #[derive(Default)]
    struct RecordingEmailer {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl EmailPort for RecordingEmailer {
        async fn send(&self, subject: &str, body: &str) -> Result<(), PortError> {
            if self.fail {
                return Err(PortError("smtp unavailable".to_string()));
            }
            self.sent.lock().unwrap().push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn context() -> ToolContext {
        ToolContext {
            agent_id: AgentId::new(),
            conversation_id: ConversationId::new(),
            customer_external_id: "cust-1".to_string(),
            today: NaiveDate::from_ymd_opt(2025, 6, 2).expect("date"),
        }
    }

    #[tokio::test]
    async fn sends_and_reports_status() {
        let emailer = Arc::new(RecordingEmailer::default());
        let tool = SendEmailTool::new(emailer.clone());

        let result = tool
            .execute(
                &context(),
                &json!({"subject": "Refund request", "body": "Customer asks for a refund."}),
            )
            .await
            .expect("send");
        assert_eq!(result["status"], "sent");
        assert_eq!(emailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn placeholder_subject_is_rejected() {
        let emailer = Arc::new(RecordingEmailer::default());
        let tool = SendEmailTool::new(emailer.clone());

        let err = tool
            .execute(&context(), &json!({"subject": "subject", "body": "real body"}))
            .await
            .expect_err("placeholder");
        assert!(matches!(err, ToolError::Validation(_)));
        assert!(emailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_surfaces_as_tool_failure() {
        let emailer = Arc::new(RecordingEmailer { fail: true, ..Default::default() });
        let tool = SendEmailTool::new(emailer);

        let err = tool
            .execute(&context(), &json!({"subject": "Refund", "body": "details"}))
            .await
            .expect_err("failure");
        assert!(matches!(err, ToolError::Failed(_)));
    }

    #[test]
    fn gated_behind_the_email_permission() {
        let tool = SendEmailTool::new(Arc::new(RecordingEmailer::default()));
        let mut permissions = PermissionSet::default();
        assert!(!tool.is_permitted(&permissions));
        permissions.send_email = true;
        assert!(tool.is_permitted(&permissions));
    }
}
