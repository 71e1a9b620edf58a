//! Tool registry: a closed set of tools registered at startup, each with a
//! flat parameter schema and a required permission. Validation is
//! deterministic and happens before any side effect.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use concierge_core::domain::agent::{AgentId, PermissionSet};
use concierge_core::domain::conversation::ConversationId;
use concierge_core::errors::ToolError;

use crate::llm::ToolSpec;

pub mod appointment;
pub mod compliment;
pub mod email;
pub mod knowledge;

pub use appointment::ManageAppointmentTool;
pub use compliment::CollectComplimentTool;
pub use email::SendEmailTool;
pub use knowledge::SearchKnowledgeTool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
}

/// One parameter in a flat schema: name to (type, required). No nesting.
#[derive(Clone, Copy, Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
    pub allowed: Option<&'static [&'static str]>,
}

impl ParamSpec {
    pub const fn string(name: &'static str, required: bool, description: &'static str) -> Self {
        Self { name, kind: ParamKind::String, required, description, allowed: None }
    }

    pub const fn integer(name: &'static str, required: bool, description: &'static str) -> Self {
        Self { name, kind: ParamKind::Integer, required, description, allowed: None }
    }

    pub const fn one_of(
        name: &'static str,
        required: bool,
        description: &'static str,
        allowed: &'static [&'static str],
    ) -> Self {
        Self { name, kind: ParamKind::String, required, description, allowed: Some(allowed) }
    }
}

#[derive(Clone, Debug)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl ToolSchema {
    /// Reject unknown keys, missing required keys, wrong primitive types and
    /// out-of-set enum values.
    pub fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let object = args
            .as_object()
            .ok_or_else(|| ToolError::validation("arguments must be a JSON object"))?;

        for key in object.keys() {
            if !self.params.iter().any(|param| param.name == key) {
                return Err(ToolError::validation(format!("unknown argument `{key}`")));
            }
        }

        for param in self.params {
            match object.get(param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        return Err(ToolError::validation(format!(
                            "missing required argument `{}`",
                            param.name
                        )));
                    }
                }
                Some(value) => match param.kind {
                    ParamKind::String => {
                        let text = value.as_str().ok_or_else(|| {
                            ToolError::validation(format!("`{}` must be a string", param.name))
                        })?;
                        if let Some(allowed) = param.allowed {
                            if !allowed.contains(&text) {
                                return Err(ToolError::validation(format!(
                                    "`{}` must be one of: {}",
                                    param.name,
                                    allowed.join(", ")
                                )));
                            }
                        }
                    }
                    ParamKind::Integer => {
                        if !value.is_i64() && !value.is_u64() {
                            return Err(ToolError::validation(format!(
                                "`{}` must be an integer",
                                param.name
                            )));
                        }
                    }
                },
            }
        }
        Ok(())
    }

    /// Render as the JSON schema shape OpenAI-compatible providers expect.
    pub fn to_spec(&self) -> ToolSpec {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in self.params {
            let mut spec = serde_json::Map::new();
            spec.insert(
                "type".to_string(),
                Value::String(
                    match param.kind {
                        ParamKind::String => "string",
                        ParamKind::Integer => "integer",
                    }
                    .to_string(),
                ),
            );
            spec.insert("description".to_string(), Value::String(param.description.to_string()));
            if let Some(allowed) = param.allowed {
                spec.insert(
                    "enum".to_string(),
                    Value::Array(allowed.iter().map(|v| Value::String(v.to_string())).collect()),
                );
            }
            properties.insert(param.name.to_string(), Value::Object(spec));
            if param.required {
                required.push(Value::String(param.name.to_string()));
            }
        }

        ToolSpec {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

/// Execution context handed to every tool. `today` is injected so date
/// validation stays deterministic in tests.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub agent_id: AgentId,
    pub conversation_id: ConversationId,
    pub customer_external_id: String,
    pub today: NaiveDate,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> &ToolSchema;

    /// Permission gate. Read/write message permissions are checked before
    /// the loop starts; this covers tool-specific grants.
    fn is_permitted(&self, permissions: &PermissionSet) -> bool;

    async fn execute(&self, context: &ToolContext, args: &Value) -> Result<Value, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.schema().name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Schemas offered to the model: a disabled permission removes the tool
    /// from the set entirely.
    pub fn specs_for(&self, permissions: &PermissionSet) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .filter(|tool| tool.is_permitted(permissions))
            .map(|tool| tool.schema().to_spec())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Validate and run one requested call. Unknown tools and revoked
    /// permissions surface as tool errors, never as panics or turn aborts.
    pub async fn dispatch(
        &self,
        name: &str,
        args: &Value,
        permissions: &PermissionSet,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let Some(tool) = self.get(name) else {
            return Err(ToolError::validation(format!("unknown tool `{name}`")));
        };
        if !tool.is_permitted(permissions) {
            return Err(ToolError::Permission { tool: name.to_string() });
        }
        tool.schema().validate(args)?;
        tool.execute(context, args).await
    }
}

/// Values the model fills in when it does not actually know an answer.
/// Treated as missing so the model is pushed back to ask the customer.
pub(crate) const PLACEHOLDER_VALUES: &[&str] = &[
    "", "required", "unknown", "n/a", "none", "tbd", "null", "undefined", "customer", "name",
    "surname", "subject",
];

pub(crate) fn non_placeholder<'a>(
    args: &'a Value,
    key: &str,
    prompt: &str,
) -> Result<&'a str, ToolError> {
    let value = args.get(key).and_then(Value::as_str).unwrap_or("").trim();
    if PLACEHOLDER_VALUES.contains(&value.to_ascii_lowercase().as_str()) {
        return Err(ToolError::validation(format!(
            "`{key}` is not known yet; ask the customer: {prompt}"
        )));
    }
    Ok(value)
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}
