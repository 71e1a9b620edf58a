use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Which tools an agent may use. A disabled permission removes the tool from
/// the set offered to the model entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default = "default_true")]
    pub read_messages: bool,
    #[serde(default = "default_true")]
    pub write_messages: bool,
    #[serde(default)]
    pub send_email: bool,
    #[serde(default)]
    pub manage_appointments: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self {
            read_messages: true,
            write_messages: true,
            send_email: false,
            manage_appointments: false,
        }
    }
}

/// Per-agent model parameters. `provider` selects the chat-completion
/// adapter at orchestration time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Channel identity inbound events are routed by (one agent per key).
    pub routing_key: String,
    pub name: String,
    pub system_context: String,
    pub permissions: PermissionSet,
    pub llm: LlmSettings,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        routing_key: impl Into<String>,
        name: impl Into<String>,
        system_context: impl Into<String>,
    ) -> Self {
        Self {
            id: AgentId::new(),
            routing_key: routing_key.into(),
            name: name.into(),
            system_context: system_context.into(),
            permissions: PermissionSet::default(),
            llm: LlmSettings::default(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PermissionSet;

    #[test]
    fn missing_permission_fields_default_sensibly() {
        let permissions: PermissionSet = serde_json::from_str("{}").expect("parse");
        assert!(permissions.read_messages);
        assert!(permissions.write_messages);
        assert!(!permissions.send_email);
        assert!(!permissions.manage_appointments);
    }
}
