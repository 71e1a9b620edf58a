use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComplimentId(pub Uuid);

impl ComplimentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ComplimentId {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable record of positive customer feedback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Compliment {
    pub id: ComplimentId,
    pub agent_id: AgentId,
    pub customer_external_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Compliment {
    pub fn new(
        agent_id: AgentId,
        customer_external_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: ComplimentId::new(),
            agent_id,
            customer_external_id: customer_external_id.into(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}
