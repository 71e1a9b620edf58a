//! Per-conversation keyed mutex registry. One inbound event per
//! (agent, customer) pair runs at a time; entries are created lazily and
//! swept once nothing else holds them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;

use concierge_core::domain::agent::AgentId;

type Key = (AgentId, String);

#[derive(Default)]
pub struct ConversationLocks {
    entries: Mutex<HashMap<Key, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one conversation. The guard serializes every
    /// turn for that (agent, customer) pair.
    pub async fn acquire(&self, agent_id: AgentId, customer_external_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut entries = match self.entries.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Sweep uncontended entries; the map itself holds the only Arc.
            entries.retain(|_, lock| Arc::strong_count(lock) > 1);
            entries
                .entry((agent_id, customer_external_id.to_string()))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
