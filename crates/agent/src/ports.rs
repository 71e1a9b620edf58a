//! Outward-facing collaborator traits. Transport details (SMTP, messaging
//! platforms) stay outside this crate; the no-op implementations keep the
//! orchestrator runnable without them.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("port error: {0}")]
pub struct PortError(pub String);

/// Owner-facing notification email.
#[async_trait]
pub trait EmailPort: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), PortError>;
}

/// Outbound customer delivery, one segment at a time, in order.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    async fn deliver(&self, customer_external_id: &str, segment: &str) -> Result<(), PortError>;
}

#[derive(Default)]
pub struct NoopEmailer;

#[async_trait]
impl EmailPort for NoopEmailer {
    async fn send(&self, subject: &str, _body: &str) -> Result<(), PortError> {
        tracing::debug!(event_name = "agent.email.noop", subject);
        Ok(())
    }
}

#[derive(Default)]
pub struct NoopDelivery;

#[async_trait]
impl DeliveryPort for NoopDelivery {
    async fn deliver(&self, customer_external_id: &str, segment: &str) -> Result<(), PortError> {
        tracing::debug!(
            event_name = "agent.delivery.noop",
            customer = customer_external_id,
            chars = segment.chars().count(),
        );
        Ok(())
    }
}
