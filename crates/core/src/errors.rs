use thiserror::Error;

use crate::domain::appointment::AppointmentStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid appointment transition from {from:?} to {to:?}")]
    InvalidAppointmentTransition { from: AppointmentStatus, to: AppointmentStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Tool-level failures. These stay inside the round loop: each variant is
/// rendered into a tool-result entry and handed back to the model, never
/// raised to the caller of `handle`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid tool arguments: {0}")]
    Validation(String),
    #[error("tool `{tool}` is not enabled for this agent")]
    Permission { tool: String },
    #[error("scheduling conflict: {message}")]
    Conflict { message: String, suggestions: Vec<String> },
    #[error("tool execution failed: {0}")]
    Failed(String),
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Validation and permission failures are deterministic; retrying the
    /// same call cannot succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
