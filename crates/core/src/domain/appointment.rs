use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppointmentId(pub Uuid);

impl AppointmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AppointmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::NoShow => "no_show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            "no_show" => Some(Self::NoShow),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedVia {
    Chatbot,
    Manual,
}

impl CreatedVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chatbot => "chatbot",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "chatbot" => Some(Self::Chatbot),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// A booked calendar entry. `agent_id` and `account_id` are independently
/// nullable: appointments outlive the agent that created them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub agent_id: Option<AgentId>,
    pub account_id: Option<Uuid>,
    pub customer_external_id: String,
    pub customer_name: String,
    pub date: NaiveDate,
    pub start_minute: u16,
    pub duration_minutes: u16,
    pub subject: String,
    pub status: AppointmentStatus,
    pub created_via: CreatedVia,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_minute(&self) -> u16 {
        self.start_minute.saturating_add(self.duration_minutes)
    }

    /// Half-open interval overlap with another appointment on the same
    /// agent's calendar. Cancelled entries never conflict.
    pub fn conflicts_with(&self, other: &Appointment) -> bool {
        self.agent_id.is_some()
            && self.agent_id == other.agent_id
            && self.date == other.date
            && self.status != AppointmentStatus::Cancelled
            && other.status != AppointmentStatus::Cancelled
            && self.start_minute < other.end_minute()
            && other.start_minute < self.end_minute()
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        matches!(
            (self.status, next),
            (AppointmentStatus::Confirmed, AppointmentStatus::Cancelled)
                | (AppointmentStatus::Confirmed, AppointmentStatus::Completed)
                | (AppointmentStatus::Confirmed, AppointmentStatus::NoShow)
        )
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition_to(AppointmentStatus::Cancelled)?;
        self.cancellation_reason = Some(reason.into());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.transition_to(AppointmentStatus::Completed)
    }

    fn transition_to(&mut self, next: AppointmentStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidAppointmentTransition { from: self.status, to: next })
    }
}

/// Render minutes-from-midnight as "HH:MM".
pub fn format_minute(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Parse "HH:MM" (24h) into minutes from midnight.
pub fn parse_minute(value: &str) -> Option<u16> {
    let (hours, minutes) = value.split_once(':')?;
    let hours: u16 = hours.trim().parse().ok()?;
    let minutes: u16 = minutes.trim().parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}
