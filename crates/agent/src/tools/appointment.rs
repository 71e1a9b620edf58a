use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use serde_json::{json, Value};

use concierge_core::booking::{self, BookedSlot, BusinessHours, SlotRequest};
use concierge_core::config::BookingConfig;
use concierge_core::domain::agent::PermissionSet;
use concierge_core::domain::appointment::{
    format_minute, parse_minute, Appointment, AppointmentId, AppointmentStatus, CreatedVia,
};
use concierge_core::errors::ToolError;
use concierge_db::repositories::{AppointmentRepository, RepositoryError};

use super::{non_placeholder, optional_str, ParamSpec, Tool, ToolContext, ToolSchema};
use crate::ports::EmailPort;

const DEFAULT_DURATION_MINUTES: u16 = 30;

const SCHEMA: ToolSchema = ToolSchema {
    name: "manage_appointment",
    description: "Manage appointments for the customer. Actions: \
        'check_availability' checks a date (and optionally a time) and lists free slots; \
        always check before creating. 'create' books an appointment and requires \
        customer_name, customer_surname, date, time and subject; ask the customer for \
        anything missing before calling. 'cancel' cancels by appointment id. 'list' shows \
        the customer's upcoming appointments. 'complete' marks a past appointment done.",
    params: &[
        ParamSpec::one_of(
            "action",
            true,
            "The action to perform",
            &["check_availability", "create", "cancel", "list", "complete"],
        ),
        ParamSpec::string("date", false, "Appointment date, YYYY-MM-DD"),
        ParamSpec::string("time", false, "Appointment start time, HH:MM 24h"),
        ParamSpec::string("customer_name", false, "Customer's first name (create)"),
        ParamSpec::string("customer_surname", false, "Customer's surname (create)"),
        ParamSpec::string("subject", false, "Reason for the appointment (create)"),
        ParamSpec::integer("duration_minutes", false, "Duration in minutes (default 30)"),
        ParamSpec::string("appointment_id", false, "Appointment id (cancel, complete)"),
        ParamSpec::string("reason", false, "Cancellation reason"),
    ],
};

pub struct ManageAppointmentTool {
    appointments: Arc<dyn AppointmentRepository>,
    email: Arc<dyn EmailPort>,
    booking: BookingConfig,
}

impl ManageAppointmentTool {
    pub fn new(
        appointments: Arc<dyn AppointmentRepository>,
        email: Arc<dyn EmailPort>,
        booking: BookingConfig,
    ) -> Self {
        Self { appointments, email, booking }
    }

    fn hours(&self) -> BusinessHours {
        self.booking.business_hours()
    }

    fn parse_date(&self, args: &Value, today: NaiveDate) -> Result<NaiveDate, ToolError> {
        let raw = optional_str(args, "date")
            .ok_or_else(|| ToolError::validation("`date` is required for this action"))?;
        let date: NaiveDate = raw
            .parse()
            .map_err(|_| ToolError::validation("`date` must be formatted YYYY-MM-DD"))?;
        if date < today {
            return Err(ToolError::validation("the requested date is in the past"));
        }
        Ok(date)
    }

    async fn booked_window(
        &self,
        context: &ToolContext,
        from: NaiveDate,
    ) -> Result<Vec<BookedSlot>, ToolError> {
        let to = from
            .checked_add_days(Days::new(u64::from(self.booking.suggestion_horizon_days)))
            .unwrap_or(from);
        self.appointments
            .booked_slots(context.agent_id, from, to)
            .await
            .map_err(|e| ToolError::failed(format!("could not load the calendar: {e}")))
    }

    async fn check_availability(
        &self,
        context: &ToolContext,
        args: &Value,
    ) -> Result<Value, ToolError> {
        let date = self.parse_date(args, context.today)?;
        let duration = duration_from(args)?;
        let booked = self.booked_window(context, date).await?;
        let hours = self.hours();

        if let Some(raw_time) = optional_str(args, "time") {
            let start_minute = parse_time(raw_time)?;
            let request = SlotRequest { date, start_minute, duration_minutes: duration };
            let availability = booking::check_availability(
                &request,
                &booked,
                &hours,
                self.booking.suggestion_horizon_days,
                self.booking.max_suggestions,
            );
            return Ok(json!({
                "date": date.to_string(),
                "time": format_minute(start_minute),
                "available": availability.available,
                "conflicts": availability.conflicts.iter().map(|slot| json!({
                    "time": format_minute(slot.start_minute),
                    "end_time": format_minute(slot.end_minute()),
                })).collect::<Vec<_>>(),
                "available_slots": availability.suggestions.iter()
                    .map(format_suggestion)
                    .collect::<Vec<_>>(),
            }));
        }

        let free = booking::free_starts_on(date, duration, &booked, &hours);
        Ok(json!({
            "date": date.to_string(),
            "available": !free.is_empty(),
            "available_slots": free.iter().map(|minute| format_minute(*minute)).collect::<Vec<_>>(),
        }))
    }

    async fn create(&self, context: &ToolContext, args: &Value) -> Result<Value, ToolError> {
        let first_name = non_placeholder(args, "customer_name", "what is your first name?")?;
        let surname = non_placeholder(args, "customer_surname", "what is your surname?")?;
        let subject =
            non_placeholder(args, "subject", "what is the reason for your appointment?")?;
        let date = self.parse_date(args, context.today)?;
        let raw_time = optional_str(args, "time")
            .ok_or_else(|| ToolError::validation("`time` is required to create an appointment"))?;
        let start_minute = parse_time(raw_time)?;
        let duration = duration_from(args)?;

        let hours = self.hours();
        if !hours.fits(start_minute, duration) {
            return Err(ToolError::validation(format!(
                "appointments must fall between {} and {}",
                format_minute(hours.open_minute),
                format_minute(hours.close_minute)
            )));
        }

        let appointment = Appointment {
            id: AppointmentId::new(),
            agent_id: Some(context.agent_id),
            account_id: None,
            customer_external_id: context.customer_external_id.clone(),
            customer_name: format!("{first_name} {surname}"),
            date,
            start_minute,
            duration_minutes: duration,
            subject: subject.to_string(),
            status: AppointmentStatus::Confirmed,
            created_via: CreatedVia::Chatbot,
            cancellation_reason: None,
            created_at: Utc::now(),
        };

        match self.appointments.create_if_free(&appointment).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict(_)) => {
                let booked = self.booked_window(context, date).await?;
                let request = SlotRequest { date, start_minute, duration_minutes: duration };
                let suggestions = booking::suggest_slots(
                    &request,
                    &booked,
                    &hours,
                    self.booking.suggestion_horizon_days,
                    self.booking.max_suggestions,
                );
                return Err(ToolError::Conflict {
                    message: format!(
                        "{} on {} conflicts with an existing appointment",
                        format_minute(start_minute),
                        date
                    ),
                    suggestions: suggestions.iter().map(format_suggestion).collect(),
                });
            }
            Err(other) => {
                return Err(ToolError::failed(format!("could not save the appointment: {other}")))
            }
        }

        // Owner notification is best-effort; the booking already committed.
        if let Err(err) = self
            .email
            .send(
                &format!("New appointment on {} at {}", date, format_minute(start_minute)),
                &format!(
                    "{} booked \"{}\" on {} at {} ({} minutes).",
                    appointment.customer_name,
                    subject,
                    date,
                    format_minute(start_minute),
                    duration
                ),
            )
            .await
        {
            tracing::warn!(
                event_name = "agent.tool.owner_email_failed",
                appointment_id = %appointment.id,
                error = %err,
            );
        }

        tracing::info!(
            event_name = "agent.tool.appointment_created",
            appointment_id = %appointment.id,
            date = %date,
            start = %format_minute(start_minute),
        );

        Ok(json!({
            "status": "confirmed",
            "appointment_id": appointment.id.to_string(),
            "customer_name": appointment.customer_name,
            "date": date.to_string(),
            "time": format_minute(start_minute),
            "duration_minutes": duration,
            "subject": subject,
        }))
    }

    async fn cancel(&self, context: &ToolContext, args: &Value) -> Result<Value, ToolError> {
        let appointment = self.owned_appointment(context, args).await?;
        let reason = optional_str(args, "reason").unwrap_or("cancelled via chat");

        let mut updated = appointment;
        updated
            .cancel(reason)
            .map_err(|e| ToolError::validation(e.to_string()))?;
        self.appointments
            .update_status(&updated)
            .await
            .map_err(|e| ToolError::failed(format!("could not cancel: {e}")))?;

        tracing::info!(
            event_name = "agent.tool.appointment_cancelled",
            appointment_id = %updated.id,
        );
        Ok(json!({ "status": "cancelled", "appointment_id": updated.id.to_string() }))
    }

    async fn complete(&self, context: &ToolContext, args: &Value) -> Result<Value, ToolError> {
        let mut appointment = self.owned_appointment(context, args).await?;
        appointment.complete().map_err(|e| ToolError::validation(e.to_string()))?;
        self.appointments
            .update_status(&appointment)
            .await
            .map_err(|e| ToolError::failed(format!("could not complete: {e}")))?;
        Ok(json!({ "status": "completed", "appointment_id": appointment.id.to_string() }))
    }

    async fn list(&self, context: &ToolContext) -> Result<Value, ToolError> {
        let appointments = self
            .appointments
            .list_for_customer(context.agent_id, &context.customer_external_id)
            .await
            .map_err(|e| ToolError::failed(format!("could not list appointments: {e}")))?;

        let upcoming: Vec<Value> = appointments
            .iter()
            .filter(|appt| {
                appt.status == AppointmentStatus::Confirmed && appt.date >= context.today
            })
            .map(|appt| {
                json!({
                    "id": appt.id.to_string(),
                    "date": appt.date.to_string(),
                    "time": format_minute(appt.start_minute),
                    "subject": appt.subject,
                })
            })
            .collect();

        if upcoming.is_empty() {
            return Ok(json!({ "count": 0, "message": "No upcoming appointments found." }));
        }
        Ok(json!({ "count": upcoming.len(), "appointments": upcoming }))
    }

    /// Resolve `appointment_id` and verify it belongs to this agent and
    /// customer.
    async fn owned_appointment(
        &self,
        context: &ToolContext,
        args: &Value,
    ) -> Result<Appointment, ToolError> {
        let raw = optional_str(args, "appointment_id").ok_or_else(|| {
            ToolError::validation(
                "`appointment_id` is required; use the `list` action to find it first",
            )
        })?;
        let id = raw
            .parse()
            .map(AppointmentId)
            .map_err(|_| ToolError::validation("`appointment_id` is not a valid id"))?;

        let appointment = self
            .appointments
            .find_by_id(&id)
            .await
            .map_err(|e| ToolError::failed(format!("could not load the appointment: {e}")))?
            .ok_or_else(|| ToolError::validation("appointment not found"))?;

        if appointment.agent_id != Some(context.agent_id)
            || appointment.customer_external_id != context.customer_external_id
        {
            return Err(ToolError::validation("appointment not found"));
        }
        Ok(appointment)
    }
}

fn parse_time(raw: &str) -> Result<u16, ToolError> {
    parse_minute(raw).ok_or_else(|| ToolError::validation("`time` must be formatted HH:MM (24h)"))
}

fn duration_from(args: &Value) -> Result<u16, ToolError> {
    match args.get("duration_minutes").and_then(Value::as_i64) {
        None => Ok(DEFAULT_DURATION_MINUTES),
        Some(minutes) if (5..=480).contains(&minutes) => Ok(minutes as u16),
        Some(_) => Err(ToolError::validation("`duration_minutes` must be between 5 and 480")),
    }
}

fn format_suggestion(slot: &concierge_core::booking::SuggestedSlot) -> String {
    format!("{} {}", slot.date, format_minute(slot.start_minute))
}

#[async_trait]
impl Tool for ManageAppointmentTool {
    fn schema(&self) -> &ToolSchema {
        &SCHEMA
    }

    fn is_permitted(&self, permissions: &PermissionSet) -> bool {
        permissions.manage_appointments
    }

    async fn execute(&self, context: &ToolContext, args: &Value) -> Result<Value, ToolError> {
        match args.get("action").and_then(Value::as_str).unwrap_or_default() {
            "check_availability" => self.check_availability(context, args).await,
            "create" => self.create(context, args).await,
            "cancel" => self.cancel(context, args).await,
            "complete" => self.complete(context, args).await,
            "list" => self.list(context).await,
            other => Err(ToolError::validation(format!("unknown action `{other}`"))),
        }
    }
}
