use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use concierge_core::booking::BookedSlot;
use concierge_core::domain::agent::AgentId;
use concierge_core::domain::appointment::{
    Appointment, AppointmentId, AppointmentStatus, CreatedVia,
};

use super::agent::parse_uuid;
use super::{AppointmentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAppointmentRepository {
    pool: DbPool,
}

impl SqlAppointmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const APPOINTMENT_COLUMNS: &str = "id, agent_id, account_id, customer_external_id, customer_name,
    date, start_minute, duration_minutes, subject, status, created_via,
    cancellation_reason, created_at";

#[async_trait::async_trait]
impl AppointmentRepository for SqlAppointmentRepository {
    async fn booked_slots(
        &self,
        agent_id: AgentId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BookedSlot>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT date, start_minute, duration_minutes FROM appointment
             WHERE agent_id = ? AND date BETWEEN ? AND ? AND status != 'cancelled'
             ORDER BY date, start_minute",
        )
        .bind(agent_id.0.to_string())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(BookedSlot {
                    date: row.try_get::<NaiveDate, _>("date")?,
                    start_minute: minute_from_row(&row, "start_minute")?,
                    duration_minutes: minute_from_row(&row, "duration_minutes")?,
                })
            })
            .collect()
    }

    async fn create_if_free(&self, appointment: &Appointment) -> Result<(), RepositoryError> {
        // The overlap check and the insert run as one statement, so two
        // racing creates for the same window cannot both commit. The partial
        // unique index on (agent_id, date, start_minute) backstops the
        // exact-slot case.
        let result = sqlx::query(
            "INSERT INTO appointment (
                id, agent_id, account_id, customer_external_id, customer_name,
                date, start_minute, duration_minutes, subject, status,
                created_via, cancellation_reason, created_at
             )
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE NOT EXISTS (
                SELECT 1 FROM appointment
                WHERE agent_id = ?
                  AND date = ?
                  AND status != 'cancelled'
                  AND start_minute < ?
                  AND ? < start_minute + duration_minutes
             )",
        )
        .bind(appointment.id.0.to_string())
        .bind(appointment.agent_id.map(|id| id.0.to_string()))
        .bind(appointment.account_id.map(|id| id.to_string()))
        .bind(&appointment.customer_external_id)
        .bind(&appointment.customer_name)
        .bind(appointment.date)
        .bind(i64::from(appointment.start_minute))
        .bind(i64::from(appointment.duration_minutes))
        .bind(&appointment.subject)
        .bind(appointment.status.as_str())
        .bind(appointment.created_via.as_str())
        .bind(&appointment.cancellation_reason)
        .bind(appointment.created_at)
        .bind(appointment.agent_id.map(|id| id.0.to_string()))
        .bind(appointment.date)
        .bind(i64::from(appointment.end_minute()))
        .bind(i64::from(appointment.start_minute))
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(()),
            Ok(_) => Err(RepositoryError::Conflict(format!(
                "slot {} on {} is already booked",
                appointment.start_minute, appointment.date
            ))),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RepositoryError::Conflict(format!(
                    "slot {} on {} is already booked",
                    appointment.start_minute, appointment.date
                )))
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn find_by_id(
        &self,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE id = ?"
        ))
        .bind(id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(appointment_from_row).transpose()
    }

    async fn update_status(&self, appointment: &Appointment) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE appointment SET status = ?, cancellation_reason = ? WHERE id = ?",
        )
        .bind(appointment.status.as_str())
        .bind(&appointment.cancellation_reason)
        .bind(appointment.id.0.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_customer(
        &self,
        agent_id: AgentId,
        customer_external_id: &str,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment
             WHERE agent_id = ? AND customer_external_id = ?
             ORDER BY date, start_minute"
        ))
        .bind(agent_id.0.to_string())
        .bind(customer_external_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(appointment_from_row).collect()
    }
}

fn minute_from_row(row: &SqliteRow, column: &str) -> Result<u16, RepositoryError> {
    let value: i64 = row.try_get(column)?;
    u16::try_from(value)
        .map_err(|_| RepositoryError::decode(format!("{column} out of range: {value}")))
}

fn appointment_from_row(row: SqliteRow) -> Result<Appointment, RepositoryError> {
    let id: String = row.try_get("id")?;
    let agent_id: Option<String> = row.try_get("agent_id")?;
    let account_id: Option<String> = row.try_get("account_id")?;
    let status: String = row.try_get("status")?;
    let created_via: String = row.try_get("created_via")?;

    Ok(Appointment {
        id: AppointmentId(parse_uuid(&id)?),
        agent_id: agent_id.as_deref().map(parse_uuid).transpose()?.map(AgentId),
        account_id: account_id.as_deref().map(parse_uuid).transpose()?,
        customer_external_id: row.try_get("customer_external_id")?,
        customer_name: row.try_get("customer_name")?,
        date: row.try_get::<NaiveDate, _>("date")?,
        start_minute: minute_from_row(&row, "start_minute")?,
        duration_minutes: minute_from_row(&row, "duration_minutes")?,
        subject: row.try_get("subject")?,
        status: AppointmentStatus::parse(&status)
            .ok_or_else(|| RepositoryError::decode(format!("unknown status `{status}`")))?,
        created_via: CreatedVia::parse(&created_via)
            .ok_or_else(|| RepositoryError::decode(format!("unknown origin `{created_via}`")))?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
