// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_database::{SupabaseClient, SupabaseError};
use shared_models::auth::User;

use crate::models::{Appointment, AppointmentFilter, AppointmentStatus, TimeInterval};
use crate::services::directory::IdentityDirectory;
use crate::services::store::{AppointmentStore, StatusUpdate, StoreError};

const APPOINTMENTS_PATH: &str = "/rest/v1/appointments";
const BOOK_RPC_PATH: &str = "/rest/v1/rpc/book_appointment_if_available";
const RESCHEDULE_RPC_PATH: &str = "/rest/v1/rpc/reschedule_appointment_if_available";
const USERS_PATH: &str = "/rest/v1/users";

/// PostgREST maps `RAISE SQLSTATE 'PT412'` to this status; the reschedule
/// function uses it when the row no longer has the expected status.
const PRECONDITION_FAILED: u16 = 412;

/// Appointment store over Supabase/PostgREST.
///
/// Conditional writes go through the database functions defined in
/// `migrations/001_appointments.sql`; the exclusion constraint there is what
/// makes them atomic.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// A conditional write matched no row: either the record is gone or it
    /// is no longer in `expected`.
    async fn explain_miss(&self, id: Uuid, expected: AppointmentStatus) -> Result<StoreError, StoreError> {
        Ok(match self.find_by_id(id).await? {
            Some(_) => StoreError::StatusChanged { id, expected },
            None => StoreError::NotFound(id),
        })
    }

    async fn fetch(&self, query: &str) -> Result<Vec<Appointment>, StoreError> {
        let path = format!("{}?{}", APPOINTMENTS_PATH, query);
        self.supabase
            .request::<Vec<Appointment>>(Method::GET, &path, None, None)
            .await
            .map_err(|e| map_error(e, None))
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    urlencoding::encode(&value.to_rfc3339_opts(SecondsFormat::Micros, true)).into_owned()
}

fn active_statuses() -> String {
    AppointmentStatus::ACTIVE
        .iter()
        .map(AppointmentStatus::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn map_error(err: SupabaseError, id: Option<Uuid>) -> StoreError {
    match (err, id) {
        (SupabaseError::Conflict { .. }, _) => StoreError::Conflict,
        (SupabaseError::NotFound(_), Some(id)) => StoreError::NotFound(id),
        (other, _) if other.is_transient() => {
            warn!("Supabase appointment store temporarily unavailable: {}", other);
            StoreError::Unavailable(other.to_string())
        }
        // auth failures, missing tables and constraint violations are permanent
        (other, _) => {
            error!("Supabase appointment store failure: {}", other);
            StoreError::Rejected(other.to_string())
        }
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn find_active_by_doctor_and_window(
        &self,
        doctor_id: Uuid,
        window: &TimeInterval,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let mut query_parts = vec![
            format!("doctor_id=eq.{}", doctor_id),
            format!("status=in.({})", active_statuses()),
            format!("start_time=lt.{}", timestamp(window.end())),
            format!("end_time=gt.{}", timestamp(window.start())),
        ];

        if let Some(exclude_id) = exclude_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }
        query_parts.push("order=start_time.asc".to_string());

        self.fetch(&query_parts.join("&")).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let rows = self.fetch(&format!("id=eq.{}&limit=1", id)).await?;
        Ok(rows.into_iter().next())
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let mut query_parts = Vec::new();
        if let Some(doctor_id) = filter.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = filter.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(status) = filter.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        query_parts.push("order=start_time.asc".to_string());

        self.fetch(&query_parts.join("&")).await
    }

    async fn insert_if_available(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        debug!("Booking appointment {} through {}", appointment.id, BOOK_RPC_PATH);

        let body = json!({ "appointment": appointment });
        self.supabase
            .request::<Appointment>(Method::POST, BOOK_RPC_PATH, None, Some(body))
            .await
            .map_err(|e| map_error(e, Some(appointment.id)))
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        update: StatusUpdate,
    ) -> Result<Appointment, StoreError> {
        let path = format!("{}?id=eq.{}&status=eq.{}", APPOINTMENTS_PATH, id, expected);
        let body = json!({
            "status": update.status,
            "cancellation_reason": update.cancellation_reason,
            "updated_by": update.updated_by,
            "updated_at": update.updated_at,
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::PATCH, &path, None, Some(body))
            .await
            .map_err(|e| map_error(e, Some(id)))?;

        match rows.into_iter().next() {
            Some(updated) => Ok(updated),
            None => Err(self.explain_miss(id, expected).await?),
        }
    }

    async fn reschedule_if_available(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        interval: TimeInterval,
        updated_by: Uuid,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError> {
        let body = json!({
            "p_id": id,
            "p_expected_status": expected,
            "p_start_time": interval.start(),
            "p_end_time": interval.end(),
            "p_updated_by": updated_by,
            "p_updated_at": updated_at,
        });

        self.supabase
            .request::<Appointment>(Method::POST, RESCHEDULE_RPC_PATH, None, Some(body))
            .await
            .map_err(|e| match e {
                SupabaseError::Api { status: PRECONDITION_FAILED, .. } => {
                    StoreError::StatusChanged { id, expected }
                }
                other => map_error(other, Some(id)),
            })
    }

    async fn delete(&self, id: Uuid, expected: AppointmentStatus) -> Result<(), StoreError> {
        let path = format!("{}?id=eq.{}&status=eq.{}", APPOINTMENTS_PATH, id, expected);
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::DELETE, &path, None, None)
            .await
            .map_err(|e| map_error(e, Some(id)))?;

        if rows.is_empty() {
            Err(self.explain_miss(id, expected).await?)
        } else {
            Ok(())
        }
    }
}

/// User lookups against the `users` table.
pub struct SupabaseDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl IdentityDirectory for SupabaseDirectory {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let path = format!(
            "{}?id=eq.{}&select=id,name,email,role,is_active,created_at&limit=1",
            USERS_PATH, user_id
        );

        let users: Vec<User> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| map_error(e, Some(user_id)))?;

        Ok(users.into_iter().next())
    }
}
