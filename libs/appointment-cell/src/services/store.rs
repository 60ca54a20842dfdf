// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentFilter, AppointmentStatus, TimeInterval};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("An overlapping active appointment already exists")]
    Conflict,

    #[error("Appointment {0} not found")]
    NotFound(Uuid),

    #[error("Appointment {id} is no longer {expected}")]
    StatusChanged { id: Uuid, expected: AppointmentStatus },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store answered and refused the request; repeating it will not help.
    #[error("Store rejected request: {0}")]
    Rejected(String),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AppointmentError::SchedulingConflict,
            StoreError::NotFound(id) => AppointmentError::NotFound(format!("Appointment {}", id)),
            // a concurrent writer got there first; retrying re-reads the record
            StoreError::StatusChanged { .. } => AppointmentError::StoreUnavailable(err.to_string()),
            StoreError::Unavailable(msg) => AppointmentError::StoreUnavailable(msg),
            StoreError::Rejected(msg) => AppointmentError::StoreRejected(msg),
        }
    }
}

/// Fields written by a status transition.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub updated_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Persistence boundary for appointments.
///
/// `insert_if_available` and `reschedule_if_available` must re-check for an
/// overlapping active appointment of the same doctor and commit in one atomic
/// step; the availability check done beforehand is not enough on its own
/// when two requests race for the same slot.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Active appointments of `doctor_id` that may intersect `window`,
    /// ordered by start time.
    async fn find_active_by_doctor_and_window(
        &self,
        doctor_id: Uuid,
        window: &TimeInterval,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;

    async fn insert_if_available(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    /// Apply `update` only while the stored status still equals `expected`.
    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        update: StatusUpdate,
    ) -> Result<Appointment, StoreError>;

    async fn reschedule_if_available(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        interval: TimeInterval,
        updated_by: Uuid,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError>;

    /// Remove the record only while its status still equals `expected`.
    async fn delete(&self, id: Uuid, expected: AppointmentStatus) -> Result<(), StoreError>;
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

/// Store backed by a map behind one async `RwLock`. Conditional writes hold
/// the write lock across check and commit.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed records as-is, bypassing every check. Meant for fixtures.
    pub fn with_appointments(appointments: impl IntoIterator<Item = Appointment>) -> Self {
        let map = appointments.into_iter().map(|a| (a.id, a)).collect();
        Self {
            appointments: RwLock::new(map),
        }
    }

    pub async fn snapshot(&self) -> Vec<Appointment> {
        let mut all: Vec<Appointment> = self.appointments.read().await.values().cloned().collect();
        all.sort_by_key(|a| (a.interval.start(), a.id));
        all
    }

    fn has_overlap(
        appointments: &HashMap<Uuid, Appointment>,
        doctor_id: Uuid,
        interval: &TimeInterval,
        exclude_id: Option<Uuid>,
    ) -> bool {
        appointments.values().any(|existing| {
            existing.doctor_id == doctor_id
                && existing.is_active()
                && Some(existing.id) != exclude_id
                && existing.interval.overlaps(interval)
        })
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn find_active_by_doctor_and_window(
        &self,
        doctor_id: Uuid,
        window: &TimeInterval,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let appointments = self.appointments.read().await;
        let mut found: Vec<Appointment> = appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.is_active())
            .filter(|a| Some(a.id) != exclude_id)
            .filter(|a| a.interval.overlaps(window))
            .cloned()
            .collect();
        found.sort_by_key(|a| a.interval.start());
        Ok(found)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let mut found: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.interval.start(), a.id));
        Ok(found)
    }

    async fn insert_if_available(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;

        if appointment.is_active()
            && Self::has_overlap(&appointments, appointment.doctor_id, &appointment.interval, None)
        {
            debug!("Rejecting insert of {} - doctor {} is busy", appointment.id, appointment.doctor_id);
            return Err(StoreError::Conflict);
        }

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        update: StatusUpdate,
    ) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if appointment.status != expected {
            return Err(StoreError::StatusChanged { id, expected });
        }

        appointment.status = update.status;
        appointment.cancellation_reason = update.cancellation_reason;
        appointment.updated_by = update.updated_by;
        appointment.updated_at = update.updated_at;
        Ok(appointment.clone())
    }

    async fn reschedule_if_available(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        interval: TimeInterval,
        updated_by: Uuid,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;

        let doctor_id = match appointments.get(&id) {
            Some(current) if current.status != expected => {
                return Err(StoreError::StatusChanged { id, expected });
            }
            Some(current) => current.doctor_id,
            None => return Err(StoreError::NotFound(id)),
        };

        if Self::has_overlap(&appointments, doctor_id, &interval, Some(id)) {
            return Err(StoreError::Conflict);
        }

        let appointment = appointments.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        appointment.interval = interval;
        appointment.updated_by = updated_by;
        appointment.updated_at = updated_at;
        Ok(appointment.clone())
    }

    async fn delete(&self, id: Uuid, expected: AppointmentStatus) -> Result<(), StoreError> {
        let mut appointments = self.appointments.write().await;

        match appointments.get(&id) {
            None => Err(StoreError::NotFound(id)),
            Some(current) if current.status != expected => Err(StoreError::StatusChanged { id, expected }),
            Some(_) => {
                appointments.remove(&id);
                Ok(())
            }
        }
    }
}
