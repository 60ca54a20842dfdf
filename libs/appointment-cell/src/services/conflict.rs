// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{AppointmentError, ConflictCheckResponse, TimeInterval};
use crate::services::with_timeout;
use crate::services::store::AppointmentStore;

/// Decides whether a doctor is free for a candidate interval. Read-only.
pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
    timeout: Duration,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Check for active appointments of `doctor_id` overlapping `candidate`.
    /// `exclude_appointment_id` lets an appointment being moved ignore itself.
    pub async fn check_conflicts(
        &self,
        doctor_id: Uuid,
        candidate: &TimeInterval,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        if doctor_id.is_nil() {
            return Err(AppointmentError::InvalidArguments("doctor_id is required".to_string()));
        }

        debug!("Checking conflicts for doctor {} over {}", doctor_id, candidate);

        let existing = with_timeout(
            self.timeout,
            self.store
                .find_active_by_doctor_and_window(doctor_id, candidate, exclude_appointment_id),
        )
        .await?;

        // The store query is only a prefilter; the decision is made here.
        let conflicting_appointments: Vec<_> = existing
            .into_iter()
            .filter(|a| a.is_active())
            .filter(|a| Some(a.id) != exclude_appointment_id)
            .filter(|a| a.interval.overlaps(candidate))
            .collect();

        let has_conflict = !conflicting_appointments.is_empty();
        if has_conflict {
            warn!("Conflict detected for doctor {} - {} conflicting appointments",
                  doctor_id, conflicting_appointments.len());
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
        })
    }

    pub async fn is_available(
        &self,
        doctor_id: Uuid,
        candidate: &TimeInterval,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let response = self.check_conflicts(doctor_id, candidate, exclude_appointment_id).await?;
        Ok(!response.has_conflict)
    }

    /// Same as [`is_available`](Self::is_available) for raw timestamps, as
    /// they arrive from a query string.
    pub async fn is_available_between(
        &self,
        doctor_id: Uuid,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let candidate = TimeInterval::new(start, end)
            .map_err(|e| AppointmentError::InvalidArguments(e.to_string()))?;
        self.is_available(doctor_id, &candidate, exclude_appointment_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

    use crate::models::{Appointment, AppointmentStatus};
    use crate::services::store::InMemoryAppointmentStore;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 7, 1, 10, 0, 0).unwrap() + ChronoDuration::minutes(minute)
    }

    fn booked(doctor_id: Uuid, from: i64, to: i64, status: AppointmentStatus) -> Appointment {
        let mut appointment = Appointment::new(
            doctor_id,
            Uuid::new_v4(),
            TimeInterval::new(at(from), at(to)).unwrap(),
            None,
            Uuid::new_v4(),
            at(-600),
        );
        appointment.status = status;
        if status == AppointmentStatus::Cancelled {
            appointment.cancellation_reason = Some("rebooked".to_string());
        }
        appointment
    }

    fn checker(appointments: Vec<Appointment>) -> ConflictDetectionService {
        ConflictDetectionService::new(
            Arc::new(InMemoryAppointmentStore::with_appointments(appointments)),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_overlap_blocks_and_boundary_does_not() {
        let doctor = Uuid::new_v4();
        let service = checker(vec![booked(doctor, 0, 30, AppointmentStatus::Confirmed)]);

        assert!(!service.is_available_between(doctor, at(15), at(45), None).await.unwrap());
        assert!(service.is_available_between(doctor, at(30), at(60), None).await.unwrap());
        assert!(service.is_available_between(doctor, at(-30), at(0), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_only_active_appointments_block() {
        let doctor = Uuid::new_v4();
        let service = checker(vec![
            booked(doctor, 0, 30, AppointmentStatus::Cancelled),
            booked(doctor, 0, 30, AppointmentStatus::Completed),
            booked(doctor, 0, 30, AppointmentStatus::NoShow),
        ]);

        assert!(service.is_available_between(doctor, at(0), at(30), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_excluded_appointment_does_not_conflict_with_itself() {
        let doctor = Uuid::new_v4();
        let own = booked(doctor, 0, 30, AppointmentStatus::Pending);
        let own_id = own.id;
        let service = checker(vec![own]);

        assert!(!service.is_available_between(doctor, at(0), at(30), None).await.unwrap());
        assert!(service.is_available_between(doctor, at(0), at(30), Some(own_id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_conflict_response_lists_offenders() {
        let doctor = Uuid::new_v4();
        let service = checker(vec![
            booked(doctor, 0, 30, AppointmentStatus::Pending),
            booked(doctor, 30, 60, AppointmentStatus::Confirmed),
            booked(doctor, 90, 120, AppointmentStatus::Confirmed),
        ]);

        let candidate = TimeInterval::new(at(20), at(40)).unwrap();
        let response = service.check_conflicts(doctor, &candidate, None).await.unwrap();

        assert!(response.has_conflict);
        assert_eq!(response.conflicting_appointments.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let service = checker(vec![]);

        assert_matches!(
            service.is_available_between(Uuid::new_v4(), at(30), at(30), None).await,
            Err(AppointmentError::InvalidArguments(_))
        );
        assert_matches!(
            service.is_available_between(Uuid::nil(), at(0), at(30), None).await,
            Err(AppointmentError::InvalidArguments(_))
        );
    }
}
