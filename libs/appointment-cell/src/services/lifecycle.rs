// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{normalize_text, Appointment, AppointmentError, AppointmentStatus};

/// Appointment state machine.
///
/// ```text
/// pending ──► confirmed ──► completed | no_show | cancelled
///    └────────────────────► completed | no_show | cancelled
/// ```
///
/// `completed`, `no_show` and `cancelled` are terminal. Once an appointment
/// has started it may only move to one of the terminal states.
pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate moving `appointment` to `new_status` at `now`.
    ///
    /// Cancellation additionally needs a non-blank `reason`.
    pub fn validate_status_transition(
        &self,
        appointment: &Appointment,
        new_status: AppointmentStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        let current = appointment.status;
        debug!("Validating status transition from {} to {} for {}", current, new_status, appointment.id);

        match current {
            AppointmentStatus::Cancelled => return Err(AppointmentError::AlreadyCancelled),
            AppointmentStatus::Completed | AppointmentStatus::NoShow => {
                warn!("Invalid status transition attempted: {} -> {}", current, new_status);
                return Err(AppointmentError::InvalidStatusTransition { from: current, to: new_status });
            }
            AppointmentStatus::Pending | AppointmentStatus::Confirmed => {}
        }

        if new_status.is_active() && appointment.interval.is_past(now) {
            return Err(AppointmentError::PastAppointmentImmutable);
        }

        match new_status {
            AppointmentStatus::Pending => {
                Err(AppointmentError::InvalidStatusTransition { from: current, to: new_status })
            }
            AppointmentStatus::Cancelled if normalize_text(reason).is_none() => {
                Err(AppointmentError::MissingCancellationReason)
            }
            _ => Ok(()),
        }
    }

    /// All statuses reachable from `appointment` at `now`. Cancellation is
    /// listed even though it still needs a reason.
    pub fn get_valid_transitions(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Vec<AppointmentStatus> {
        if appointment.status.is_terminal() {
            return vec![];
        }

        let mut transitions = Vec::with_capacity(4);
        if !appointment.interval.is_past(now) {
            transitions.push(AppointmentStatus::Confirmed);
        }
        transitions.extend([
            AppointmentStatus::Completed,
            AppointmentStatus::NoShow,
            AppointmentStatus::Cancelled,
        ]);
        transitions
    }

    /// Only active, not yet started appointments may be moved.
    pub fn validate_reschedule(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        match appointment.status {
            AppointmentStatus::Cancelled => Err(AppointmentError::AlreadyCancelled),
            status if status.is_terminal() => Err(AppointmentError::InvalidStatusTransition {
                from: status,
                to: status,
            }),
            _ if appointment.interval.is_past(now) => Err(AppointmentError::PastAppointmentImmutable),
            _ => Ok(()),
        }
    }

    /// Historical records are kept: only appointments entirely in the future
    /// or cancelled ones may be deleted.
    pub fn validate_deletion(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if appointment.status == AppointmentStatus::Cancelled || appointment.interval.starts_after(now) {
            Ok(())
        } else {
            Err(AppointmentError::DeletionNotAllowed)
        }
    }
}
