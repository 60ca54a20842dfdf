// libs/appointment-cell/src/models.rs
use std::fmt;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;

// ==============================================================================
// TIME INTERVAL
// ==============================================================================

/// Half-open time range `[start, end)`.
///
/// The only way to obtain one is through [`TimeInterval::new`] (or
/// deserialization, which goes through the same check), so `end > start`
/// holds for every value in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct TimeInterval {
    #[serde(rename = "start_time")]
    start: DateTime<Utc>,
    #[serde(rename = "end_time")]
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawInterval {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl TryFrom<RawInterval> for TimeInterval {
    type Error = AppointmentError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        TimeInterval::new(raw.start_time, raw.end_time)
    }
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AppointmentError> {
        if end <= start {
            return Err(AppointmentError::InvalidInterval(format!(
                "end {} must be after start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Strict half-open overlap. Intervals that only touch at a boundary
    /// do not overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn starts_after(&self, instant: DateTime<Utc>) -> bool {
        self.start > instant
    }

    /// An interval is past once it has started.
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        !self.starts_after(now)
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    #[serde(flatten)]
    pub interval: TimeInterval,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new(
        doctor_id: Uuid,
        patient_id: Uuid,
        interval: TimeInterval,
        reason: Option<String>,
        created_by: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id,
            interval,
            status: AppointmentStatus::Pending,
            reason,
            cancellation_reason: None,
            created_by,
            updated_by: created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Write a new status onto the record, keeping the cancellation reason
    /// present exactly when the status is `cancelled`.
    pub fn set_status(
        &mut self,
        status: AppointmentStatus,
        cancellation_reason: Option<&str>,
        updated_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if status == AppointmentStatus::Cancelled {
            let reason = normalize_text(cancellation_reason)
                .ok_or(AppointmentError::MissingCancellationReason)?;
            self.cancellation_reason = Some(reason);
        } else {
            self.cancellation_reason = None;
        }

        self.status = status;
        self.updated_by = updated_by;
        self.updated_at = now;
        Ok(())
    }
}

/// Trim a free-text field, treating blank input as absent.
pub fn normalize_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    #[serde(alias = "no-show")]
    NoShow,
}

impl AppointmentStatus {
    pub const ACTIVE: [AppointmentStatus; 2] = [AppointmentStatus::Pending, AppointmentStatus::Confirmed];

    /// Active appointments are the only ones that hold a doctor's time.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub updated_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub updated_by: Uuid,
}

/// Filter for appointment listings. Every field narrows the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentFilter {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.status.map_or(true, |status| appointment.status == status)
    }
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub doctor_id: Uuid,
    #[serde(flatten)]
    pub interval: TimeInterval,
    pub available: bool,
}

// ==============================================================================
// SUMMARY MODELS
// ==============================================================================

/// Listing row with the doctor and patient names resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSummary {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub patient_id: Uuid,
    pub patient_name: String,
    #[serde(flatten)]
    pub interval: TimeInterval,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("A cancellation reason is required to cancel an appointment")]
    MissingCancellationReason,

    #[error("Appointment is already cancelled")]
    AlreadyCancelled,

    #[error("Past appointments can only be completed, marked no-show or cancelled")]
    PastAppointmentImmutable,

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Doctor already has an active appointment overlapping this time")]
    SchedulingConflict,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Only future or cancelled appointments can be deleted")]
    DeletionNotAllowed,

    #[error("Appointment store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Appointment store rejected the request: {0}")]
    StoreRejected(String),
}

impl AppointmentError {
    /// Only store outages may be retried by the caller; every other kind is a
    /// definite answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppointmentError::StoreUnavailable(_))
    }
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct AppointmentValidationRules {
    pub auto_confirm: bool,
    pub max_reason_length: usize,
    pub store_timeout: StdDuration,
    pub max_commit_attempts: u32,
}

impl Default for AppointmentValidationRules {
    fn default() -> Self {
        Self {
            auto_confirm: false,
            max_reason_length: 500,
            store_timeout: StdDuration::from_secs(5),
            max_commit_attempts: 3,
        }
    }
}

impl AppointmentValidationRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            auto_confirm: config.auto_confirm_appointments,
            max_reason_length: config.max_reason_length,
            store_timeout: config.store_timeout(),
            ..Self::default()
        }
    }

    /// The status a freshly booked appointment starts in.
    pub fn initial_status(&self) -> AppointmentStatus {
        if self.auto_confirm {
            AppointmentStatus::Confirmed
        } else {
            AppointmentStatus::Pending
        }
    }
}
