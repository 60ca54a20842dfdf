// libs/appointment-cell/src/services/booking.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::UserRole;

use crate::models::{
    normalize_text, Appointment, AppointmentError, AppointmentFilter, AppointmentStatus,
    AppointmentSummary, AppointmentValidationRules, ConflictCheckResponse,
    CreateAppointmentRequest, TimeInterval,
};
use crate::services::clock::{Clock, SystemClock};
use crate::services::conflict::ConflictDetectionService;
use crate::services::directory::{IdentityDirectory, InMemoryDirectory};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::store::{AppointmentStore, InMemoryAppointmentStore, StatusUpdate, StoreError};
use crate::services::supabase_store::{SupabaseAppointmentStore, SupabaseDirectory};
use crate::services::with_timeout;

const UNKNOWN_NAME: &str = "N/A";

/// Scheduling operations: booking, status transitions, rescheduling and
/// deletion. Every write goes through the store's conditional commit.
pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn IdentityDirectory>,
    clock: Arc<dyn Clock>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    rules: AppointmentValidationRules,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn IdentityDirectory>,
        clock: Arc<dyn Clock>,
        rules: AppointmentValidationRules,
    ) -> Self {
        let conflict_service = ConflictDetectionService::new(store.clone(), rules.store_timeout);

        Self {
            store,
            directory,
            clock,
            conflict_service,
            lifecycle_service: AppointmentLifecycleService::new(),
            rules,
        }
    }

    /// Wire the service from configuration: PostgREST when Supabase is
    /// configured, in-memory collaborators otherwise.
    pub fn from_config(config: &AppConfig) -> Self {
        let rules = AppointmentValidationRules::from_config(config);

        if config.is_configured() {
            info!("Using Supabase appointment store at {}", config.supabase_url);
            let client = Arc::new(SupabaseClient::new(config));
            Self::new(
                Arc::new(SupabaseAppointmentStore::new(client.clone())),
                Arc::new(SupabaseDirectory::new(client)),
                Arc::new(SystemClock),
                rules,
            )
        } else {
            info!("Using in-memory appointment store");
            Self::new(
                Arc::new(InMemoryAppointmentStore::new()),
                Arc::new(InMemoryDirectory::new()),
                Arc::new(SystemClock),
                rules,
            )
        }
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id))]
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let interval = TimeInterval::new(request.start_time, request.end_time)?;
        let now = self.clock.now();

        if !interval.starts_after(now) {
            return Err(AppointmentError::InvalidInterval(
                "Appointment must be scheduled for a future time".to_string(),
            ));
        }
        require_id(request.doctor_id, "doctor_id")?;
        require_id(request.patient_id, "patient_id")?;
        require_id(request.created_by, "created_by")?;
        let reason = self.validate_text(request.reason.as_deref(), "reason")?;

        self.require_user(request.doctor_id, UserRole::Doctor).await?;
        self.require_user(request.patient_id, UserRole::Patient).await?;

        if !self.conflict_service.is_available(request.doctor_id, &interval, None).await? {
            return Err(AppointmentError::SchedulingConflict);
        }

        let mut appointment = Appointment::new(
            request.doctor_id,
            request.patient_id,
            interval,
            reason,
            request.created_by,
            now,
        );
        appointment.status = self.rules.initial_status();

        // a concurrent booking may have taken the slot since the check above
        let appointment = self.timed(self.store.insert_if_available(appointment)).await?;

        info!("Appointment {} booked for doctor {} at {}",
              appointment.id, appointment.doctor_id, appointment.interval);
        Ok(appointment)
    }

    // ==============================================================================
    // STATUS TRANSITIONS
    // ==============================================================================

    #[instrument(skip(self, reason))]
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        reason: Option<&str>,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        require_id(actor_id, "updated_by")?;
        // the reason only matters for cancellation; other transitions drop it
        let reason = match new_status {
            AppointmentStatus::Cancelled => reason,
            _ => None,
        };

        let mut attempt = 1;
        loop {
            let current = self.get_appointment(appointment_id).await?;
            let now = self.clock.now();

            self.lifecycle_service
                .validate_status_transition(&current, new_status, reason, now)?;
            let reason = self.validate_text(reason, "reason")?;

            let mut next = current.clone();
            next.set_status(new_status, reason.as_deref(), actor_id, now)?;

            let update = StatusUpdate {
                status: next.status,
                cancellation_reason: next.cancellation_reason,
                updated_by: actor_id,
                updated_at: now,
            };

            match self.timed(self.store.update_status(appointment_id, current.status, update)).await {
                Ok(updated) => {
                    info!("Appointment {} moved {} -> {}", appointment_id, current.status, updated.status);
                    return Ok(updated);
                }
                Err(StoreError::StatusChanged { .. }) if attempt < self.rules.max_commit_attempts => {
                    warn!("Appointment {} changed concurrently, re-validating (attempt {}/{})",
                          appointment_id, attempt, self.rules.max_commit_attempts);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ==============================================================================
    // RESCHEDULING
    // ==============================================================================

    #[instrument(skip(self))]
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        actor_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let interval = TimeInterval::new(start_time, end_time)?;
        require_id(actor_id, "updated_by")?;

        let mut attempt = 1;
        loop {
            let current = self.get_appointment(appointment_id).await?;
            let now = self.clock.now();

            self.lifecycle_service.validate_reschedule(&current, now)?;
            if !interval.starts_after(now) {
                return Err(AppointmentError::InvalidInterval(
                    "Appointment must be scheduled for a future time".to_string(),
                ));
            }

            if !self
                .conflict_service
                .is_available(current.doctor_id, &interval, Some(appointment_id))
                .await?
            {
                return Err(AppointmentError::SchedulingConflict);
            }

            let committed = self
                .timed(self.store.reschedule_if_available(
                    appointment_id,
                    current.status,
                    interval,
                    actor_id,
                    now,
                ))
                .await;

            match committed {
                Ok(updated) => {
                    info!("Appointment {} rescheduled from {} to {}", appointment_id, current.interval, updated.interval);
                    return Ok(updated);
                }
                Err(StoreError::StatusChanged { .. }) if attempt < self.rules.max_commit_attempts => {
                    warn!("Appointment {} changed concurrently, re-validating (attempt {}/{})",
                          appointment_id, attempt, self.rules.max_commit_attempts);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ==============================================================================
    // DELETION
    // ==============================================================================

    #[instrument(skip(self))]
    pub async fn delete_appointment(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        let mut attempt = 1;
        loop {
            let current = self.get_appointment(appointment_id).await?;

            self.lifecycle_service.validate_deletion(&current, self.clock.now())?;

            match self.timed(self.store.delete(appointment_id, current.status)).await {
                Ok(()) => {
                    info!("Appointment {} deleted", appointment_id);
                    return Ok(());
                }
                Err(StoreError::StatusChanged { .. }) if attempt < self.rules.max_commit_attempts => {
                    warn!("Appointment {} changed concurrently, re-validating (attempt {}/{})",
                          appointment_id, attempt, self.rules.max_commit_attempts);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.timed(self.store.find_by_id(appointment_id))
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Appointment {}", appointment_id)))
    }

    pub async fn is_available(
        &self,
        doctor_id: Uuid,
        candidate: &TimeInterval,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        self.conflict_service.is_available(doctor_id, candidate, exclude_appointment_id).await
    }

    pub async fn check_conflicts(
        &self,
        doctor_id: Uuid,
        candidate: &TimeInterval,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        self.conflict_service.check_conflicts(doctor_id, candidate, exclude_appointment_id).await
    }

    /// List appointments with doctor and patient names resolved. Users the
    /// directory does not know are shown as `N/A`.
    pub async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<AppointmentSummary>, AppointmentError> {
        let appointments = self.timed(self.store.list(filter)).await?;
        debug!("Listing {} appointments", appointments.len());

        let mut names: HashMap<Uuid, String> = HashMap::new();
        let mut summaries = Vec::with_capacity(appointments.len());

        for appointment in appointments {
            let doctor_name = self.resolve_name(&mut names, appointment.doctor_id).await?;
            let patient_name = self.resolve_name(&mut names, appointment.patient_id).await?;

            summaries.push(AppointmentSummary {
                id: appointment.id,
                doctor_id: appointment.doctor_id,
                doctor_name,
                patient_id: appointment.patient_id,
                patient_name,
                interval: appointment.interval,
                status: appointment.status,
                reason: appointment.reason,
            });
        }

        Ok(summaries)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn timed<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        with_timeout(self.rules.store_timeout, call).await
    }

    async fn require_user(&self, user_id: Uuid, role: UserRole) -> Result<(), AppointmentError> {
        if self.timed(self.directory.exists(user_id, role)).await? {
            Ok(())
        } else {
            let label = match role {
                UserRole::Doctor => "Doctor",
                UserRole::Patient => "Patient",
                UserRole::Admin => "Admin",
            };
            Err(AppointmentError::NotFound(format!("{} {}", label, user_id)))
        }
    }

    async fn resolve_name(
        &self,
        cache: &mut HashMap<Uuid, String>,
        user_id: Uuid,
    ) -> Result<String, AppointmentError> {
        if let Some(name) = cache.get(&user_id) {
            return Ok(name.clone());
        }

        let name = self
            .timed(self.directory.find_user(user_id))
            .await?
            .map(|user| user.name)
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        cache.insert(user_id, name.clone());
        Ok(name)
    }

    fn validate_text(&self, value: Option<&str>, field: &str) -> Result<Option<String>, AppointmentError> {
        let text = normalize_text(value);
        match &text {
            Some(t) if t.chars().count() > self.rules.max_reason_length => {
                Err(AppointmentError::InvalidArguments(format!(
                    "{} must be at most {} characters",
                    field, self.rules.max_reason_length
                )))
            }
            _ => Ok(text),
        }
    }
}

fn require_id(id: Uuid, field: &str) -> Result<(), AppointmentError> {
    if id.is_nil() {
        Err(AppointmentError::InvalidArguments(format!("{} is required", field)))
    } else {
        Ok(())
    }
}
