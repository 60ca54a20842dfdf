#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::{AppointmentValidationRules, CreateAppointmentRequest};
use appointment_cell::services::{
    AppointmentBookingService, AppointmentStore, FixedClock, InMemoryAppointmentStore,
    InMemoryDirectory,
};
use shared_models::auth::{User, UserRole};

/// 2030-01-14 08:00 UTC, a Monday morning before the clinic opens.
pub fn clinic_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 14, 8, 0, 0).unwrap()
}

/// Wall-clock time on the clinic day.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 14, hour, minute, 0).unwrap()
}

pub struct TestClinic {
    pub service: Arc<AppointmentBookingService>,
    pub store: Arc<InMemoryAppointmentStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub clock: Arc<FixedClock>,
    pub doctor: User,
    pub second_doctor: User,
    pub patient: User,
    pub admin: User,
}

impl TestClinic {
    pub async fn new() -> Self {
        Self::with_rules(AppointmentValidationRules::default()).await
    }

    pub async fn with_rules(rules: AppointmentValidationRules) -> Self {
        let store = Arc::new(InMemoryAppointmentStore::new());
        Self::with_store(store.clone(), store, rules).await
    }

    /// Build a clinic whose service talks to `backing` while `store` stays
    /// reachable for inspection.
    pub async fn with_store(
        store: Arc<InMemoryAppointmentStore>,
        backing: Arc<dyn AppointmentStore>,
        rules: AppointmentValidationRules,
    ) -> Self {
        let doctor = User::new("Dr. Meredith Grey", UserRole::Doctor);
        let second_doctor = User::new("Dr. Miranda Bailey", UserRole::Doctor);
        let patient = User::new("Alex Karev", UserRole::Patient);
        let admin = User::new("Front Desk", UserRole::Admin);

        let directory = Arc::new(InMemoryDirectory::with_users(vec![
            doctor.clone(),
            second_doctor.clone(),
            patient.clone(),
            admin.clone(),
        ]));
        let clock = Arc::new(FixedClock::new(clinic_morning()));

        let service = Arc::new(AppointmentBookingService::new(
            backing,
            directory.clone(),
            clock.clone(),
            rules,
        ));

        Self {
            service,
            store,
            directory,
            clock,
            doctor,
            second_doctor,
            patient,
            admin,
        }
    }

    pub fn request(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            doctor_id: self.doctor.id,
            patient_id: self.patient.id,
            start_time: start,
            end_time: end,
            reason: Some("Follow-up".to_string()),
            created_by: self.admin.id,
        }
    }

    pub fn advance_past(&self, instant: DateTime<Utc>) {
        self.clock.set(instant + ChronoDuration::minutes(1));
    }
}

pub fn fast_timeout_rules() -> AppointmentValidationRules {
    AppointmentValidationRules {
        store_timeout: Duration::from_millis(50),
        ..AppointmentValidationRules::default()
    }
}

pub fn random_id() -> Uuid {
    Uuid::new_v4()
}
