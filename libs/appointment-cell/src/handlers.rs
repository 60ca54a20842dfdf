// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentFilter, AvailabilityResponse, CreateAppointmentRequest,
    RescheduleAppointmentRequest, TimeInterval, UpdateStatusRequest,
};
use crate::services::booking::AppointmentBookingService;

type ServiceState = State<Arc<AppointmentBookingService>>;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ConflictCheckQuery {
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub exclude_appointment_id: Option<Uuid>,
}

impl ConflictCheckQuery {
    fn interval(&self) -> Result<TimeInterval, AppointmentError> {
        TimeInterval::new(self.start_time, self.end_time)
            .map_err(|e| AppointmentError::InvalidArguments(e.to_string()))
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        let message = err.to_string();
        match err {
            AppointmentError::InvalidInterval(_)
            | AppointmentError::InvalidArguments(_)
            | AppointmentError::MissingCancellationReason => AppError::ValidationError(message),
            AppointmentError::AlreadyCancelled
            | AppointmentError::PastAppointmentImmutable
            | AppointmentError::InvalidStatusTransition { .. }
            | AppointmentError::DeletionNotAllowed => AppError::BusinessRule(message),
            AppointmentError::SchedulingConflict => AppError::Conflict(message),
            AppointmentError::NotFound(_) => AppError::NotFound(message),
            AppointmentError::StoreUnavailable(_) => AppError::ServiceUnavailable(message),
            AppointmentError::StoreRejected(_) => AppError::Internal(message),
        }
    }
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

pub async fn create_appointment(
    State(service): ServiceState,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = service.create_appointment(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": appointment,
            "message": "Appointment booked successfully"
        })),
    ))
}

pub async fn list_appointments(
    State(service): ServiceState,
    Query(filter): Query<AppointmentFilter>,
) -> Result<Json<Value>, AppError> {
    let appointments = service.list_appointments(&filter).await?;
    Ok(Json(json!(appointments)))
}

pub async fn get_appointment(
    State(service): ServiceState,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.get_appointment(appointment_id).await?;
    Ok(Json(json!(appointment)))
}

pub async fn update_appointment_status(
    State(service): ServiceState,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service
        .update_status(appointment_id, request.status, request.reason.as_deref(), request.updated_by)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment status updated"
    })))
}

pub async fn reschedule_appointment(
    State(service): ServiceState,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service
        .reschedule_appointment(appointment_id, request.start_time, request.end_time, request.updated_by)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled successfully"
    })))
}

pub async fn delete_appointment(
    State(service): ServiceState,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    service.delete_appointment(appointment_id).await?;
    Ok(Json(json!({ "message": "Appointment deleted successfully" })))
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

pub async fn check_appointment_conflicts(
    State(service): ServiceState,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let interval = query.interval()?;
    let response = service
        .check_conflicts(query.doctor_id, &interval, query.exclude_appointment_id)
        .await?;
    Ok(Json(json!(response)))
}

pub async fn check_availability(
    State(service): ServiceState,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let interval = query.interval()?;
    let available = service
        .is_available(query.doctor_id, &interval, query.exclude_appointment_id)
        .await?;

    Ok(Json(json!(AvailabilityResponse {
        doctor_id: query.doctor_id,
        interval,
        available,
    })))
}
