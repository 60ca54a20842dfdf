mod common;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use appointment_cell::handlers::*;
use appointment_cell::models::*;
use appointment_cell::services::{AppointmentBookingService, InMemoryAppointmentStore};
use shared_models::error::AppError;

use common::{at, fast_timeout_rules, TestClinic};

#[test]
fn test_error_mapping_to_http_status() {
    let cases = [
        (AppointmentError::InvalidInterval("end before start".into()), StatusCode::BAD_REQUEST),
        (AppointmentError::InvalidArguments("doctor_id is required".into()), StatusCode::BAD_REQUEST),
        (AppointmentError::MissingCancellationReason, StatusCode::BAD_REQUEST),
        (AppointmentError::AlreadyCancelled, StatusCode::UNPROCESSABLE_ENTITY),
        (AppointmentError::PastAppointmentImmutable, StatusCode::UNPROCESSABLE_ENTITY),
        (
            AppointmentError::InvalidStatusTransition {
                from: AppointmentStatus::Completed,
                to: AppointmentStatus::Confirmed,
            },
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        (AppointmentError::DeletionNotAllowed, StatusCode::UNPROCESSABLE_ENTITY),
        (AppointmentError::SchedulingConflict, StatusCode::CONFLICT),
        (AppointmentError::NotFound("Appointment x".into()), StatusCode::NOT_FOUND),
        (AppointmentError::StoreUnavailable("timeout".into()), StatusCode::SERVICE_UNAVAILABLE),
        (AppointmentError::StoreRejected("permission denied".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (error, expected) in cases {
        assert_eq!(AppError::from(error.clone()).status_code(), expected, "{:?}", error);
    }
}

#[test]
fn test_store_unavailable_response_asks_for_retry() {
    let response = AppError::from(AppointmentError::StoreUnavailable("timeout".into())).into_response();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
}

#[tokio::test]
async fn test_create_appointment_handler() {
    let clinic = TestClinic::new().await;

    let (status, Json(body)) = create_appointment(
        State(clinic.service.clone()),
        Json(clinic.request(at(13, 0), at(13, 45))),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["appointment"]["status"], "pending");
}

#[tokio::test]
async fn test_create_appointment_handler_for_unknown_patient() {
    let clinic = TestClinic::new().await;
    let mut request = clinic.request(at(13, 0), at(13, 45));
    request.patient_id = Uuid::new_v4();

    let result = create_appointment(State(clinic.service.clone()), Json(request)).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_update_status_handler_rejects_past_confirmation() {
    let clinic = TestClinic::new().await;
    let booked = clinic.service.create_appointment(clinic.request(at(9, 0), at(9, 30))).await.unwrap();
    clinic.advance_past(at(9, 0));

    let result = update_appointment_status(
        State(clinic.service.clone()),
        Path(booked.id),
        Json(UpdateStatusRequest {
            status: AppointmentStatus::Confirmed,
            reason: None,
            updated_by: clinic.admin.id,
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::BusinessRule(_))));
}

#[tokio::test]
async fn test_delete_handler_for_future_appointment() {
    let clinic = TestClinic::new().await;
    let booked = clinic.service.create_appointment(clinic.request(at(9, 0), at(9, 30))).await.unwrap();

    let Json(body) = delete_appointment(State(clinic.service.clone()), Path(booked.id)).await.unwrap();

    assert_eq!(body["message"], "Appointment deleted successfully");
    assert!(clinic.store.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_list_handler_with_empty_store() {
    let service = Arc::new(AppointmentBookingService::new(
        Arc::new(InMemoryAppointmentStore::new()),
        Arc::new(appointment_cell::services::InMemoryDirectory::new()),
        Arc::new(appointment_cell::services::SystemClock),
        fast_timeout_rules(),
    ));

    let Json(body) = list_appointments(State(service), Query(AppointmentFilter::default()))
        .await
        .unwrap();

    assert_eq!(body, serde_json::json!([]));
}
