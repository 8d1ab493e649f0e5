//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::health::Health;
use crate::service::{
    HealthSnapshot, ParkError, ParkingService, SlotStatusError, UnparkError,
};
use crate::slot::SlotStatus;
use crate::types::{LicensePlate, SlotId};
use crate::version::VersionInfo;

/// Prefix of the parking lot API.
pub const API_BASE: &str = "/api/v1/parking-lot";

const SLOT_ASSIGNED: &str = "Slot assigned successfully!";
const NO_SLOTS_AVAILABLE: &str = "No slots are available";
const INTERNAL_SERVER_ERROR: &str = "Internal server error, contact support...";
const VEHICLE_UNPARKED: &str = "Vehicle unparked!";

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: Health,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot: Option<String>,
    pub available_slots: usize,
    pub total_slots: usize,
    pub version: VersionInfo,
}

impl From<HealthSnapshot> for HealthCheckResponse {
    fn from(snapshot: HealthSnapshot) -> Self {
        Self {
            status: snapshot.state,
            lot: snapshot.lot_name,
            available_slots: snapshot.available_slots,
            total_slots: snapshot.total_slots,
            version: snapshot.version,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ParkingResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<SlotId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<LicensePlate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_parking_time: Option<DateTime<Utc>>,
    pub vehicle_parked: bool,
    pub message: String,
}

impl ParkingResponse {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct UnparkingResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<SlotId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<LicensePlate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parking_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unparking_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_parked_secs: Option<f64>,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SlotInfoResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<SlotId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_status: Option<SlotStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<LicensePlate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parked_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_parked_secs: Option<f64>,
    pub message: String,
}

fn duration_secs(duration: TimeDelta) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

async fn health_check(State(service): State<Arc<ParkingService>>) -> Json<HealthCheckResponse> {
    Json(service.health().into())
}

async fn park_vehicle(
    State(service): State<Arc<ParkingService>>,
    body: String,
) -> (StatusCode, Json<ParkingResponse>) {
    let plate = match LicensePlate::parse(&body) {
        Ok(plate) => plate,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ParkingResponse::rejected(e.to_string())),
            );
        }
    };
    tracing::info!(plate = %plate, "Received request to park vehicle");

    match service.park(plate) {
        Ok(ticket) => (
            StatusCode::OK,
            Json(ParkingResponse {
                slot_id: Some(ticket.slot_id),
                license_plate: Some(ticket.license_plate),
                vehicle_parking_time: Some(ticket.parked_at),
                vehicle_parked: true,
                message: SLOT_ASSIGNED.to_string(),
            }),
        ),
        Err(e @ ParkError::AlreadyParked(_)) => (
            StatusCode::BAD_REQUEST,
            Json(ParkingResponse::rejected(e.to_string())),
        ),
        // A full lot is an answer, not a failure.
        Err(ParkError::NoSlotAvailable) => (
            StatusCode::OK,
            Json(ParkingResponse::rejected(NO_SLOTS_AVAILABLE)),
        ),
        Err(e @ ParkError::NotReady) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ParkingResponse::rejected(e.to_string())),
        ),
        Err(ParkError::Internal(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ParkingResponse::rejected(INTERNAL_SERVER_ERROR)),
        ),
    }
}

async fn unpark_vehicle(
    State(service): State<Arc<ParkingService>>,
    body: String,
) -> (StatusCode, Json<UnparkingResponse>) {
    let plate = match LicensePlate::parse(&body) {
        Ok(plate) => plate,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(UnparkingResponse {
                    message: e.to_string(),
                    ..Default::default()
                }),
            );
        }
    };
    tracing::info!(plate = %plate, "Received request to unpark vehicle");

    let (status, message) = match service.unpark(&plate) {
        Ok(receipt) => {
            return (
                StatusCode::OK,
                Json(UnparkingResponse {
                    slot_id: Some(receipt.slot_id),
                    license_plate: Some(receipt.license_plate),
                    parking_time: Some(receipt.parked_at),
                    unparking_time: Some(receipt.unparked_at),
                    total_duration_parked_secs: Some(duration_secs(receipt.duration)),
                    message: VEHICLE_UNPARKED.to_string(),
                }),
            );
        }
        Err(e @ UnparkError::NotOccupied(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
        Err(e @ UnparkError::NotReady) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        Err(UnparkError::Internal(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_SERVER_ERROR.to_string(),
        ),
    };

    (
        status,
        Json(UnparkingResponse {
            message,
            ..Default::default()
        }),
    )
}

async fn slot_status(
    State(service): State<Arc<ParkingService>>,
    Path(slot_id): Path<u64>,
) -> (StatusCode, Json<SlotInfoResponse>) {
    let slot_id = SlotId::new(slot_id);
    match service.slot_status(slot_id) {
        Ok(report) => (
            StatusCode::OK,
            Json(SlotInfoResponse {
                slot_id: Some(report.slot_id),
                slot_status: Some(report.status),
                license_plate: report.license_plate,
                parked_on: report.parked_at,
                total_duration_parked_secs: report.duration.map(duration_secs),
                message: format!("Slot found having slotId: {slot_id}"),
            }),
        ),
        Err(e @ SlotStatusError::SlotNotFound(_)) => (
            StatusCode::BAD_REQUEST,
            Json(SlotInfoResponse {
                message: e.to_string(),
                ..Default::default()
            }),
        ),
        Err(e @ SlotStatusError::NotReady) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SlotInfoResponse {
                message: e.to_string(),
                ..Default::default()
            }),
        ),
    }
}

async fn total_available(State(service): State<Arc<ParkingService>>) -> Json<usize> {
    Json(service.available_slots())
}

async fn total_capacity(State(service): State<Arc<ParkingService>>) -> Json<usize> {
    Json(service.total_slots())
}

async fn shutdown(State(service): State<Arc<ParkingService>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    service.trigger_shutdown();
    (StatusCode::OK, Json(serde_json::json!({})))
}

fn api_routes() -> Router<Arc<ParkingService>> {
    Router::new()
        .route("/park", post(park_vehicle))
        .route("/unpark", post(unpark_vehicle))
        .route("/slot/total-available", get(total_available))
        .route("/slot/total-capacity", get(total_capacity))
        .route("/slot/{slot_id}", get(slot_status))
}

pub fn routes(service: Arc<ParkingService>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/shutdown", post(shutdown))
        .nest(API_BASE, api_routes())
        .with_state(service)
}
