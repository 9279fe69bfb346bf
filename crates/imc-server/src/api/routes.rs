//! REST API routes.
//!
//! The server path of the protocol is deliberately small: vehicles request
//! access, poll for their grant, and announce exiting. Two read-only listing
//! routes expose the queue and the per-vehicle records.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::state::{AppState, RequestOutcome};
use imc_core::messages::{AccessRequest, Exiting, ExitingAcknowledged, VehicleId};

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/access/request", post(request_access))
        .route("/v1/access/status", get(access_status))
        .route("/v1/access/exiting", post(vehicle_exiting))
        .route("/v1/queue", get(list_queue))
        .route("/v1/vehicles", get(list_vehicles))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    host: String,
    port: u16,
}

async fn request_access(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AccessRequest>,
) -> impl IntoResponse {
    match state.request_access(&request) {
        RequestOutcome::Queued(position) => {
            tracing::info!(
                "queued {} for {} -> {} at position {position}",
                request.vehicle,
                request.entry,
                request.exit
            );
            (
                StatusCode::ACCEPTED,
                Json(json!({ "queued": true, "position": position })),
            )
        }
        RequestOutcome::AlreadyQueued(position) => {
            tracing::debug!("duplicate request from {}", request.vehicle);
            (
                StatusCode::ACCEPTED,
                Json(json!({ "queued": true, "position": position })),
            )
        }
        RequestOutcome::Full => {
            tracing::warn!("queue full, dropping request from {}", request.vehicle);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "queued": false, "error": "queue full" })),
            )
        }
    }
}

async fn access_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> impl IntoResponse {
    let vehicle = VehicleId::new(query.host, query.port);
    Json(state.status_of(&vehicle))
}

async fn vehicle_exiting(
    State(state): State<Arc<AppState>>,
    Json(exiting): Json<Exiting>,
) -> impl IntoResponse {
    if state.complete_exit(&exiting.vehicle) {
        tracing::info!("{} exited the intersection", exiting.vehicle);
    } else {
        // Unknown vehicles are acknowledged anyway so a retried handshake
        // always converges.
        tracing::warn!("exit from unknown vehicle {}", exiting.vehicle);
    }
    Json(ExitingAcknowledged {
        vehicle: exiting.vehicle,
    })
}

async fn list_queue(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.queue_snapshot())
}

async fn list_vehicles(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.vehicle_records())
}
