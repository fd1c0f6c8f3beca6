//! Health and introspection endpoints.

use axum::{Json, extract::State};
use concord_common::{DeliveredRecord, ProcessId};
use serde::Serialize;

use crate::engine::NodeStatus;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    process_id: ProcessId,
    clock: u64,
    version: &'static str,
    uptime_secs: u64,
}

/// Liveness plus the current Lamport clock
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        process_id: state.node.id(),
        clock: state.node.clock().await,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
    })
}

/// Snapshot of clock, pending queue, token, and election state
pub async fn status(State(state): State<AppState>) -> Json<NodeStatus> {
    Json(state.node.status().await)
}

#[derive(Serialize)]
pub struct DeliveredResponse {
    process_id: ProcessId,
    /// Deliveries since startup, including records no longer retained
    total: u64,
    records: Vec<DeliveredRecord>,
}

/// Delivered messages, in delivery order
pub async fn delivered(State(state): State<AppState>) -> Json<DeliveredResponse> {
    Json(DeliveredResponse {
        process_id: state.node.id(),
        total: state.delivery_log.total(),
        records: state.delivery_log.records(),
    })
}
