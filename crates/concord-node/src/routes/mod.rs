//! HTTP route handlers for Concord nodes.

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use concord_common::constants::routes;
use concord_common::{ConcordError, ProcessId};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod election;
mod health;
mod multicast;
mod mutex;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & introspection
        .route(routes::HEALTH, get(health::health_check))
        .route(routes::STATUS, get(health::status))
        .route(routes::DELIVERED, get(health::delivered))
        // Total-order multicast
        .route(routes::MULTICAST, post(multicast::multicast))
        .route(routes::MESSAGE, post(multicast::receive_message))
        .route(routes::ACK, post(multicast::receive_ack))
        // Token ring
        .route(routes::REQUEST_CS, post(mutex::request_cs))
        .route(routes::RELEASE_CS, post(mutex::release_cs))
        .route(routes::TOKEN, post(mutex::receive_token))
        // Leader election
        .route(routes::COORDINATOR, get(election::coordinator))
        .route(routes::ELECTION, post(election::start_election))
        .route(routes::ELECTION_MSG, post(election::election_message))
        .route(routes::COORDINATOR_MSG, post(election::coordinator_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response: `{"status": "error", "error": "..."}`
pub struct ApiError(ConcordError);

impl From<ConcordError> for ApiError {
    fn from(err: ConcordError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }

        let body = Json(json!({ "status": "error", "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

fn require_message_id(message_id: &str) -> Result<(), ApiError> {
    if message_id.trim().is_empty() {
        return Err(ConcordError::InvalidInput("message_id must not be empty".to_string()).into());
    }
    Ok(())
}

fn require_member(state: &AppState, id: ProcessId, field: &str) -> Result<(), ApiError> {
    let group_size = state.node.group_size();
    if !id.is_member(group_size) {
        return Err(ConcordError::InvalidInput(format!(
            "{field} {} outside [0, {group_size})",
            id.value()
        ))
        .into());
    }
    Ok(())
}
