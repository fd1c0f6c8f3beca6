//! Token-ring mutual exclusion endpoints.

use axum::{Json, extract::State};
use concord_common::{CsReleaseReply, CsRequestReply, TokenMessage, TokenReply};

use super::{ApiError, require_member};
use crate::state::AppState;

pub async fn request_cs(State(state): State<AppState>) -> Json<CsRequestReply> {
    Json(state.node.request_cs().await)
}

/// Always 200; a failed hand-off is reported in the body
pub async fn release_cs(State(state): State<AppState>) -> Json<CsReleaseReply> {
    Json(state.node.release_cs().await)
}

/// TOKEN from the ring predecessor
pub async fn receive_token(
    State(state): State<AppState>,
    Json(token): Json<TokenMessage>,
) -> Result<Json<TokenReply>, ApiError> {
    require_member(&state, token.from_id, "from")?;
    Ok(Json(state.node.on_receive_token(token.from_id).await))
}
