//! Bully election endpoints.

use axum::{Json, extract::State};
use concord_common::{
    CoordinatorMessage, CoordinatorReply, ElectionAck, ElectionMessage, ElectionReply, LeaderView,
};

use super::{ApiError, require_member};
use crate::state::AppState;

/// Known leader; also answers peers' discovery queries
pub async fn coordinator(State(state): State<AppState>) -> Json<LeaderView> {
    Json(state.node.get_leader().await)
}

/// Client entry point; returns once this node's election has settled
pub async fn start_election(State(state): State<AppState>) -> Json<ElectionReply> {
    Json(state.node.start_election().await)
}

/// ELECTION from a lower peer: answered at once, own election runs detached
pub async fn election_message(
    State(state): State<AppState>,
    Json(message): Json<ElectionMessage>,
) -> Result<Json<ElectionAck>, ApiError> {
    require_member(&state, message.from_id, "from_id")?;
    Ok(Json(state.node.on_election_message(message.from_id)))
}

pub async fn coordinator_message(
    State(state): State<AppState>,
    Json(message): Json<CoordinatorMessage>,
) -> Result<Json<CoordinatorReply>, ApiError> {
    require_member(&state, message.leader_id, "leader_id")?;
    require_member(&state, message.from_id, "from_id")?;

    Ok(Json(
        state
            .node
            .on_coordinator_message(message.leader_id, message.from_id)
            .await,
    ))
}
