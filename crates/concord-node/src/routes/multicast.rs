//! Total-order multicast endpoints.

use axum::{Json, extract::State};
use concord_common::{AckMessage, AckReply, Message, MulticastReply, Payload, ReceiveReply};

use super::{ApiError, require_member, require_message_id};
use crate::state::AppState;

/// Client entry point: the whole body is the payload
pub async fn multicast(
    State(state): State<AppState>,
    Json(payload): Json<Payload>,
) -> Json<MulticastReply> {
    Json(state.node.multicast_send(payload).await)
}

/// DATA from a peer
pub async fn receive_message(
    State(state): State<AppState>,
    Json(message): Json<Message>,
) -> Result<Json<ReceiveReply>, ApiError> {
    require_message_id(&message.message_id)?;
    require_member(&state, message.origin_id, "origin_id")?;

    Ok(Json(state.node.on_receive_message(message).await))
}

/// ACK from a peer
pub async fn receive_ack(
    State(state): State<AppState>,
    Json(ack): Json<AckMessage>,
) -> Result<Json<AckReply>, ApiError> {
    require_message_id(&ack.message_id)?;
    require_member(&state, ack.from_id, "from_id")?;

    Ok(Json(state.node.on_receive_ack(ack).await))
}
