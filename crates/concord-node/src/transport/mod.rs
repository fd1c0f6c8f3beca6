//! Outbound peer transport.
//!
//! The engine only ever calls [`Transport::send`]; how a message reaches a
//! peer, and whether failed calls are retried, is up to the implementation.

use async_trait::async_trait;
use concord_common::{ConcordError, PeerMessage, ProcessId};

mod http;
#[cfg(test)]
pub mod memory;

pub use http::{HttpTransport, SendTimeouts};

/// Best-effort point-to-point delivery to a peer
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `message` to `target` and return the peer's JSON reply
    /// (`Value::Null` for an empty body).
    async fn send(
        &self,
        target: ProcessId,
        message: &PeerMessage,
    ) -> Result<serde_json::Value, ConcordError>;
}
