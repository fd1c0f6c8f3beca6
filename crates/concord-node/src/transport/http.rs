//! HTTP/JSON transport over `reqwest`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use concord_common::constants::timeouts;
use concord_common::{ConcordError, MessageKind, PeerMessage, ProcessId};
use std::time::Duration;

use super::Transport;
use crate::config::PeerDirectory;

/// Per-kind request timeouts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTimeouts {
    /// DATA and ACK fan-out
    pub multicast: Duration,
    /// Token hand-off
    pub token: Duration,
    /// ELECTION and COORDINATOR
    pub election: Duration,
    /// Coordinator discovery queries
    pub leader_query: Duration,
}

impl SendTimeouts {
    pub fn for_kind(&self, kind: MessageKind) -> Duration {
        match kind {
            MessageKind::Data | MessageKind::Ack => self.multicast,
            MessageKind::Token => self.token,
            MessageKind::Election | MessageKind::Coordinator => self.election,
            MessageKind::LeaderQuery => self.leader_query,
        }
    }
}

impl Default for SendTimeouts {
    fn default() -> Self {
        Self {
            multicast: Duration::from_millis(timeouts::MULTICAST_SEND_MS),
            token: Duration::from_millis(timeouts::TOKEN_SEND_MS),
            election: Duration::from_millis(timeouts::ELECTION_SEND_MS),
            leader_query: Duration::from_millis(timeouts::LEADER_QUERY_MS),
        }
    }
}

/// Sends peer messages as JSON requests to `<peer address><route>`
pub struct HttpTransport {
    client: reqwest::Client,
    peers: PeerDirectory,
    timeouts: SendTimeouts,
}

impl HttpTransport {
    pub fn new(peers: PeerDirectory, timeouts: SendTimeouts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("concord-node/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            peers,
            timeouts,
        })
    }

    fn map_error(target: ProcessId, kind: MessageKind, err: reqwest::Error) -> ConcordError {
        if err.is_timeout() {
            ConcordError::Timeout(format!("{kind} to {target}"))
        } else {
            ConcordError::transport(target, err)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        target: ProcessId,
        message: &PeerMessage,
    ) -> Result<serde_json::Value, ConcordError> {
        let kind = message.kind();
        let url = format!("{}{}", self.peers.address_of(target)?, kind.route());

        let request = match message {
            PeerMessage::LeaderQuery => self.client.get(&url),
            _ => {
                let body = message.body().map_err(|e| {
                    ConcordError::Internal(format!("cannot encode {kind} for {target}: {e}"))
                })?;
                self.client.post(&url).json(&body)
            }
        };

        tracing::trace!(target_id = %target, %url, %kind, "Sending peer message");

        let response = request
            .timeout(self.timeouts.for_kind(kind))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Self::map_error(target, kind, e))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(target, kind, e))?;

        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ConcordError::transport(target, format!("invalid reply body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_by_kind() {
        let timeouts = SendTimeouts::default();
        assert_eq!(timeouts.for_kind(MessageKind::Ack), Duration::from_secs(10));
        assert_eq!(timeouts.for_kind(MessageKind::Token), Duration::from_secs(5));
        assert_eq!(timeouts.for_kind(MessageKind::Coordinator), Duration::from_secs(5));
        assert_eq!(timeouts.for_kind(MessageKind::LeaderQuery), Duration::from_secs(3));
    }

    /// A local port that was just released, so nothing listens on it
    async fn closed_port_address() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_transport_error() {
        let peers = PeerDirectory::from_addresses(vec![closed_port_address().await]);
        let transport = HttpTransport::new(peers, SendTimeouts::default()).unwrap();

        let result = transport
            .send(ProcessId::new(0), &PeerMessage::LeaderQuery)
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_peer_messages_reach_their_routes() {
        use axum::{Json, Router, routing::{get, post}};
        use concord_common::constants::routes;
        use concord_common::{AckMessage, TokenMessage};
        use serde_json::{Value, json};

        // Echoes POST bodies so the test sees what went over the wire
        let echo = |Json(body): Json<Value>| async move { Json(body) };
        let app = Router::new()
            .route(
                routes::COORDINATOR,
                get(|| async { Json(json!({ "leader_id": 1, "process_id": 0 })) }),
            )
            .route(routes::ACK, post(echo))
            .route(routes::TOKEN, post(echo));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let peers = PeerDirectory::from_addresses(vec![format!("http://{addr}")]);
        let transport = HttpTransport::new(peers, SendTimeouts::default()).unwrap();
        let peer = ProcessId::new(0);

        let reply = tokio_test::assert_ok!(transport.send(peer, &PeerMessage::LeaderQuery).await);
        assert_eq!(reply["leader_id"], 1);

        let ack = PeerMessage::Ack(AckMessage {
            message_id: "m-1".to_string(),
            from_id: ProcessId::new(0),
            ts: 3,
        });
        let reply = tokio_test::assert_ok!(transport.send(peer, &ack).await);
        assert_eq!(reply, json!({ "message_id": "m-1", "from_id": 0, "ts": 3 }));

        let token = PeerMessage::Token(TokenMessage { from_id: ProcessId::new(0) });
        let reply = tokio_test::assert_ok!(transport.send(peer, &token).await);
        assert_eq!(reply, json!({ "from": 0 }));
    }

    #[tokio::test]
    async fn test_unknown_peer_rejected_before_sending() {
        let peers = PeerDirectory::from_addresses(vec!["http://127.0.0.1:9".to_string()]);
        let transport = HttpTransport::new(peers, SendTimeouts::default()).unwrap();

        let result = transport
            .send(ProcessId::new(4), &PeerMessage::LeaderQuery)
            .await;
        assert!(matches!(result, Err(ConcordError::Config(_))));
    }
}
