//! Wire types shared across Concord components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::routes;
use crate::error::ConcordError;

/// Process identifier within a fixed-size group.
///
/// Valid ids lie in `[0, N)` where `N` is the group size; both are fixed for
/// the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u32);

impl ProcessId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Returns true if this id belongs to a group of `group_size` processes
    pub fn is_member(&self, group_size: u32) -> bool {
        self.0 < group_size
    }

    /// Static ring successor: `(self + 1) mod group_size`
    pub fn successor(&self, group_size: u32) -> Self {
        Self((self.0 + 1) % group_size)
    }

    /// Every id in `[0, group_size)`
    pub fn all(group_size: u32) -> impl Iterator<Item = ProcessId> {
        (0..group_size).map(ProcessId)
    }

    /// Ids strictly greater than this one, ascending
    pub fn higher(&self, group_size: u32) -> impl Iterator<Item = ProcessId> {
        (self.0.saturating_add(1)..group_size).map(ProcessId)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl From<u32> for ProcessId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Parses either a bare integer (`"2"`) or a StatefulSet-style hostname whose
/// last `-`-separated segment is the integer (`"coord-app-2"`).
impl FromStr for ProcessId {
    type Err = ConcordError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let suffix = raw.rsplit('-').next().unwrap_or(raw);
        suffix
            .parse::<u32>()
            .map(ProcessId)
            .map_err(|_| ConcordError::Config(format!("cannot parse process id from {raw:?}")))
    }
}

/// Opaque application payload carried by a multicast
pub type Payload = serde_json::Value;

/// DATA: a multicast message.
///
/// Ordered everywhere by `(timestamp, origin_id, message_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique per send event (UUID v4)
    pub message_id: String,
    /// Process that multicast the message
    pub origin_id: ProcessId,
    /// Lamport timestamp assigned at send
    pub timestamp: u64,
    /// Application payload
    pub payload: Payload,
    /// Set locally once delivered; never meaningful on the wire
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub delivered: bool,
}

/// ACK: `from_id` has received and enqueued `message_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMessage {
    pub message_id: String,
    pub from_id: ProcessId,
    /// Sender's clock after enqueueing
    pub ts: u64,
}

/// TOKEN: ring hand-off from the predecessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMessage {
    #[serde(rename = "from")]
    pub from_id: ProcessId,
}

/// ELECTION: sent by a lower id to every higher id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionMessage {
    pub from_id: ProcessId,
}

/// COORDINATOR: announcement of the elected leader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorMessage {
    pub leader_id: ProcessId,
    pub from_id: ProcessId,
}

/// Kinds of peer-to-peer traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Data,
    Ack,
    Token,
    Election,
    Coordinator,
    LeaderQuery,
}

impl MessageKind {
    /// Route on the receiving peer
    pub fn route(&self) -> &'static str {
        match self {
            Self::Data => routes::MESSAGE,
            Self::Ack => routes::ACK,
            Self::Token => routes::TOKEN,
            Self::Election => routes::ELECTION_MSG,
            Self::Coordinator => routes::COORDINATOR_MSG,
            Self::LeaderQuery => routes::COORDINATOR,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Data => "DATA",
            Self::Ack => "ACK",
            Self::Token => "TOKEN",
            Self::Election => "ELECTION",
            Self::Coordinator => "COORDINATOR",
            Self::LeaderQuery => "LEADER_QUERY",
        };
        f.write_str(name)
    }
}

/// Outbound message handed to the transport collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum PeerMessage {
    Data(Message),
    Ack(AckMessage),
    Token(TokenMessage),
    Election(ElectionMessage),
    Coordinator(CoordinatorMessage),
    /// Ask a peer which leader it knows (no body)
    LeaderQuery,
}

impl PeerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Data(_) => MessageKind::Data,
            Self::Ack(_) => MessageKind::Ack,
            Self::Token(_) => MessageKind::Token,
            Self::Election(_) => MessageKind::Election,
            Self::Coordinator(_) => MessageKind::Coordinator,
            Self::LeaderQuery => MessageKind::LeaderQuery,
        }
    }

    /// JSON body for the wire; `Null` for the body-less leader query
    pub fn body(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Data(m) => serde_json::to_value(m),
            Self::Ack(m) => serde_json::to_value(m),
            Self::Token(m) => serde_json::to_value(m),
            Self::Election(m) => serde_json::to_value(m),
            Self::Coordinator(m) => serde_json::to_value(m),
            Self::LeaderQuery => Ok(serde_json::Value::Null),
        }
    }
}

// === Replies ===

/// Reply to `POST /multicast`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MulticastReply {
    Sent {
        message_id: String,
        timestamp: u64,
        process_id: ProcessId,
    },
}

/// Reply to an inbound DATA message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReceiveReply {
    Received { clock: u64 },
}

/// Reply to an inbound ACK
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AckReply {
    Ack {
        updated: String,
        processed: usize,
        clock: u64,
    },
}

/// Reply to `POST /request_cs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CsRequestReply {
    /// No token held; poll again later
    Waiting { has_token: bool },
    AlreadyIn { has_token: bool },
    Entered { has_token: bool, process_id: ProcessId },
}

/// Reply to `POST /release_cs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CsReleaseReply {
    NotInCs { has_token: bool },
    Released {
        next_holder: ProcessId,
        process_id: ProcessId,
    },
    /// Local state already moved to NO_TOKEN; the token may be lost
    ErrorSendingToken { target: ProcessId, error: String },
}

/// Reply to an inbound TOKEN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TokenReply {
    TokenReceived { from: ProcessId, process_id: ProcessId },
}

/// Reply to `GET /coordinator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderView {
    pub leader_id: Option<ProcessId>,
    pub process_id: ProcessId,
}

/// Reply to `POST /election`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ElectionReply {
    AlreadyInElection,
    /// A higher peer answered and its leader was discovered
    WaitingCoordinator { leader_id: ProcessId },
    /// A higher peer answered but no leader surfaced in time
    SelfElected { leader_id: ProcessId },
    /// No higher peer answered
    Leader { leader_id: ProcessId },
}

impl ElectionReply {
    pub fn leader_id(&self) -> Option<ProcessId> {
        match self {
            Self::AlreadyInElection => None,
            Self::WaitingCoordinator { leader_id }
            | Self::SelfElected { leader_id }
            | Self::Leader { leader_id } => Some(*leader_id),
        }
    }
}

/// Reply to an inbound ELECTION ("OK")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ElectionAck {
    Ok,
}

/// Reply to an inbound COORDINATOR announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CoordinatorReply {
    CoordinatorSet { leader_id: ProcessId },
}

/// A delivered message as recorded by the delivery log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredRecord {
    /// Position in this node's delivery order, starting at 0
    pub sequence: u64,
    pub message: Message,
    /// Unix epoch milliseconds
    pub delivered_at: i64,
}

impl DeliveredRecord {
    pub fn new(sequence: u64, message: Message) -> Self {
        Self {
            sequence,
            message,
            delivered_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
