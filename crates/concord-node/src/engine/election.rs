//! Bully leader election state.
//!
//! Holds the phase and the known leader. The message flow (ELECTION fan-out,
//! coordinator discovery, announcements) is driven by [`super::Node`].
//!
//! Announcements carry no term: whichever COORDINATOR arrives last wins,
//! even if it is stale.

use concord_common::ProcessId;
use concord_common::constants::timeouts;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElectionPhase {
    Idle,
    Electing,
    WaitingCoordinator,
}

/// Bounded waits of the election flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionTiming {
    /// Per-peer wait for an OK to an ELECTION message
    pub response_timeout: Duration,
    /// Polling rounds while waiting for a coordinator
    pub discovery_rounds: u32,
    /// Pause between polling rounds
    pub discovery_interval: Duration,
    /// Overall cap on coordinator discovery
    pub discovery_deadline: Duration,
}

impl Default for ElectionTiming {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(timeouts::ELECTION_SEND_MS),
            discovery_rounds: timeouts::DISCOVERY_ROUNDS,
            discovery_interval: Duration::from_millis(timeouts::DISCOVERY_INTERVAL_MS),
            discovery_deadline: Duration::from_millis(timeouts::DISCOVERY_DEADLINE_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElectionCoordinator {
    self_id: ProcessId,
    group_size: u32,
    phase: ElectionPhase,
    leader_id: Option<ProcessId>,
}

impl ElectionCoordinator {
    pub fn new(self_id: ProcessId, group_size: u32) -> Self {
        Self {
            self_id,
            group_size,
            phase: ElectionPhase::Idle,
            leader_id: None,
        }
    }

    pub fn phase(&self) -> ElectionPhase {
        self.phase
    }

    pub fn leader_id(&self) -> Option<ProcessId> {
        self.leader_id
    }

    pub fn in_election(&self) -> bool {
        self.phase != ElectionPhase::Idle
    }

    /// Enter `ELECTING` and forget the current leader.
    ///
    /// Returns the strictly higher ids to contact, or `None` when an election
    /// is already running on this node.
    pub fn begin(&mut self) -> Option<Vec<ProcessId>> {
        if self.in_election() {
            return None;
        }
        self.phase = ElectionPhase::Electing;
        self.leader_id = None;
        Some(self.self_id.higher(self.group_size).collect())
    }

    /// A higher peer answered OK.
    ///
    /// No-op once a COORDINATOR has already ended the election.
    pub fn await_coordinator(&mut self) {
        if self.phase == ElectionPhase::Electing {
            self.phase = ElectionPhase::WaitingCoordinator;
        }
    }

    /// Accept `leader_id` and return to `IDLE`, whatever the current phase
    pub fn adopt_leader(&mut self, leader_id: ProcessId) {
        self.leader_id = Some(leader_id);
        self.phase = ElectionPhase::Idle;
    }

    /// Become leader; the caller broadcasts the announcement
    pub fn promote_self(&mut self) -> ProcessId {
        self.adopt_leader(self.self_id);
        self.self_id
    }
}
