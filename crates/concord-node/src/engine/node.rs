//! Node: composition root of the coordination engine.
//!
//! Every inbound operation takes the node lock for its state transition and
//! releases it before any outbound call, so a concurrently arriving call never
//! observes a half-applied transition. Outbound fan-out is best-effort per
//! target and never rolls back the transition that triggered it.

use concord_common::{
    AckMessage, AckReply, ConcordError, CoordinatorMessage, CoordinatorReply, CsReleaseReply,
    CsRequestReply, ElectionAck, ElectionMessage, ElectionReply, LeaderView, Message,
    MessageKind, MulticastReply, Payload, PeerMessage, ProcessId, ReceiveReply, TokenMessage,
    TokenReply,
};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::clock::ClockService;
use super::delay::DelayPolicy;
use super::delivery::{AckOutcome, DeliveryQueue, DeliverySink, QueueSnapshot};
use super::election::{ElectionCoordinator, ElectionPhase, ElectionTiming};
use super::mutex::{CsRelease, CsRequest, MutexToken, TokenState};
use crate::transport::Transport;

/// Static identity and tuning of a node
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub process_id: ProcessId,
    pub group_size: u32,
    pub initial_clock: u64,
    /// Process that starts out holding the ring token
    pub initial_token_holder: Option<ProcessId>,
    pub delays: DelayPolicy,
    pub election: ElectionTiming,
}

impl NodeConfig {
    pub fn new(process_id: ProcessId, group_size: u32) -> Self {
        Self {
            process_id,
            group_size,
            initial_clock: 0,
            initial_token_holder: Some(ProcessId::new(0)),
            delays: DelayPolicy::none(),
            election: ElectionTiming::default(),
        }
    }

    /// Reject configurations the node must not start with
    pub fn validate(&self) -> Result<(), ConcordError> {
        if self.group_size == 0 {
            return Err(ConcordError::Config("group size must be at least 1".to_string()));
        }
        if !self.process_id.is_member(self.group_size) {
            return Err(ConcordError::Config(format!(
                "process id {} outside [0, {})",
                self.process_id.value(),
                self.group_size
            )));
        }
        if let Some(holder) = self.initial_token_holder {
            if !holder.is_member(self.group_size) {
                return Err(ConcordError::Config(format!(
                    "initial token holder {} outside [0, {})",
                    holder.value(),
                    self.group_size
                )));
            }
        }
        if self.election.discovery_rounds == 0 {
            return Err(ConcordError::Config(
                "election discovery needs at least one round".to_string(),
            ));
        }
        Ok(())
    }
}

/// Mutable engine state, guarded by the node lock
struct NodeState {
    clock: ClockService,
    queue: DeliveryQueue,
    token: MutexToken,
    election: ElectionCoordinator,
}

/// Point-in-time view of every component
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub process_id: ProcessId,
    pub group_size: u32,
    pub clock: u64,
    pub queue: QueueSnapshot,
    pub token: TokenState,
    pub token_last_from: Option<ProcessId>,
    pub election: ElectionPhase,
    pub leader_id: Option<ProcessId>,
}

pub struct Node {
    id: ProcessId,
    group_size: u32,
    state: Mutex<NodeState>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn DeliverySink>,
    delays: DelayPolicy,
    timing: ElectionTiming,
}

impl Node {
    pub fn new(
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<Self, ConcordError> {
        config.validate()?;

        let id = config.process_id;
        let group_size = config.group_size;
        let holds_token = config.initial_token_holder == Some(id);

        let state = NodeState {
            clock: ClockService::new(config.initial_clock),
            queue: DeliveryQueue::new(group_size),
            token: MutexToken::new(id, group_size, holds_token),
            election: ElectionCoordinator::new(id, group_size),
        };

        Ok(Self {
            id,
            group_size,
            state: Mutex::new(state),
            transport,
            sink,
            delays: config.delays,
            timing: config.election,
        })
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn group_size(&self) -> u32 {
        self.group_size
    }

    pub async fn clock(&self) -> u64 {
        self.state.lock().await.clock.current()
    }

    pub async fn status(&self) -> NodeStatus {
        let state = self.state.lock().await;
        NodeStatus {
            process_id: self.id,
            group_size: self.group_size,
            clock: state.clock.current(),
            queue: state.queue.snapshot(),
            token: state.token.state(),
            token_last_from: state.token.last_from(),
            election: state.election.phase(),
            leader_id: state.election.leader_id(),
        }
    }

    fn group(&self) -> Vec<ProcessId> {
        ProcessId::all(self.group_size).collect()
    }

    /// Send `message` to every target concurrently; failures are logged only
    async fn fan_out(&self, targets: Vec<ProcessId>, message: PeerMessage) -> usize {
        let message = &message;
        let sends = targets.into_iter().map(|target| async move {
            (target, self.transport.send(target, message).await)
        });

        let mut delivered = 0;
        for (target, result) in join_all(sends).await {
            match result {
                Ok(_) => delivered += 1,
                Err(e) => warn!(
                    process_id = %self.id,
                    target_id = %target,
                    kind = %message.kind(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "Fan-out send failed"
                ),
            }
        }
        delivered
    }

    // === Total-order multicast ===

    /// Stamp `payload` with the next clock value and send it to the whole group,
    /// this node included.
    pub async fn multicast_send(&self, payload: Payload) -> MulticastReply {
        let timestamp = self.state.lock().await.clock.tick_send();
        let message_id = Uuid::new_v4().to_string();

        let message = Message {
            message_id: message_id.clone(),
            origin_id: self.id,
            timestamp,
            payload,
            delivered: false,
        };

        let reached = self.fan_out(self.group(), PeerMessage::Data(message)).await;

        info!(
            process_id = %self.id,
            message_id = %message_id,
            timestamp,
            reached,
            "[MULTICAST] message sent"
        );

        MulticastReply::Sent {
            message_id,
            timestamp,
            process_id: self.id,
        }
    }

    /// Inbound DATA: bump the clock, enqueue, then acknowledge to the group
    pub async fn on_receive_message(&self, message: Message) -> ReceiveReply {
        let message_id = message.message_id.clone();
        let origin = message.origin_id;
        let incoming_ts = message.timestamp;

        let ack_ts = {
            let mut state = self.state.lock().await;
            state.clock.tick_receive(incoming_ts);
            if !state.queue.enqueue(message) {
                debug!(process_id = %self.id, message_id = %message_id, "Duplicate message ignored");
            }
            // Acks may have raced ahead of the message itself
            state.queue.try_process_head(|m| self.sink.on_deliver(m));
            debug!(
                process_id = %self.id,
                pending = state.queue.len(),
                acks = state.queue.ack_count(&message_id),
                "Queue after enqueue"
            );
            state.clock.current()
        };

        if let Some(delay) = self
            .delays
            .delay_for(self.id, MessageKind::Ack, Some(&message_id))
        {
            info!(
                process_id = %self.id,
                message_id = %message_id,
                delay_ms = delay.as_millis() as u64,
                "Delaying acknowledgement"
            );
            tokio::time::sleep(delay).await;
        }

        let ack = AckMessage {
            message_id: message_id.clone(),
            from_id: self.id,
            ts: ack_ts,
        };
        self.fan_out(self.group(), PeerMessage::Ack(ack)).await;

        let clock = self.clock().await;
        info!(
            process_id = %self.id,
            message_id = %message_id,
            timestamp = incoming_ts,
            origin = %origin,
            "[RECEIVE] message enqueued"
        );

        ReceiveReply::Received { clock }
    }

    /// Inbound ACK: record it and deliver whatever became deliverable
    pub async fn on_receive_ack(&self, ack: AckMessage) -> AckReply {
        let (outcome, processed, clock) = {
            let mut state = self.state.lock().await;
            state.clock.tick_receive(ack.ts);
            let outcome = state.queue.add_ack(&ack.message_id, ack.from_id);
            let processed = state.queue.try_process_head(|m| self.sink.on_deliver(m));
            if processed > 0 {
                debug!(
                    process_id = %self.id,
                    processed,
                    delivered_total = state.queue.delivered_count(),
                    pending = state.queue.len(),
                    "[DELIVER] head released"
                );
            }
            (outcome, processed, state.clock.current())
        };

        match outcome {
            AckOutcome::Recorded => info!(
                process_id = %self.id,
                message_id = %ack.message_id,
                from = %ack.from_id,
                processed,
                "[ACK] acknowledgement recorded"
            ),
            other => debug!(
                process_id = %self.id,
                message_id = %ack.message_id,
                from = %ack.from_id,
                outcome = ?other,
                "[ACK] acknowledgement ignored"
            ),
        }

        AckReply::Ack {
            updated: ack.message_id,
            processed,
            clock,
        }
    }

    // === Token ring ===

    pub async fn request_cs(&self) -> CsRequestReply {
        let outcome = self.state.lock().await.token.request_cs();

        match outcome {
            CsRequest::Waiting => {
                warn!(process_id = %self.id, "[CS] no token held, waiting");
                CsRequestReply::Waiting { has_token: false }
            }
            CsRequest::AlreadyIn => {
                warn!(process_id = %self.id, "[CS] already in critical section");
                CsRequestReply::AlreadyIn { has_token: true }
            }
            CsRequest::Entered => {
                info!(process_id = %self.id, "[CS] entered critical section");
                CsRequestReply::Entered {
                    has_token: true,
                    process_id: self.id,
                }
            }
        }
    }

    /// Leave the critical section and hand the token to the ring successor.
    ///
    /// A failed hand-off is reported, not retried; the token is then lost.
    pub async fn release_cs(&self) -> CsReleaseReply {
        let (outcome, has_token) = {
            let mut state = self.state.lock().await;
            let outcome = state.token.release_cs();
            (outcome, state.token.state().has_token())
        };

        let next = match outcome {
            CsRelease::NotInCs => {
                warn!(process_id = %self.id, "[CS] release outside critical section");
                return CsReleaseReply::NotInCs { has_token };
            }
            CsRelease::Released { next } => next,
        };

        if let Some(delay) = self.delays.delay_for(self.id, MessageKind::Token, None) {
            info!(
                process_id = %self.id,
                delay_ms = delay.as_millis() as u64,
                "[CS] delaying token hand-off"
            );
            tokio::time::sleep(delay).await;
        }

        let token = PeerMessage::Token(TokenMessage { from_id: self.id });
        match self.transport.send(next, &token).await {
            Ok(_) => {
                info!(process_id = %self.id, next_holder = %next, "[CS] released, token passed");
                CsReleaseReply::Released {
                    next_holder: next,
                    process_id: self.id,
                }
            }
            Err(e) => {
                error!(
                    process_id = %self.id,
                    target_id = %next,
                    error = %e,
                    "[CS] token hand-off failed, token lost"
                );
                CsReleaseReply::ErrorSendingToken {
                    target: next,
                    error: e.to_string(),
                }
            }
        }
    }

    pub async fn on_receive_token(&self, from_id: ProcessId) -> TokenReply {
        self.state.lock().await.token.receive_token(from_id);
        info!(process_id = %self.id, from = %from_id, "[TOKEN] token received");

        TokenReply::TokenReceived {
            from: from_id,
            process_id: self.id,
        }
    }

    // === Leader election ===

    pub async fn get_leader(&self) -> LeaderView {
        LeaderView {
            leader_id: self.state.lock().await.election.leader_id(),
            process_id: self.id,
        }
    }

    /// Run one bully election from this node.
    ///
    /// Returns immediately if an election is already running here.
    pub async fn start_election(&self) -> ElectionReply {
        let Some(higher) = self.state.lock().await.election.begin() else {
            info!(process_id = %self.id, "[ELECTION] already in election");
            return ElectionReply::AlreadyInElection;
        };

        info!(process_id = %self.id, contacting = ?higher, "[ELECTION] election started");

        if !self.challenge(higher).await {
            info!(process_id = %self.id, "[ELECTION] no OK from higher ids, taking leadership");
            let leader_id = self.announce_self().await;
            return ElectionReply::Leader { leader_id };
        }

        self.state.lock().await.election.await_coordinator();
        info!(process_id = %self.id, "[ELECTION] OK received, waiting for coordinator");

        let discovered =
            tokio::time::timeout(self.timing.discovery_deadline, self.discover_leader()).await;

        match discovered {
            Ok(Some(leader_id)) => {
                self.state.lock().await.election.adopt_leader(leader_id);
                info!(process_id = %self.id, leader = %leader_id, "[ELECTION] coordinator found");
                ElectionReply::WaitingCoordinator { leader_id }
            }
            _ => {
                info!(process_id = %self.id, "[ELECTION] no coordinator surfaced, taking leadership");
                let leader_id = self.announce_self().await;
                ElectionReply::SelfElected { leader_id }
            }
        }
    }

    /// Send ELECTION to `higher`; true if at least one answered in time
    async fn challenge(&self, higher: Vec<ProcessId>) -> bool {
        let message = PeerMessage::Election(ElectionMessage { from_id: self.id });
        let message = &message;
        let response_timeout = self.timing.response_timeout;

        let sends = higher.into_iter().map(|target| async move {
            match tokio::time::timeout(response_timeout, self.transport.send(target, message)).await
            {
                Ok(Ok(_)) => true,
                Ok(Err(e)) => {
                    debug!(process_id = %self.id, target_id = %target, error = %e, "[ELECTION] no answer");
                    false
                }
                Err(_) => {
                    debug!(process_id = %self.id, target_id = %target, "[ELECTION] answer timed out");
                    false
                }
            }
        });

        join_all(sends).await.into_iter().any(|answered| answered)
    }

    /// Poll for a known leader: local state first, then each peer in turn
    async fn discover_leader(&self) -> Option<ProcessId> {
        for round in 0..self.timing.discovery_rounds {
            if let Some(leader) = self.state.lock().await.election.leader_id() {
                return Some(leader);
            }

            for peer in ProcessId::all(self.group_size).filter(|p| *p != self.id) {
                match self.transport.send(peer, &PeerMessage::LeaderQuery).await {
                    Ok(reply) => {
                        if let Some(leader) = leader_from_reply(&reply) {
                            return Some(leader);
                        }
                    }
                    Err(e) => {
                        debug!(process_id = %self.id, round, peer = %peer, error = %e, "Leader query failed")
                    }
                }
            }

            tokio::time::sleep(self.timing.discovery_interval).await;
        }
        None
    }

    /// Become leader and announce it to the whole group
    async fn announce_self(&self) -> ProcessId {
        let leader_id = self.state.lock().await.election.promote_self();

        let announcement = PeerMessage::Coordinator(CoordinatorMessage {
            leader_id,
            from_id: self.id,
        });
        self.fan_out(self.group(), announcement).await;

        info!(process_id = %self.id, leader = %leader_id, "[COORDINATOR] leadership announced");
        leader_id
    }

    /// Inbound ELECTION from a lower id: answer OK and start our own election
    /// in the background.
    pub fn on_election_message(self: &Arc<Self>, from_id: ProcessId) -> ElectionAck {
        info!(process_id = %self.id, from = %from_id, "[ELECTION] ELECTION received, answering OK");

        let node = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = node.start_election().await;
            debug!(
                process_id = %node.id,
                ?outcome,
                leader = ?outcome.leader_id(),
                "[ELECTION] background election finished"
            );
        });

        ElectionAck::Ok
    }

    /// Inbound COORDINATOR: adopt unconditionally, even mid-election
    pub async fn on_coordinator_message(
        &self,
        leader_id: ProcessId,
        from_id: ProcessId,
    ) -> CoordinatorReply {
        self.state.lock().await.election.adopt_leader(leader_id);
        info!(
            process_id = %self.id,
            leader = %leader_id,
            from = %from_id,
            "[COORDINATOR] leader recorded"
        );

        CoordinatorReply::CoordinatorSet { leader_id }
    }
}

fn leader_from_reply(reply: &serde_json::Value) -> Option<ProcessId> {
    reply
        .get("leader_id")
        .and_then(serde_json::Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .map(ProcessId::new)
}
