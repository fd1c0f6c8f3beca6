//! In-process transports for multi-node tests.

use async_trait::async_trait;
use concord_common::{ConcordError, MessageKind, PeerMessage, ProcessId};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::Transport;
use crate::engine::{DeliveryLog, ElectionTiming, Node, NodeConfig};

/// Routes every message straight into the target `Node`
#[derive(Default)]
pub struct MemoryTransport {
    nodes: RwLock<HashMap<ProcessId, Arc<Node>>>,
    down: RwLock<HashSet<ProcessId>>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self, node: Arc<Node>) {
        self.nodes.write().await.insert(node.id(), node);
    }

    /// Make `id` unreachable (or reachable again)
    pub async fn set_down(&self, id: ProcessId, down: bool) {
        let mut set = self.down.write().await;
        if down {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }
}

fn reply(value: impl serde::Serialize) -> Result<Value, ConcordError> {
    serde_json::to_value(value).map_err(|e| ConcordError::Internal(e.to_string()))
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, target: ProcessId, message: &PeerMessage) -> Result<Value, ConcordError> {
        if self.down.read().await.contains(&target) {
            return Err(ConcordError::transport(target, "unreachable"));
        }
        let node = self
            .nodes
            .read()
            .await
            .get(&target)
            .cloned()
            .ok_or_else(|| ConcordError::transport(target, "not registered"))?;

        match message {
            PeerMessage::Data(m) => reply(node.on_receive_message(m.clone()).await),
            PeerMessage::Ack(a) => reply(node.on_receive_ack(a.clone()).await),
            PeerMessage::Token(t) => reply(node.on_receive_token(t.from_id).await),
            PeerMessage::Election(e) => reply(node.on_election_message(e.from_id)),
            PeerMessage::Coordinator(c) => {
                reply(node.on_coordinator_message(c.leader_id, c.from_id).await)
            }
            PeerMessage::LeaderQuery => reply(node.get_leader().await),
        }
    }
}

/// Records every send and answers with canned replies
#[derive(Default)]
pub struct ScriptedTransport {
    sent: RwLock<Vec<(ProcessId, PeerMessage)>>,
    unreachable: HashSet<ProcessId>,
    /// Kinds whose sends are accepted but never answered
    hanging: HashSet<MessageKind>,
    /// Answer to leader queries
    leader: Option<ProcessId>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_unreachable(ids: &[u32]) -> Arc<Self> {
        Arc::new(Self {
            unreachable: ids.iter().copied().map(ProcessId::new).collect(),
            ..Default::default()
        })
    }

    pub fn with_hanging(kinds: &[MessageKind]) -> Arc<Self> {
        Arc::new(Self {
            hanging: kinds.iter().copied().collect(),
            ..Default::default()
        })
    }

    pub fn with_leader(leader: u32) -> Arc<Self> {
        Arc::new(Self {
            leader: Some(ProcessId::new(leader)),
            ..Default::default()
        })
    }

    pub async fn sent(&self) -> Vec<(ProcessId, PeerMessage)> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, target: ProcessId, message: &PeerMessage) -> Result<Value, ConcordError> {
        self.sent.write().await.push((target, message.clone()));
        if self.unreachable.contains(&target) {
            return Err(ConcordError::transport(target, "unreachable"));
        }
        if self.hanging.contains(&message.kind()) {
            std::future::pending::<()>().await;
        }

        Ok(match message {
            PeerMessage::LeaderQuery => json!({ "leader_id": self.leader, "process_id": target }),
            _ => json!({ "status": "ok" }),
        })
    }
}

/// A fully connected group over [`MemoryTransport`]
pub struct TestCluster {
    pub transport: Arc<MemoryTransport>,
    pub nodes: Vec<Arc<Node>>,
    pub logs: Vec<Arc<DeliveryLog>>,
}

impl TestCluster {
    pub async fn new(group_size: u32, tune: impl Fn(&mut NodeConfig)) -> Self {
        let transport = MemoryTransport::new();
        let mut nodes = Vec::new();
        let mut logs = Vec::new();

        for id in ProcessId::all(group_size) {
            let mut config = NodeConfig::new(id, group_size);
            config.election = fast_timing();
            tune(&mut config);

            let log = Arc::new(DeliveryLog::new(64));
            let node = Arc::new(Node::new(config, transport.clone(), log.clone()).unwrap());
            transport.register(node.clone()).await;
            nodes.push(node);
            logs.push(log);
        }

        Self {
            transport,
            nodes,
            logs,
        }
    }

    pub fn node(&self, id: u32) -> &Arc<Node> {
        &self.nodes[id as usize]
    }

    pub fn delivered_ids(&self, id: u32) -> Vec<String> {
        self.logs[id as usize]
            .records()
            .into_iter()
            .map(|r| r.message.message_id)
            .collect()
    }

    /// Wait until every live node reports `leader`, or give up after ~2s
    pub async fn await_leader(&self, live: &[u32], leader: u32) -> bool {
        for _ in 0..200 {
            let mut agreed = true;
            for id in live {
                if self.node(*id).get_leader().await.leader_id != Some(ProcessId::new(leader)) {
                    agreed = false;
                }
            }
            if agreed {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

/// Election timing short enough for tests
pub fn fast_timing() -> ElectionTiming {
    ElectionTiming {
        response_timeout: Duration::from_millis(500),
        discovery_rounds: 20,
        discovery_interval: Duration::from_millis(10),
        discovery_deadline: Duration::from_secs(1),
    }
}
