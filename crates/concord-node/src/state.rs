//! Application state and shared resources.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::NodeSetup;
use crate::engine::{DeliveryLog, Node, NodeConfig};
use crate::transport::{HttpTransport, Transport};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The coordination engine of this process
    pub node: Arc<Node>,

    /// Messages delivered in total order
    pub delivery_log: Arc<DeliveryLog>,

    /// Process start, for uptime reporting
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create the node behind the HTTP peer transport
    pub fn new(setup: NodeSetup, log_capacity: usize) -> Result<Self> {
        let transport = HttpTransport::new(setup.peers, setup.timeouts)?;
        Self::with_transport(setup.node, Arc::new(transport), log_capacity)
    }

    pub fn with_transport(
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        log_capacity: usize,
    ) -> Result<Self> {
        let delivery_log = Arc::new(DeliveryLog::new(log_capacity));
        let node = Node::new(config, transport, delivery_log.clone())
            .context("Failed to initialize node")?;

        Ok(Self {
            node: Arc::new(node),
            delivery_log,
            started_at: Utc::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
