//! Configuration management for Concord nodes.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file,
//! `CONCORD__*` environment variables, then CLI flags.

use anyhow::{Context, Result, bail};
use concord_common::constants::{
    DEFAULT_INITIAL_CLOCK, DEFAULT_INITIAL_TOKEN_HOLDER, DEFAULT_LISTEN_ADDR,
    DEFAULT_PEER_URL_TEMPLATE, DELIVERY_LOG_CAPACITY, PEER_ID_PLACEHOLDER, timeouts,
};
use concord_common::{ConcordError, MessageKind, ProcessId};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::engine::{DelayPolicy, ElectionTiming, NodeConfig};
use crate::transport::SendTimeouts;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Process id, as an integer or a hostname ending in `-<id>`
    #[serde(default)]
    pub process_id: Option<String>,

    /// Group size N
    #[serde(default)]
    pub num_processes: Option<u32>,

    /// Starting value of the Lamport clock
    #[serde(default = "default_initial_clock")]
    pub initial_clock: u64,

    /// Whether a token is placed in the ring at startup
    #[serde(default = "default_true")]
    pub bootstrap_token: bool,

    /// Process that starts out holding the token
    #[serde(default = "default_token_holder")]
    pub initial_token_holder: u32,

    /// Delivered messages retained for `/delivered`
    #[serde(default = "default_log_capacity")]
    pub delivery_log_capacity: usize,

    #[serde(default)]
    pub peers: PeersConfig,

    #[serde(default)]
    pub delay: DelayConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Peer addressing
#[derive(Debug, Clone, Deserialize)]
pub struct PeersConfig {
    /// Address template; `{id}` is replaced by the process id
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// Explicit addresses indexed by process id; overrides the template
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            addresses: Vec::new(),
        }
    }
}

/// Artificial delays for exercising slow paths
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DelayConfig {
    /// 0 disables injection
    #[serde(default)]
    pub delay_ms: u64,

    /// Processes that delay; empty means every process
    #[serde(default)]
    pub processes: Vec<u32>,

    /// `ack` and/or `token`
    #[serde(default)]
    pub kinds: Vec<MessageKind>,

    /// Restrict ack delays to this message
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Request timeouts and election discovery pacing (milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_multicast_ms")]
    pub multicast_ms: u64,

    #[serde(default = "default_token_ms")]
    pub token_ms: u64,

    #[serde(default = "default_election_ms")]
    pub election_ms: u64,

    #[serde(default = "default_leader_query_ms")]
    pub leader_query_ms: u64,

    #[serde(default = "default_discovery_rounds")]
    pub discovery_rounds: u32,

    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,

    #[serde(default = "default_discovery_deadline_ms")]
    pub discovery_deadline_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            multicast_ms: default_multicast_ms(),
            token_ms: default_token_ms(),
            election_ms: default_election_ms(),
            leader_query_ms: default_leader_query_ms(),
            discovery_rounds: default_discovery_rounds(),
            discovery_interval_ms: default_discovery_interval_ms(),
            discovery_deadline_ms: default_discovery_deadline_ms(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_initial_clock() -> u64 { DEFAULT_INITIAL_CLOCK }
fn default_true() -> bool { true }
fn default_token_holder() -> u32 { DEFAULT_INITIAL_TOKEN_HOLDER }
fn default_log_capacity() -> usize { DELIVERY_LOG_CAPACITY }
fn default_url_template() -> String { DEFAULT_PEER_URL_TEMPLATE.to_string() }
fn default_multicast_ms() -> u64 { timeouts::MULTICAST_SEND_MS }
fn default_token_ms() -> u64 { timeouts::TOKEN_SEND_MS }
fn default_election_ms() -> u64 { timeouts::ELECTION_SEND_MS }
fn default_leader_query_ms() -> u64 { timeouts::LEADER_QUERY_MS }
fn default_discovery_rounds() -> u32 { timeouts::DISCOVERY_ROUNDS }
fn default_discovery_interval_ms() -> u64 { timeouts::DISCOVERY_INTERVAL_MS }
fn default_discovery_deadline_ms() -> u64 { timeouts::DISCOVERY_DEADLINE_MS }

/// Everything a node needs to start, checked
#[derive(Debug, Clone)]
pub struct NodeSetup {
    pub node: NodeConfig,
    pub peers: PeerDirectory,
    pub timeouts: SendTimeouts,
}

impl AppConfig {
    /// Load configuration from file and environment, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut builder = config::Config::builder();

        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            tracing::warn!(path = config_path, "Config file not found, using defaults");
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("CONCORD")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("peers.addresses")
                    .with_list_parse_key("delay.processes")
                    .with_list_parse_key("delay.kinds"),
            )
            .build()
            .context("Failed to load configuration")?;

        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;

        // Apply CLI overrides
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref process_id) = args.process_id {
            config.process_id = Some(process_id.clone());
        }
        if let Some(num_processes) = args.num_processes {
            config.num_processes = Some(num_processes);
        }

        // Pods get their ordinal through the hostname
        if config.process_id.is_none() {
            config.process_id = std::env::var("HOSTNAME").ok();
        }

        Ok(config)
    }

    /// Check the configuration and derive the node's startup parameters
    pub fn validate(&self) -> Result<NodeSetup> {
        let raw_id = self
            .process_id
            .as_deref()
            .context("process id not configured (--process-id, CONCORD__PROCESS_ID or HOSTNAME)")?;
        let process_id: ProcessId = raw_id.parse()?;

        let group_size = self
            .num_processes
            .context("group size not configured (--num-processes or CONCORD__NUM_PROCESSES)")?;

        let peers = if self.peers.addresses.is_empty() {
            if !self.peers.url_template.contains(PEER_ID_PLACEHOLDER) {
                bail!("peers.url_template must contain {PEER_ID_PLACEHOLDER}");
            }
            PeerDirectory::from_template(&self.peers.url_template)
        } else {
            if self.peers.addresses.len() != group_size as usize {
                bail!(
                    "peers.addresses lists {} addresses for a group of {}",
                    self.peers.addresses.len(),
                    group_size
                );
            }
            PeerDirectory::from_addresses(self.peers.addresses.clone())
        };

        if let Some(kind) = self
            .delay
            .kinds
            .iter()
            .find(|k| !matches!(k, MessageKind::Ack | MessageKind::Token))
        {
            bail!("delay.kinds does not support {kind}");
        }

        let node = NodeConfig {
            process_id,
            group_size,
            initial_clock: self.initial_clock,
            initial_token_holder: self
                .bootstrap_token
                .then(|| ProcessId::from(self.initial_token_holder)),
            delays: self.delay_policy(),
            election: ElectionTiming {
                response_timeout: Duration::from_millis(self.timeouts.election_ms),
                discovery_rounds: self.timeouts.discovery_rounds,
                discovery_interval: Duration::from_millis(self.timeouts.discovery_interval_ms),
                discovery_deadline: Duration::from_millis(self.timeouts.discovery_deadline_ms),
            },
        };
        node.validate()?;

        Ok(NodeSetup {
            node,
            peers,
            timeouts: SendTimeouts {
                multicast: Duration::from_millis(self.timeouts.multicast_ms),
                token: Duration::from_millis(self.timeouts.token_ms),
                election: Duration::from_millis(self.timeouts.election_ms),
                leader_query: Duration::from_millis(self.timeouts.leader_query_ms),
            },
        })
    }

    fn delay_policy(&self) -> DelayPolicy {
        if self.delay.delay_ms == 0 || self.delay.kinds.is_empty() {
            return DelayPolicy::none();
        }

        DelayPolicy {
            delay: Duration::from_millis(self.delay.delay_ms),
            processes: self.delay.processes.iter().copied().map(ProcessId::from).collect(),
            kinds: self.delay.kinds.clone(),
            message_id: self.delay.message_id.clone(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            process_id: None,
            num_processes: None,
            initial_clock: default_initial_clock(),
            bootstrap_token: true,
            initial_token_holder: default_token_holder(),
            delivery_log_capacity: default_log_capacity(),
            peers: PeersConfig::default(),
            delay: DelayConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Maps process ids to base URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerDirectory {
    /// `{id}` substituted into a URL pattern
    Template(String),
    /// Fixed list indexed by process id
    Addresses(Vec<String>),
}

impl PeerDirectory {
    pub fn from_template(template: &str) -> Self {
        Self::Template(template.trim_end_matches('/').to_string())
    }

    pub fn from_addresses(addresses: Vec<String>) -> Self {
        Self::Addresses(
            addresses
                .into_iter()
                .map(|a| a.trim_end_matches('/').to_string())
                .collect(),
        )
    }

    /// Base URL of `id`, without a trailing slash
    pub fn address_of(&self, id: ProcessId) -> Result<String, ConcordError> {
        match self {
            Self::Template(template) => {
                Ok(template.replace(PEER_ID_PLACEHOLDER, &id.value().to_string()))
            }
            Self::Addresses(addresses) => addresses
                .get(id.value() as usize)
                .cloned()
                .ok_or_else(|| ConcordError::Config(format!("no address configured for {id}"))),
        }
    }
}
