//! Shared constants for Concord components.

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Default peer address template; `{id}` is replaced by the process id
pub const DEFAULT_PEER_URL_TEMPLATE: &str =
    "http://coord-app-{id}.coord-app.q1.svc.cluster.local:8000";

/// Placeholder substituted in the peer URL template
pub const PEER_ID_PLACEHOLDER: &str = "{id}";

/// Default starting value of the Lamport clock
pub const DEFAULT_INITIAL_CLOCK: u64 = 0;

/// Process that holds the ring token at startup
pub const DEFAULT_INITIAL_TOKEN_HOLDER: u32 = 0;

/// Number of delivered messages retained for `/delivered`
pub const DELIVERY_LOG_CAPACITY: usize = 1024;

/// Protocol timeouts (milliseconds)
pub mod timeouts {
    /// DATA and ACK fan-out request timeout
    pub const MULTICAST_SEND_MS: u64 = 10_000;

    /// Token hand-off request timeout
    pub const TOKEN_SEND_MS: u64 = 5_000;

    /// ELECTION and COORDINATOR request timeout
    pub const ELECTION_SEND_MS: u64 = 5_000;

    /// Leader query request timeout (coordinator discovery)
    pub const LEADER_QUERY_MS: u64 = 3_000;

    /// Coordinator discovery polling rounds
    pub const DISCOVERY_ROUNDS: u32 = 10;

    /// Delay between discovery rounds
    pub const DISCOVERY_INTERVAL_MS: u64 = 1_000;

    /// Overall coordinator discovery deadline
    pub const DISCOVERY_DEADLINE_MS: u64 = 10_000;
}

/// HTTP routes
pub mod routes {
    /// Liveness + clock
    pub const HEALTH: &str = "/health";

    /// Engine snapshot
    pub const STATUS: &str = "/status";

    /// Delivery log
    pub const DELIVERED: &str = "/delivered";

    /// Client entry point for a multicast
    pub const MULTICAST: &str = "/multicast";

    /// DATA from a peer
    pub const MESSAGE: &str = "/message";

    /// ACK from a peer
    pub const ACK: &str = "/ack";

    /// Enter the critical section
    pub const REQUEST_CS: &str = "/request_cs";

    /// Leave the critical section
    pub const RELEASE_CS: &str = "/release_cs";

    /// TOKEN from the ring predecessor
    pub const TOKEN: &str = "/token";

    /// Known leader (GET)
    pub const COORDINATOR: &str = "/coordinator";

    /// Client entry point for an election
    pub const ELECTION: &str = "/election";

    /// ELECTION from a lower peer
    pub const ELECTION_MSG: &str = "/election_msg";

    /// COORDINATOR announcement
    pub const COORDINATOR_MSG: &str = "/coordinator_msg";
}
