//! Coordination engine.
//!
//! Implements:
//! - Lamport clock
//! - Total-order multicast with a full-group acknowledgement quorum
//! - Token-ring mutual exclusion
//! - Bully leader election

mod clock;
mod delay;
mod delivery;
mod election;
mod mutex;
mod node;

pub use delay::DelayPolicy;
pub use delivery::DeliveryLog;
pub use election::ElectionTiming;
pub use node::{Node, NodeConfig, NodeStatus};
