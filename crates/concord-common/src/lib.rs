//! # Concord Common
//!
//! Shared types, errors, and constants used across Concord components.
//!
//! ## Modules
//! - `types` - Wire messages and replies (ProcessId, Message, AckMessage, etc.)
//! - `error` - Common error types
//! - `constants` - Defaults, routes, and protocol timeouts

pub mod constants;
pub mod error;
pub mod types;

pub use error::ConcordError;
pub use types::*;
