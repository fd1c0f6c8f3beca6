//! Common error types for Concord components.

use thiserror::Error;

use crate::types::ProcessId;

/// Common errors across Concord components
#[derive(Debug, Error)]
pub enum ConcordError {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Peer unreachable or rejected the call
    #[error("Transport error to {target}: {reason}")]
    Transport { target: ProcessId, reason: String },

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConcordError {
    /// Shorthand for a transport failure towards `target`
    pub fn transport(target: ProcessId, reason: impl ToString) -> Self {
        Self::Transport {
            target,
            reason: reason.to_string(),
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::InvalidInput(_) => 400,
            Self::Transport { .. } => 502,
            Self::Timeout(_) => 504,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if the caller may retry; the engine itself never does
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout(_))
    }
}
