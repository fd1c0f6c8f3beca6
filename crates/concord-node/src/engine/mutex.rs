//! Token-ring mutual exclusion.
//!
//! The token always moves to the static successor `(self_id + 1) mod N`.
//! There is no request queue and no token regeneration: a node without the
//! token polls, and a failed hand-off loses the token for good.

use concord_common::ProcessId;
use serde::Serialize;

/// Token possession state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenState {
    NoToken,
    TokenIdle,
    InCs,
}

impl TokenState {
    pub fn has_token(&self) -> bool {
        !matches!(self, Self::NoToken)
    }

    pub fn in_cs(&self) -> bool {
        matches!(self, Self::InCs)
    }
}

/// Outcome of `request_cs`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsRequest {
    Waiting,
    Entered,
    AlreadyIn,
}

/// Outcome of `release_cs`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsRelease {
    /// Token must now be handed to `next`
    Released { next: ProcessId },
    NotInCs,
}

#[derive(Debug, Clone)]
pub struct MutexToken {
    self_id: ProcessId,
    group_size: u32,
    state: TokenState,
    /// Sender of the last token received (observability only)
    last_from: Option<ProcessId>,
}

impl MutexToken {
    pub fn new(self_id: ProcessId, group_size: u32, holds_token: bool) -> Self {
        Self {
            self_id,
            group_size,
            state: if holds_token {
                TokenState::TokenIdle
            } else {
                TokenState::NoToken
            },
            last_from: None,
        }
    }

    pub fn state(&self) -> TokenState {
        self.state
    }

    pub fn last_from(&self) -> Option<ProcessId> {
        self.last_from
    }

    pub fn successor(&self) -> ProcessId {
        self.self_id.successor(self.group_size)
    }

    pub fn request_cs(&mut self) -> CsRequest {
        match self.state {
            TokenState::NoToken => CsRequest::Waiting,
            TokenState::InCs => CsRequest::AlreadyIn,
            TokenState::TokenIdle => {
                self.state = TokenState::InCs;
                CsRequest::Entered
            }
        }
    }

    /// Leaves the critical section and gives up the token.
    ///
    /// The state is `NO_TOKEN` on return whether or not the hand-off that
    /// follows succeeds.
    pub fn release_cs(&mut self) -> CsRelease {
        if !self.state.in_cs() {
            return CsRelease::NotInCs;
        }
        self.state = TokenState::NoToken;
        CsRelease::Released {
            next: self.successor(),
        }
    }

    /// Any state becomes `TOKEN_IDLE`
    pub fn receive_token(&mut self, from_id: ProcessId) {
        self.state = TokenState::TokenIdle;
        self.last_from = Some(from_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_without_token_waits() {
        let mut token = MutexToken::new(ProcessId::new(1), 3, false);
        assert_eq!(token.request_cs(), CsRequest::Waiting);
        assert_eq!(token.state(), TokenState::NoToken);
    }

    #[test]
    fn test_enter_only_once() {
        let mut token = MutexToken::new(ProcessId::new(0), 3, true);
        assert_eq!(token.request_cs(), CsRequest::Entered);
        assert_eq!(token.request_cs(), CsRequest::AlreadyIn);
        assert!(token.state().in_cs());
        assert!(token.state().has_token());
    }

    #[test]
    fn test_release_targets_successor() {
        for (id, expected) in [(0, 1), (1, 2), (2, 0)] {
            let mut token = MutexToken::new(ProcessId::new(id), 3, true);
            token.request_cs();
            assert_eq!(
                token.release_cs(),
                CsRelease::Released {
                    next: ProcessId::new(expected)
                }
            );
            assert_eq!(token.state(), TokenState::NoToken);
        }
    }

    #[test]
    fn test_release_outside_cs_is_rejected() {
        let mut idle = MutexToken::new(ProcessId::new(0), 2, true);
        assert_eq!(idle.release_cs(), CsRelease::NotInCs);
        assert_eq!(idle.state(), TokenState::TokenIdle);

        let mut empty = MutexToken::new(ProcessId::new(0), 2, false);
        assert_eq!(empty.release_cs(), CsRelease::NotInCs);
        assert_eq!(empty.state(), TokenState::NoToken);
    }

    #[test]
    fn test_receive_token_from_any_state() {
        let mut token = MutexToken::new(ProcessId::new(1), 3, true);
        token.request_cs();
        token.receive_token(ProcessId::new(0));
        assert_eq!(token.state(), TokenState::TokenIdle);
        assert_eq!(token.last_from(), Some(ProcessId::new(0)));
        assert_eq!(token.request_cs(), CsRequest::Entered);
    }
}
