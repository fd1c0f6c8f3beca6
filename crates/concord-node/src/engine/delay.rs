//! Artificial delay injection for reproducing ordering races.

use concord_common::{MessageKind, ProcessId};
use std::time::Duration;

/// Delay applied before an outbound ACK fan-out or token hand-off.
///
/// A delay applies when every configured filter matches: the sending process
/// (empty list matches all), the message kind, and for ACKs optionally one
/// specific message id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelayPolicy {
    pub delay: Duration,
    pub processes: Vec<ProcessId>,
    pub kinds: Vec<MessageKind>,
    pub message_id: Option<String>,
}

impl DelayPolicy {
    /// No delay anywhere
    pub fn none() -> Self {
        Self::default()
    }

    pub fn delay_for(
        &self,
        process: ProcessId,
        kind: MessageKind,
        message_id: Option<&str>,
    ) -> Option<Duration> {
        if self.delay.is_zero() || !self.kinds.contains(&kind) {
            return None;
        }
        if !self.processes.is_empty() && !self.processes.contains(&process) {
            return None;
        }
        if let (Some(wanted), Some(actual)) = (self.message_id.as_deref(), message_id) {
            if wanted != actual {
                return None;
            }
        }
        Some(self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DelayPolicy {
        DelayPolicy {
            delay: Duration::from_millis(200),
            processes: vec![ProcessId::new(2)],
            kinds: vec![MessageKind::Ack],
            message_id: None,
        }
    }

    #[test]
    fn test_matches_process_and_kind() {
        let policy = policy();
        assert_eq!(
            policy.delay_for(ProcessId::new(2), MessageKind::Ack, Some("m")),
            Some(Duration::from_millis(200))
        );
        assert_eq!(policy.delay_for(ProcessId::new(1), MessageKind::Ack, Some("m")), None);
        assert_eq!(policy.delay_for(ProcessId::new(2), MessageKind::Token, None), None);
    }

    #[test]
    fn test_empty_process_list_matches_everyone() {
        let policy = DelayPolicy {
            processes: vec![],
            kinds: vec![MessageKind::Token],
            ..policy()
        };
        assert!(policy.delay_for(ProcessId::new(0), MessageKind::Token, None).is_some());
        assert!(policy.delay_for(ProcessId::new(5), MessageKind::Token, None).is_some());
    }

    #[test]
    fn test_message_id_filter() {
        let policy = DelayPolicy {
            message_id: Some("slow".to_string()),
            ..policy()
        };
        assert!(policy.delay_for(ProcessId::new(2), MessageKind::Ack, Some("slow")).is_some());
        assert!(policy.delay_for(ProcessId::new(2), MessageKind::Ack, Some("fast")).is_none());
    }

    #[test]
    fn test_zero_delay_disabled() {
        let policy = DelayPolicy {
            delay: Duration::ZERO,
            ..policy()
        };
        assert!(policy.delay_for(ProcessId::new(2), MessageKind::Ack, None).is_none());
        assert!(DelayPolicy::none()
            .delay_for(ProcessId::new(0), MessageKind::Ack, None)
            .is_none());
    }
}
