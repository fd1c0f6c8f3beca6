//! Total-order delivery queue.
//!
//! Buffers multicast messages ordered by `(timestamp, origin_id, message_id)`
//! and releases them strictly head-first, once every process in the group has
//! acknowledged the head. A head that never reaches the full quorum blocks all
//! later deliveries at this node; that is the price of the total order.

use concord_common::{DeliveredRecord, Message, ProcessId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Sort key of the pending queue. Field order is the comparison order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct OrderKey {
    timestamp: u64,
    origin_id: ProcessId,
    message_id: String,
}

impl OrderKey {
    fn of(message: &Message) -> Self {
        Self {
            timestamp: message.timestamp,
            origin_id: message.origin_id,
            message_id: message.message_id.clone(),
        }
    }
}

/// Result of recording an acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// New acknowledgement stored (possibly ahead of its message)
    Recorded,
    /// Same `(message_id, from_id)` pair seen before
    Duplicate,
    /// Message already delivered; ack dropped
    AlreadyDelivered,
    /// Sender outside the group; it can never count towards the quorum
    UnknownSender,
}

/// Ordering and quorum engine for multicast delivery
#[derive(Debug)]
pub struct DeliveryQueue {
    group_size: u32,
    pending: BTreeMap<OrderKey, Message>,
    /// message_id -> key in `pending`
    index: HashMap<String, OrderKey>,
    /// Ack sets, including early acks for messages not yet enqueued.
    /// An early ack set whose message never arrives is kept for the process
    /// lifetime and counted in `QueueSnapshot::early_acks`.
    acks: HashMap<String, BTreeSet<ProcessId>>,
    /// Ids of every delivered message. Never pruned: this set is what rejects
    /// a re-sent or late-acked message after delivery.
    delivered: HashSet<String>,
}

impl DeliveryQueue {
    pub fn new(group_size: u32) -> Self {
        Self {
            group_size,
            pending: BTreeMap::new(),
            index: HashMap::new(),
            acks: HashMap::new(),
            delivered: HashSet::new(),
        }
    }

    /// Number of messages waiting for delivery
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Number of messages delivered so far
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    /// Insert a message in total order.
    ///
    /// Returns false for a duplicate of a pending or delivered message. An ack
    /// set collected before the message arrived is kept as is.
    pub fn enqueue(&mut self, message: Message) -> bool {
        let id = &message.message_id;
        if self.delivered.contains(id) || self.index.contains_key(id) {
            return false;
        }

        let key = OrderKey::of(&message);
        self.acks.entry(id.clone()).or_default();
        self.index.insert(id.clone(), key.clone());
        self.pending.insert(key, message);
        true
    }

    /// Record that `from_id` acknowledged `message_id`. Idempotent.
    pub fn add_ack(&mut self, message_id: &str, from_id: ProcessId) -> AckOutcome {
        if !from_id.is_member(self.group_size) {
            return AckOutcome::UnknownSender;
        }
        if self.delivered.contains(message_id) {
            return AckOutcome::AlreadyDelivered;
        }

        let inserted = self
            .acks
            .entry(message_id.to_string())
            .or_default()
            .insert(from_id);

        if inserted {
            AckOutcome::Recorded
        } else {
            AckOutcome::Duplicate
        }
    }

    /// Acknowledgements recorded for a pending or not-yet-seen message
    pub fn ack_count(&self, message_id: &str) -> usize {
        self.acks.get(message_id).map_or(0, BTreeSet::len)
    }

    /// Deliver from the head while the head is acknowledged by the whole group.
    ///
    /// Each delivered message is marked, removed from consideration, and passed
    /// to `on_deliver` in order. Returns how many were delivered.
    pub fn try_process_head(&mut self, mut on_deliver: impl FnMut(&Message)) -> usize {
        let quorum = self.group_size as usize;
        let mut count = 0;

        loop {
            let Some((head, _)) = self.pending.first_key_value() else {
                break;
            };
            if self.acks.get(&head.message_id).map_or(0, BTreeSet::len) != quorum {
                break;
            }
            let Some((_, mut message)) = self.pending.pop_first() else {
                break;
            };

            message.delivered = true;
            self.index.remove(&message.message_id);
            self.acks.remove(&message.message_id);
            self.delivered.insert(message.message_id.clone());

            on_deliver(&message);
            count += 1;
        }

        count
    }

    /// Point-in-time view for the status endpoint
    pub fn snapshot(&self) -> QueueSnapshot {
        let entries: Vec<PendingEntry> = self
            .pending
            .values()
            .map(|message| PendingEntry {
                message_id: message.message_id.clone(),
                origin_id: message.origin_id,
                timestamp: message.timestamp,
                acked_by: self
                    .acks
                    .get(&message.message_id)
                    .map(|set| set.iter().copied().collect())
                    .unwrap_or_default(),
            })
            .collect();

        QueueSnapshot {
            pending: entries.len(),
            delivered: self.delivered.len(),
            early_acks: self.acks.len().saturating_sub(self.index.len()),
            entries,
        }
    }
}

/// Serializable queue view
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub delivered: usize,
    /// Ack sets held for messages not yet enqueued
    pub early_acks: usize,
    /// Pending messages, head first
    pub entries: Vec<PendingEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingEntry {
    pub message_id: String,
    pub origin_id: ProcessId,
    pub timestamp: u64,
    pub acked_by: Vec<ProcessId>,
}

/// Application-side delivery callback
pub trait DeliverySink: Send + Sync {
    /// Called once per message, in total order, under the node lock
    fn on_deliver(&self, message: &Message);
}

/// Bounded in-memory record of delivered messages
pub struct DeliveryLog {
    capacity: usize,
    inner: Mutex<LogInner>,
}

#[derive(Default)]
struct LogInner {
    next_sequence: u64,
    records: VecDeque<DeliveredRecord>,
}

impl DeliveryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(LogInner::default()),
        }
    }

    /// Retained records, oldest first
    pub fn records(&self) -> Vec<DeliveredRecord> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.records.iter().cloned().collect()
    }

    /// Total deliveries, including records evicted from the log
    pub fn total(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_sequence
    }
}

impl DeliverySink for DeliveryLog {
    fn on_deliver(&self, message: &Message) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        tracing::info!(
            sequence,
            message_id = %message.message_id,
            origin = %message.origin_id,
            timestamp = message.timestamp,
            payload = %message.payload,
            "[DELIVER] message delivered"
        );

        inner.records.push_back(DeliveredRecord::new(sequence, message.clone()));
        while inner.records.len() > self.capacity {
            inner.records.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(id: &str, origin: u32, timestamp: u64) -> Message {
        Message {
            message_id: id.to_string(),
            origin_id: ProcessId::new(origin),
            timestamp,
            payload: json!({ "id": id }),
            delivered: false,
        }
    }

    fn ack_all(queue: &mut DeliveryQueue, id: &str, group_size: u32) {
        for pid in ProcessId::all(group_size) {
            queue.add_ack(id, pid);
        }
    }

    fn drain(queue: &mut DeliveryQueue) -> Vec<String> {
        let mut out = Vec::new();
        queue.try_process_head(|m| {
            assert!(m.delivered);
            out.push(m.message_id.clone());
        });
        out
    }

    #[test]
    fn test_delivers_only_with_full_quorum() {
        let mut queue = DeliveryQueue::new(3);
        queue.enqueue(msg("a", 0, 1));
        queue.add_ack("a", ProcessId::new(0));
        queue.add_ack("a", ProcessId::new(1));
        assert_eq!(queue.try_process_head(|_| {}), 0);

        queue.add_ack("a", ProcessId::new(2));
        assert_eq!(drain(&mut queue), vec!["a"]);
        assert_eq!(queue.len(), 0);

        // Never delivered twice
        assert_eq!(queue.try_process_head(|_| panic!("redelivered")), 0);
    }

    #[test]
    fn test_orders_by_timestamp_origin_then_id() {
        let mut queue = DeliveryQueue::new(2);
        queue.enqueue(msg("z", 1, 5));
        queue.enqueue(msg("b", 0, 5));
        queue.enqueue(msg("a", 0, 5));
        queue.enqueue(msg("y", 1, 2));

        for id in ["z", "b", "a", "y"] {
            ack_all(&mut queue, id, 2);
        }

        assert_eq!(drain(&mut queue), vec!["y", "a", "b", "z"]);
    }

    #[test]
    fn test_head_blocks_later_acked_messages() {
        let mut queue = DeliveryQueue::new(3);
        queue.enqueue(msg("first", 0, 1));
        queue.enqueue(msg("second", 1, 2));
        ack_all(&mut queue, "second", 3);
        queue.add_ack("first", ProcessId::new(0));

        assert_eq!(queue.try_process_head(|_| {}), 0);
        assert_eq!(queue.len(), 2);

        // Completing the head cascades through both
        queue.add_ack("first", ProcessId::new(1));
        queue.add_ack("first", ProcessId::new(2));
        assert_eq!(drain(&mut queue), vec!["first", "second"]);
    }

    #[test]
    fn test_early_acks_survive_enqueue() {
        let mut queue = DeliveryQueue::new(2);
        assert_eq!(queue.add_ack("m", ProcessId::new(1)), AckOutcome::Recorded);
        assert_eq!(queue.ack_count("m"), 1);
        assert_eq!(queue.snapshot().early_acks, 1);

        assert!(queue.enqueue(msg("m", 1, 3)));
        assert_eq!(queue.ack_count("m"), 1);
        assert_eq!(queue.snapshot().early_acks, 0);

        queue.add_ack("m", ProcessId::new(0));
        assert_eq!(drain(&mut queue), vec!["m"]);
    }

    #[test]
    fn test_retained_state_stays_visible() {
        let mut queue = DeliveryQueue::new(1);
        queue.add_ack("orphan", ProcessId::new(0));

        for (i, id) in ["a", "b", "c"].into_iter().enumerate() {
            queue.enqueue(msg(id, 0, i as u64 + 1));
            queue.add_ack(id, ProcessId::new(0));
        }
        assert_eq!(drain(&mut queue), vec!["a", "b", "c"]);

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.pending, 0);
        assert_eq!(snapshot.delivered, 3);
        assert_eq!(snapshot.early_acks, 1);

        // Delivered ids still reject a late resend
        assert!(!queue.enqueue(msg("a", 0, 1)));
    }

    #[test]
    fn test_ack_is_idempotent() {
        let mut queue = DeliveryQueue::new(3);
        queue.enqueue(msg("m", 0, 1));
        assert_eq!(queue.add_ack("m", ProcessId::new(1)), AckOutcome::Recorded);
        assert_eq!(queue.add_ack("m", ProcessId::new(1)), AckOutcome::Duplicate);
        assert_eq!(queue.ack_count("m"), 1);
    }

    #[test]
    fn test_duplicate_enqueue_is_noop() {
        let mut queue = DeliveryQueue::new(1);
        assert!(queue.enqueue(msg("m", 0, 1)));
        assert!(!queue.enqueue(msg("m", 0, 1)));
        assert_eq!(queue.len(), 1);

        queue.add_ack("m", ProcessId::new(0));
        assert_eq!(queue.try_process_head(|_| {}), 1);

        // Re-delivery of a delivered message is rejected too
        assert!(!queue.enqueue(msg("m", 0, 1)));
        assert_eq!(
            queue.add_ack("m", ProcessId::new(0)),
            AckOutcome::AlreadyDelivered
        );
        assert_eq!(queue.delivered_count(), 1);
    }

    #[test]
    fn test_out_of_group_ack_ignored() {
        let mut queue = DeliveryQueue::new(2);
        queue.enqueue(msg("m", 0, 1));
        assert_eq!(queue.add_ack("m", ProcessId::new(7)), AckOutcome::UnknownSender);
        assert_eq!(queue.ack_count("m"), 0);
    }

    #[test]
    fn test_same_order_regardless_of_arrival() {
        let messages = [msg("c", 2, 4), msg("a", 0, 1), msg("b", 1, 1), msg("d", 0, 4)];

        let mut forward = DeliveryQueue::new(3);
        let mut backward = DeliveryQueue::new(3);
        for m in messages.iter() {
            forward.enqueue(m.clone());
        }
        for m in messages.iter().rev() {
            backward.enqueue(m.clone());
        }
        for m in &messages {
            ack_all(&mut forward, &m.message_id, 3);
        }
        for m in messages.iter().rev() {
            ack_all(&mut backward, &m.message_id, 3);
        }

        let expected = vec!["a", "b", "d", "c"];
        assert_eq!(drain(&mut forward), expected);
        assert_eq!(drain(&mut backward), expected);
    }

    #[test]
    fn test_delivery_log_is_bounded() {
        let log = DeliveryLog::new(2);
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            log.on_deliver(&msg(id, 0, i as u64));
        }

        let records = log.records();
        assert_eq!(log.total(), 3);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 1);
        assert_eq!(records[1].message.message_id, "c");
    }
}
