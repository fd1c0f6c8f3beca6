//! Lamport logical clock.

/// The node's Lamport clock.
///
/// Both ticks are plain `&mut self` methods; the caller holds the node lock,
/// so a returned value stays valid until the lock is released.
#[derive(Debug, Clone)]
pub struct ClockService {
    value: u64,
}

impl ClockService {
    pub fn new(initial: u64) -> Self {
        Self { value: initial }
    }

    pub fn current(&self) -> u64 {
        self.value
    }

    /// Local send event: increment and return the new value
    pub fn tick_send(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    /// Receive event: `max(clock, ts) + 1`
    pub fn tick_receive(&mut self, ts: u64) -> u64 {
        self.value = self.value.max(ts) + 1;
        self.value
    }
}

impl Default for ClockService {
    fn default() -> Self {
        Self::new(0)
    }
}
