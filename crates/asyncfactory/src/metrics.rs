use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe factory counters.
#[derive(Debug, Default)]
pub(crate) struct FactoryMetrics {
    /// Refill passes that filled at least one slot.
    pub(crate) refill_batches: AtomicU64,
    /// Refill passes that ended at a full ring (including wake-ups that
    /// found it already full).
    pub(crate) full_wakeups: AtomicU64,
    /// Acquires that exhausted their spin budget and allocated inline.
    pub(crate) sync_fallbacks: AtomicU64,
}

impl FactoryMetrics {
    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            refill_batches: self.refill_batches.load(Ordering::Relaxed),
            full_wakeups: self.full_wakeups.load(Ordering::Relaxed),
            sync_fallbacks: self.sync_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the factory counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub refill_batches: u64,
    pub full_wakeups: u64,
    pub sync_fallbacks: u64,
}
