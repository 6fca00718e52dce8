use crate::invariants::{assert_exclusive_transition, assert_ticket_order};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

// =============================================================================
// SYNCHRONIZATION STRATEGY
// =============================================================================
//
// Two layers of synchronization cooperate:
//
// ## Ticket counters (load spreading)
//
// `produce` and `consume` are strictly monotonic u64 counters. An operation
// CASes its counter forward to claim a ticket; the slot index is
// `ticket % size`. The counters only spread operations across slots — they do
// NOT confer slot ownership, because a ticket can land on a slot whose
// previous occupant is still being worked on by a straggler.
//
// ## Per-slot state word (ownership)
//
// Each slot carries a 64-bit atomic:
//
//   bits 0..=31  version, bumped on every transition (ABA guard)
//   bit  32      locked: a writer owns the slot right now
//   bit  33      has-data: the slot holds a live value
//
// An operation that finds its slot in the wrong state (locked, or has-data
// mismatched for the operation's direction) abandons the ticket and retries
// with a fresh one. An operation that CASes the locked bit in owns the slot
// exclusively until it CASes the lock back out; the payload is touched only
// between those two CASes. The second CAS cannot fail — if it does, another
// thread wrote a slot we held locked, and the process aborts.
//
// ## Bounded retry
//
// Neither operation loops unboundedly. `put` gives up after `size` failed
// attempts; `get` gives up after `available`-at-entry attempts (32 when that
// was zero). `available` is maintained on successful handoffs only and is
// advisory: it bounds latency, it never gates correctness.
//
// =============================================================================

const VERSION_MASK: u64 = 0xFFFF_FFFF;
const LOCKED: u64 = 1 << 32;
const HAS_DATA: u64 = 1 << 33;

/// Retry budget for `get` when the advisory available count reads zero.
const EMPTY_RETRY_BUDGET: u64 = 32;

/// Bumps the 32-bit version field, preserving the flag bits.
#[inline]
fn bump_version(state: u64) -> u64 {
    (state & !VERSION_MASK) | ((state & VERSION_MASK).wrapping_add(1) & VERSION_MASK)
}

struct Slot<T> {
    state: AtomicU64,
    value: UnsafeCell<Option<T>>,
}

/// Bounded lock-free MPMC object pool.
///
/// A fixed ring of slots recycles objects of one type across any number of
/// producer and consumer threads. Operations never block and never retry
/// indefinitely; see the crate docs for the back-pressure contract.
pub struct FixedSizeRingPool<T> {
    size: u64,
    buffer: Box<[Slot<T>]>,
    produce: CachePadded<AtomicU64>,
    consume: CachePadded<AtomicU64>,
    /// Advisory item count; adjusted on successful handoff only.
    available: CachePadded<AtomicI64>,
}

// SAFETY: slots are plain data guarded by their state word; a value moves in
// or out only while the moving thread holds the locked bit, so a T is never
// accessed from two threads at once. T: Send is all that transfer requires.
unsafe impl<T: Send> Send for FixedSizeRingPool<T> {}
unsafe impl<T: Send> Sync for FixedSizeRingPool<T> {}

impl<T> FixedSizeRingPool<T> {
    /// Creates a pool with exactly `size` slots.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "pool size must be at least 1");

        let buffer = (0..size)
            .map(|_| Slot {
                state: AtomicU64::new(0),
                value: UnsafeCell::new(None),
            })
            .collect();

        Self {
            size: size as u64,
            buffer,
            produce: CachePadded::new(AtomicU64::new(0)),
            consume: CachePadded::new(AtomicU64::new(0)),
            available: CachePadded::new(AtomicI64::new(0)),
        }
    }

    /// Number of slots in the ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size as usize
    }

    /// Advisory count of pooled items. May be stale the moment it returns.
    #[inline]
    pub fn len(&self) -> usize {
        self.available.load(Ordering::Acquire).max(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offers `v` to the pool.
    ///
    /// Returns `Err(v)` — handing the value back — when the ring is observed
    /// full or after `size` contended attempts. That is back-pressure, not an
    /// error: the caller decides whether to drop, hold, or retry.
    pub fn put(&self, v: T) -> Result<(), T> {
        let mut attempts = self.size;

        while attempts > 0 {
            attempts -= 1;

            // `consume` is loaded before `produce`: both only grow, so the
            // pair can overstate occupancy (a consume between the two loads
            // inflates `p - c` past `size`) but never understate it, and
            // never shows `c > p`.
            let c = self.consume.load(Ordering::Acquire);
            let p = self.produce.load(Ordering::Acquire);
            assert_ticket_order!(c, p);

            if p - c >= self.size {
                // Full is a definitive state, not contention.
                return Err(v);
            }

            if self
                .produce
                .compare_exchange(p, p + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            let slot = &self.buffer[(p % self.size) as usize];
            let prev = slot.state.load(Ordering::Acquire);
            if prev & (LOCKED | HAS_DATA) != 0 {
                // Slot busy or still holding an unconsumed value: abandon the
                // ticket and draw a new one.
                continue;
            }

            let locked = bump_version(prev) | LOCKED;
            if slot
                .state
                .compare_exchange(prev, locked, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            // SAFETY: the locking CAS above succeeded, so this thread holds
            // the slot's locked bit; no other thread touches the payload
            // until the unlocking CAS below.
            unsafe {
                *slot.value.get() = Some(v);
            }

            let done = (bump_version(locked) | HAS_DATA) & !LOCKED;
            let unlock = slot
                .state
                .compare_exchange(locked, done, Ordering::AcqRel, Ordering::Acquire);
            assert_exclusive_transition!(unlock.is_ok());

            self.available.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }

        Err(v)
    }

    /// Removes and returns one pooled item, or `None` when the pool is
    /// observed empty or the bounded retry budget runs out.
    pub fn get(&self) -> Option<T> {
        let avail = self.available.load(Ordering::Acquire);
        let mut attempts = if avail > 0 {
            avail as u64
        } else {
            EMPTY_RETRY_BUDGET
        };

        while attempts > 0 {
            attempts -= 1;

            let c = self.consume.load(Ordering::Acquire);
            let p = self.produce.load(Ordering::Acquire);
            assert_ticket_order!(c, p);

            if c == p {
                // Empty is a definitive state, not contention.
                return None;
            }

            if self
                .consume
                .compare_exchange(c, c + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            let slot = &self.buffer[(c % self.size) as usize];
            let prev = slot.state.load(Ordering::Acquire);
            if prev & LOCKED != 0 || prev & HAS_DATA == 0 {
                continue;
            }

            let locked = bump_version(prev) | LOCKED;
            if slot
                .state
                .compare_exchange(prev, locked, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            // SAFETY: locked bit held, see `put`.
            let item = unsafe { (*slot.value.get()).take() };
            assert!(
                item.is_some(),
                "ring pool slot flagged has-data held no value"
            );

            let done = bump_version(locked) & !(LOCKED | HAS_DATA);
            let unlock = slot
                .state
                .compare_exchange(locked, done, Ordering::AcqRel, Ordering::Acquire);
            assert_exclusive_transition!(unlock.is_ok());

            self.available.fetch_sub(1, Ordering::AcqRel);
            return item;
        }

        None
    }

    /// Human-readable counter snapshot for diagnostics.
    pub fn state(&self) -> String {
        let c = self.consume.load(Ordering::Acquire);
        let p = self.produce.load(Ordering::Acquire);
        let a = self.available.load(Ordering::Acquire);
        format!(
            "FixedSizeRingPool {{ consume: {c}, produce: {p}, idx_consume: {}, idx_produce: {}, available: {a} }}",
            c % self.size,
            p % self.size,
        )
    }
}

impl<T> std::fmt::Debug for FixedSizeRingPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedSizeRingPool")
            .field("size", &self.size)
            .field("produce", &self.produce.load(Ordering::Relaxed))
            .field("consume", &self.consume.load(Ordering::Relaxed))
            .field("available", &self.available.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_bump_preserves_flags() {
        assert_eq!(bump_version(0), 1);
        assert_eq!(bump_version(LOCKED | 5), LOCKED | 6);
        assert_eq!(bump_version(HAS_DATA | VERSION_MASK), HAS_DATA);
    }

    #[test]
    fn put_get_round_trip() {
        let pool = FixedSizeRingPool::new(4);
        assert!(pool.put(10u64).is_ok());
        assert!(pool.put(20u64).is_ok());
        assert_eq!(pool.len(), 2);

        assert_eq!(pool.get(), Some(10));
        assert_eq!(pool.get(), Some(20));
        assert_eq!(pool.get(), None);
        assert!(pool.is_empty());
    }

    #[test]
    fn full_pool_hands_the_value_back() {
        let pool = FixedSizeRingPool::new(2);
        assert!(pool.put(1u32).is_ok());
        assert!(pool.put(2u32).is_ok());
        assert_eq!(pool.put(3u32), Err(3));
    }

    #[test]
    fn ring_wraps_through_many_laps() {
        // A tiny ring pushed through thousands of laps exercises index
        // wrapping and slot version increments well past one cycle.
        let pool = FixedSizeRingPool::new(2);
        for i in 0..100_000u64 {
            assert!(pool.put(i).is_ok(), "put failed at lap {i}");
            assert_eq!(pool.get(), Some(i));
        }
        assert_eq!(pool.get(), None);
    }

    #[test]
    fn state_reports_counters() {
        let pool = FixedSizeRingPool::new(8);
        pool.put(1u8).unwrap();
        let s = pool.state();
        assert!(s.contains("produce: 1"), "unexpected state: {s}");
        assert!(s.contains("consume: 0"), "unexpected state: {s}");
        assert!(s.contains("available: 1"), "unexpected state: {s}");
    }

    #[test]
    fn drop_releases_pooled_values() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        {
            let pool = FixedSizeRingPool::new(4);
            for _ in 0..3 {
                assert!(pool.put(Tracked(Arc::clone(&drops))).is_ok());
            }
            assert_eq!(drops.load(Ordering::SeqCst), 0);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }
}
