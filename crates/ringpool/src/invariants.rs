//! Always-on invariant checks for the pool's lock-free protocol.
//!
//! A violated check here means a lost update or memory corruption, not a
//! recoverable condition, so these assert in release builds too. The cost is
//! a predicted-taken branch on counters that are already in registers.

/// The consume ticket counter can never pass the produce counter.
///
/// Only valid when `consume` was loaded *before* `produce`: both counters are
/// monotonic, so that load order can overstate `produce` but never show it
/// behind `consume`.
macro_rules! assert_ticket_order {
    ($consume:expr, $produce:expr) => {
        assert!(
            $consume <= $produce,
            "ring pool counters out of order: consume {} > produce {}",
            $consume,
            $produce
        )
    };
}

/// A state transition on a slot we hold locked must never be contested.
macro_rules! assert_exclusive_transition {
    ($cas_ok:expr) => {
        assert!(
            $cas_ok,
            "ring pool slot state changed while exclusively locked"
        )
    };
}

pub(crate) use assert_exclusive_transition;
pub(crate) use assert_ticket_order;
