//! Bounded lock-free object pool.
//!
//! [`FixedSizeRingPool`] recycles objects of a single type across many
//! producer and consumer threads without blocking: `put` and `get` either
//! succeed or fail within a bounded number of steps, never waiting on a lock
//! or a condition. The intended use is allocation avoidance — call
//! [`get`](FixedSizeRingPool::get) before constructing a fresh object, and
//! [`put`](FixedSizeRingPool::put) a used object back instead of dropping it.
//!
//! # Example
//!
//! ```
//! use ringpool::FixedSizeRingPool;
//!
//! let pool = FixedSizeRingPool::new(64);
//!
//! let buf: Vec<u8> = pool.get().unwrap_or_else(|| Vec::with_capacity(4096));
//! // ... use buf ...
//! if let Err(_rejected) = pool.put(buf) {
//!     // Pool full: drop the object, the next user allocates fresh.
//! }
//! ```
//!
//! A failed `put` is back-pressure, not an error: the rejected value comes
//! back to the caller, which decides whether to drop it or keep it.

mod invariants;
mod pool;

pub use pool::FixedSizeRingPool;
