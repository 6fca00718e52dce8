//! Asynchronous object factory.
//!
//! [`AsyncFactory`] keeps a ring of pre-constructed objects so that
//! [`acquire`](AsyncFactory::acquire) usually returns in a handful of atomic
//! operations. A dedicated background thread refills the ring whenever
//! consumers signal demand; if the ring is drained faster than the producer
//! can refill it, `acquire` falls back to running the allocator inline on the
//! calling thread, so it is bounded but never fails.
//!
//! The allocator callback receives an [`AllocMode`] telling it whether it is
//! running on the background thread (`Async`) or inline on a stalled consumer
//! (`Sync`) — useful for instrumenting how often consumers outrun the
//! producer.
//!
//! # Example
//!
//! ```
//! use asyncfactory::{AllocMode, AsyncFactory};
//!
//! let factory = AsyncFactory::new(64, 1000, |_mode: AllocMode| {
//!     Box::new(Vec::<u8>::with_capacity(4096))
//! });
//!
//! let buf = factory.acquire(); // pre-built, no allocation on this thread
//! assert_eq!(buf.capacity(), 4096);
//! ```
//!
//! Dropping the factory (or calling [`close`](AsyncFactory::close)) stops and
//! joins the producer thread and drops any objects still cached in the ring.

mod config;
mod factory;
mod metrics;

pub use config::FactoryConfig;
pub use factory::{AllocMode, AsyncFactory};
pub use metrics::MetricsSnapshot;
