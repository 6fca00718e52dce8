use crate::config::FactoryConfig;
use crate::metrics::{FactoryMetrics, MetricsSnapshot};
use crossbeam_utils::CachePadded;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

// =============================================================================
// OWNERSHIP & ORDERING PROTOCOL
// =============================================================================
//
// The ring is a fixed array of `AtomicPtr<T>` slots with two monotonic u64
// counters. Slots `[head, tail)` hold ready objects owned by consumers-to-be;
// slots `[tail, head + size)` are owned by the producer and may be
// overwritten.
//
// ## Producer (refill path)
//
// 1. Build the object, `Box::into_raw` it.
// 2. Store the pointer into `buffer[tail % size]` with Release.
// 3. `fetch_add` tail (publishes the slot: the Release store of step 2 is
//    ordered before the counter bump).
// 4. Re-read head; keep going while `tail - head < size`.
//
// ## Consumer (acquire path)
//
// 1. Load head, then tail (Acquire: synchronizes with the producer's
//    publication).
// 2. If `head < tail`, load the slot pointer FIRST, then CAS
//    `head -> head + 1`. Only the CAS winner materializes the Box.
//
// Loading the pointer before the claim is what makes the protocol sound:
// the producer may overwrite slot `head % size` only after some consumer
// already won ticket `head - size` — and that winner loaded the previous
// pointer before its successful CAS. So a pointer observed by a *winning*
// consumer is never stale and never seen by any other winner; a pointer
// loaded by a losing consumer is discarded without being dereferenced.
//
// The stale copy left in the slot after a take is harmless for the same
// reason: the slot cannot be read again until the producer overwrites it.
//
// =============================================================================

/// Where an allocator invocation is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocMode {
    /// On the background producer thread (including the initial ring fill).
    Async,
    /// Inline on a consumer thread that exhausted its spin budget.
    Sync,
}

impl AllocMode {
    #[inline]
    pub fn is_sync(self) -> bool {
        matches!(self, AllocMode::Sync)
    }
}

type Allocator<T> = Box<dyn Fn(AllocMode) -> Box<T> + Send + Sync>;

struct Shared<T> {
    config: FactoryConfig,
    size: u64,
    buffer: Box<[AtomicPtr<T>]>,
    allocator: Allocator<T>,
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    refill_lock: Mutex<()>,
    refill_signal: Condvar,
    shutdown: AtomicBool,
    metrics: FactoryMetrics,
}

/// Ring-buffered cache of pre-constructed objects.
///
/// Construction fills the ring synchronously, then hands refilling to a
/// dedicated producer thread. [`acquire`](Self::acquire) never blocks: it
/// spins up to the configured budget and then allocates inline.
///
/// `spin_count` and the yield cadence are tuning knobs, not correctness
/// requirements; `spin_count = 0` turns the factory into a plain allocator
/// call per acquire.
pub struct AsyncFactory<T> {
    shared: Arc<Shared<T>>,
    producer: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> AsyncFactory<T> {
    /// Creates a factory with `buffer_size` cached objects and the default
    /// yield cadence. See [`with_config`](Self::with_config) for the full set
    /// of knobs.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` is zero or the producer thread cannot be
    /// spawned.
    pub fn new<A>(buffer_size: usize, spin_count: usize, allocator: A) -> Self
    where
        A: Fn(AllocMode) -> Box<T> + Send + Sync + 'static,
    {
        Self::with_config(
            FactoryConfig {
                buffer_size,
                spin_count,
                ..FactoryConfig::default()
            },
            allocator,
        )
    }

    /// Creates a factory from an explicit configuration.
    ///
    /// The allocator runs `buffer_size` times right here (in `Async` mode —
    /// initialization is not a consumer stall), then on the producer thread
    /// on every refill, and inline in `Sync` mode when an `acquire` drains
    /// the ring. It must be infallible.
    ///
    /// # Panics
    ///
    /// Panics if `config.buffer_size` or `config.yield_every` is zero, or the
    /// producer thread cannot be spawned.
    pub fn with_config<A>(config: FactoryConfig, allocator: A) -> Self
    where
        A: Fn(AllocMode) -> Box<T> + Send + Sync + 'static,
    {
        assert!(config.buffer_size > 0, "buffer_size must be at least 1");
        assert!(config.yield_every > 0, "yield_every must be at least 1");

        let allocator: Allocator<T> = Box::new(allocator);

        let buffer: Box<[AtomicPtr<T>]> = (0..config.buffer_size)
            .map(|_| AtomicPtr::new(Box::into_raw(allocator(AllocMode::Async))))
            .collect();

        let shared = Arc::new(Shared {
            config,
            size: config.buffer_size as u64,
            buffer,
            allocator,
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(config.buffer_size as u64)),
            refill_lock: Mutex::new(()),
            refill_signal: Condvar::new(),
            shutdown: AtomicBool::new(false),
            metrics: FactoryMetrics::default(),
        });

        let worker = Arc::clone(&shared);
        let producer = thread::Builder::new()
            .name("asyncfactory-refill".into())
            .spawn(move || {
                while worker.wait_for_demand() {
                    worker.refill();
                }
            })
            .expect("failed to spawn the factory producer thread");

        Self {
            shared,
            producer: Some(producer),
        }
    }

    /// Returns a ready object.
    ///
    /// Spins up to `spin_count` iterations against the ring, signaling the
    /// producer on the first stall and yielding on the configured cadence
    /// after that. When the budget runs out, the allocator runs inline in
    /// [`AllocMode::Sync`] — so the call is bounded and infallible either
    /// way.
    pub fn acquire(&self) -> Box<T> {
        let shared = &*self.shared;

        let mut c = 0usize;
        while c < shared.config.spin_count {
            let h = shared.head.load(Ordering::Acquire);
            let t = shared.tail.load(Ordering::Acquire);

            if h < t {
                let idx = (h % shared.size) as usize;
                // Pre-load before the claim; see the protocol header.
                let p = shared.buffer[idx].load(Ordering::Acquire);

                if shared
                    .head
                    .compare_exchange(h, h + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    debug_assert!(!p.is_null(), "published slot held a null pointer");
                    // SAFETY: this thread won ticket `h`, so `p` is the
                    // pointer the producer published for this slot and no
                    // other consumer can win the same ticket. The producer
                    // will not overwrite the slot until head has advanced
                    // past it, which only this winner just did.
                    return unsafe { Box::from_raw(p) };
                }
            }

            if c == 0 {
                // Wake the producer on the first stall so the refill overlaps
                // our spinning; afterwards just yield periodically to avoid a
                // signal storm.
                shared.force();
                thread::yield_now();
            } else if c % shared.config.yield_every == 0 {
                thread::yield_now();
            }
            c += 1;
        }

        shared.metrics.sync_fallbacks.fetch_add(1, Ordering::Relaxed);
        (shared.allocator)(AllocMode::Sync)
    }

    /// Stops the producer thread and drops every object still cached in the
    /// ring. Idempotent; [`acquire`](Self::acquire) keeps working afterwards
    /// by falling through to the inline allocator.
    pub fn close(&mut self) {
        self.shutdown_and_drain();
    }

    /// Point-in-time counter snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Number of ring slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.config.buffer_size
    }
}

impl<T> Shared<T> {
    /// Wakes the producer. Fire-and-forget: a signal sent while the producer
    /// is already refilling is redundant, and consumers re-signal on their
    /// next stall.
    #[inline]
    fn force(&self) {
        self.refill_signal.notify_one();
    }

    /// Parks until signaled. Returns `false` when the factory is shutting
    /// down.
    fn wait_for_demand(&self) -> bool {
        let guard = self
            .refill_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }

        let _guard = self
            .refill_signal
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner);

        !self.shutdown.load(Ordering::Acquire)
    }

    /// Fills every producer-owned slot, re-reading head after each store so a
    /// burst of consumers extends the pass instead of scheduling another
    /// wake-up.
    fn refill(&self) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }

            let mut t = self.tail.load(Ordering::Acquire);
            let mut h = self.head.load(Ordering::Acquire);

            if t - h == self.size {
                self.metrics.full_wakeups.fetch_add(1, Ordering::Relaxed);
                return;
            }

            while t - h < self.size {
                if self.shutdown.load(Ordering::Acquire) {
                    return;
                }

                let obj = (self.allocator)(AllocMode::Async);
                let idx = (t % self.size) as usize;
                // The previous pointer in this slot was already handed to the
                // consumer that advanced head past it; plain overwrite.
                self.buffer[idx].store(Box::into_raw(obj), Ordering::Release);

                t = self.tail.fetch_add(1, Ordering::AcqRel) + 1;
                h = self.head.load(Ordering::Acquire);
            }

            self.metrics.refill_batches.fetch_add(1, Ordering::Relaxed);
            thread::yield_now();
        }
    }

    /// Drops every object in `[head, tail)` and marks the ring empty. Runs
    /// only after the producer has been joined, so no slot is concurrently
    /// written.
    fn drain(&self) {
        let mut h = self.head.load(Ordering::Acquire);
        let t = self.tail.load(Ordering::Acquire);

        while h < t {
            let idx = (h % self.size) as usize;
            let p = self.buffer[idx].swap(ptr::null_mut(), Ordering::AcqRel);
            if !p.is_null() {
                // SAFETY: `[head, tail)` slots are owned by the ring; the
                // producer is joined and consumers advance head only through
                // `acquire`, which cannot run concurrently with the `&mut
                // self` close path of the owning factory.
                drop(unsafe { Box::from_raw(p) });
            }
            h += 1;
        }

        self.head.store(t, Ordering::Release);
    }
}

impl<T> AsyncFactory<T> {
    fn shutdown_and_drain(&mut self) {
        let Some(handle) = self.producer.take() else {
            return;
        };

        {
            // Taking the lock orders the flag against a producer that is
            // between its shutdown check and its wait.
            let _guard = self
                .shared
                .refill_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.shared.shutdown.store(true, Ordering::Release);
        }
        self.shared.refill_signal.notify_all();

        let _ = handle.join();
        self.shared.drain();
    }
}

impl<T> Drop for AsyncFactory<T> {
    fn drop(&mut self) {
        self.shutdown_and_drain();
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // Owner-of-last-resort for in-ring objects; a no-op after the
        // factory's close/drop path has drained.
        let h = *self.head.get_mut();
        let t = *self.tail.get_mut();

        for seq in h..t {
            let idx = (seq % self.size) as usize;
            let p = *self.buffer[idx].get_mut();
            if !p.is_null() {
                // SAFETY: exclusive access (`&mut self`); `[head, tail)`
                // pointers are owned by the ring.
                drop(unsafe { Box::from_raw(p) });
            }
        }
    }
}
