//! Ring pool against a mutexed stack, the baseline the lock-free design
//! replaces.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ringpool::FixedSizeRingPool;
use std::sync::Mutex;

struct MutexPool<T> {
    buffer: Mutex<Vec<T>>,
    cap: usize,
}

impl<T> MutexPool<T> {
    fn new(cap: usize) -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(cap)),
            cap,
        }
    }

    fn put(&self, v: T) -> Result<(), T> {
        let mut buf = self.buffer.lock().unwrap();
        if buf.len() < self.cap {
            buf.push(v);
            Ok(())
        } else {
            Err(v)
        }
    }

    fn get(&self) -> Option<T> {
        self.buffer.lock().unwrap().pop()
    }
}

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_get_round_trip");

    group.bench_function("ring_pool", |b| {
        let pool = FixedSizeRingPool::new(1024);
        b.iter(|| {
            let _ = pool.put(black_box(42u64));
            black_box(pool.get())
        });
    });

    group.bench_function("mutex_stack", |b| {
        let pool = MutexPool::new(1024);
        b.iter(|| {
            let _ = pool.put(black_box(42u64));
            black_box(pool.get())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_round_trip);
criterion_main!(benches);
