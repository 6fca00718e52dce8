//! Factory acquire against plain boxing of the same payload. The factory
//! wins when construction is expensive and the producer keeps up.

use asyncfactory::AsyncFactory;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Payload heavy enough that pre-construction matters.
struct Payload {
    _table: Vec<u64>,
}

impl Payload {
    fn build() -> Box<Self> {
        Box::new(Self {
            _table: vec![0u64; 2048],
        })
    }
}

fn bench_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_acquisition");

    group.bench_function("async_factory", |b| {
        let factory = AsyncFactory::new(1024, 1000, |_| Payload::build());
        b.iter(|| black_box(factory.acquire()));
    });

    group.bench_function("boxed_inline", |b| {
        b.iter(|| black_box(Payload::build()));
    });

    group.finish();
}

criterion_group!(benches, bench_acquire);
criterion_main!(benches);
