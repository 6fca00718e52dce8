//! The deployment the pool exists for: maps owned by one task at a time,
//! cleared and returned to the pool instead of dropped, re-acquired by other
//! tasks with no content bleeding across reuse cycles.

use compactmap::IntKeyMap;
use ringpool::FixedSizeRingPool;
use std::sync::Arc;
use std::thread;

const MAP_DATA_SIZE: usize = 8;
const MAP_CAPACITY: usize = 256;

#[test]
fn maps_recycle_through_the_pool_without_leaking_entries() {
    const THREADS: u64 = 8;
    const ROUNDS: u64 = 500;

    let pool = Arc::new(FixedSizeRingPool::<IntKeyMap>::new(16));

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for round in 0..ROUNDS {
                let mut map = pool
                    .get()
                    .unwrap_or_else(|| IntKeyMap::new(MAP_DATA_SIZE, MAP_CAPACITY));

                // A recycled map must arrive logically empty.
                assert!(
                    map.is_empty(),
                    "pooled map leaked {} entries into the next user",
                    map.len()
                );

                let tag = t * 1_000_000 + round;
                for k in 0..50u32 {
                    map.put(k, &(tag + u64::from(k)));
                }

                let mut out = 0u64;
                for k in 0..50u32 {
                    assert!(map.get(k, &mut out));
                    assert_eq!(out, tag + u64::from(k), "entry clobbered while owned");
                }

                map.clear();
                let _ = pool.put(map);
            }
        }));
    }

    for h in handles {
        h.join().expect("worker panicked");
    }
}

#[test]
fn unreturned_map_does_not_poison_the_pool() {
    let pool = FixedSizeRingPool::<IntKeyMap>::new(4);

    let mut map = IntKeyMap::new(MAP_DATA_SIZE, MAP_CAPACITY);
    map.put(7, &700u64);
    map.clear();
    assert!(pool.put(map).is_ok());

    // The next user sees a blank map even though the slab still holds the
    // old bytes.
    let got = pool.get().expect("map lost");
    assert!(got.is_empty());
    assert!(!got.contains(7));
}
