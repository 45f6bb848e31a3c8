//! Thread-safety and invariant tests for the sharded cache.
//!
//! These run many threads against a shared `Cache` and check the
//! invariants that must hold regardless of scheduling: size stays within
//! budget, no entry's destruction hook fires more than once, and every
//! entry created is eventually destroyed exactly once once the cache (and
//! every outstanding guard) is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use shardlru::{Cache, CacheConfig, CacheValue, InsertOptions};

const NUM_THREADS: usize = 16;
const OPS_PER_THREAD: usize = 2_000;

struct Plain;
impl CacheValue for Plain {}

#[test]
fn concurrent_put_get_keeps_size_within_budget() {
    let config = CacheConfig {
        max_size: 1_000,
        segment_count: 16,
        ..Default::default()
    };
    let cache = Arc::new(Cache::<Plain>::init(config).unwrap());

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    let key = format!("k-{}-{}", t, i % 200);
                    cache.put(&key, Plain, InsertOptions::default());
                    let _ = cache.get(&key);
                    if i % 13 == 0 {
                        cache.delete(&key);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked");
    }

    assert!(cache.len() as u64 <= cache.max_size_effective());
}

#[test]
fn concurrent_writers_never_double_fire_removal_hook() {
    struct Counted(Arc<AtomicUsize>);
    impl CacheValue for Counted {
        fn on_removed(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let config = CacheConfig {
        max_size: 200,
        segment_count: 8,
        ..Default::default()
    };
    let cache = Arc::new(Cache::<Counted>::init(config).unwrap());
    let drops = Arc::new(AtomicUsize::new(0));
    let created = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let drops = Arc::clone(&drops);
            let created = Arc::clone(&created);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD {
                    let key = format!("k-{}-{}", t, i % 50);
                    cache.put(&key, Counted(Arc::clone(&drops)), InsertOptions::default());
                    created.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked");
    }

    let created = created.load(Ordering::SeqCst);
    drop(cache);

    // Every `put` either got displaced/evicted during the run or survived
    // to teardown; either way its hook fires exactly once.
    assert_eq!(drops.load(Ordering::SeqCst), created);
}

#[test]
fn concurrent_fetch_never_returns_torn_reads() {
    #[derive(Clone)]
    struct Payload(u64);
    impl CacheValue for Payload {}

    let config = CacheConfig {
        max_size: 500,
        segment_count: 8,
        ..Default::default()
    };
    let cache = Arc::new(Cache::<Payload>::init(config).unwrap());

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD / 10 {
                    let key = format!("shared-{}", i % 20);
                    let marker = (t as u64) * 1_000_000 + i as u64;
                    let guard = cache
                        .fetch(&key, InsertOptions::default(), |_| {
                            Ok::<_, std::convert::Infallible>(Some(Payload(marker)))
                        })
                        .unwrap();
                    // whatever value is returned must be internally
                    // consistent (not a torn/partial write) — a single
                    // u64 field can't actually tear, but this exercises
                    // that the guard dereferences to a fully-formed value
                    // under concurrent replacement.
                    if let Some(g) = guard {
                        let _ = g.0;
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked");
    }
}

#[test]
fn delete_prefix_under_concurrent_inserts_removes_all_pre_existing_matches() {
    let config = CacheConfig {
        max_size: 2_000,
        segment_count: 8,
        ..Default::default()
    };
    let cache = Arc::new(Cache::<Plain>::init(config).unwrap());

    for i in 0..100 {
        cache.put(&format!("stale:{i}"), Plain, InsertOptions::default());
    }

    let writer = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for i in 0..500 {
                cache.put(&format!("fresh:{i}"), Plain, InsertOptions::default());
            }
        })
    };

    let removed = cache.delete_prefix("stale:");
    writer.join().expect("writer thread panicked");

    assert_eq!(removed, 100);
    for i in 0..100 {
        assert!(!cache.contains(&format!("stale:{i}")));
    }
}
