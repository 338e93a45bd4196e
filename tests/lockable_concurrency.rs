// ==============================================
// PAGE LOCKING CONCURRENCY TESTS (integration)
// ==============================================
//
// Many threads sharing one FurrBall: concurrent access to a lockable page,
// read-modify-write through lock_page, and data integrity while other
// threads force evictions and pool growth.

use std::sync::{Arc, Barrier};
use std::thread;

use furrballs::prelude::*;

const PAGE: u64 = 4096;

fn config() -> FurrConfig {
    FurrConfig::default()
        .with_page_size(PAGE as usize)
        .with_initial_page_count(4)
        .with_capacity_limit(8 * PAGE as usize)
}

fn ball(config: FurrConfig) -> FurrBall {
    FurrBall::with_parts(MemoryStore::new(), config, Arc::new(SystemAllocator::new())).unwrap()
}

#[test]
fn furrball_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<FurrBall>();
    assert_send_sync::<FurrBall<DirStore>>();
}

// ==============================================
// Shared Lockable Page
// ==============================================

#[test]
fn concurrent_access_to_one_lockable_page() {
    let cache = ball(config().with_lockable_pages(true));
    let root = cache.put(0, b"").unwrap();
    assert!(root.vptr().is_lock_hinted());

    let threads = 8;
    let barrier = Barrier::new(threads);
    thread::scope(|scope| {
        for t in 0..threads {
            let cache = &cache;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                let offset = t * 64;
                for round in 0..200u8 {
                    let ptr = cache.get(0).unwrap().with_offset(offset);
                    assert_eq!(ptr.vptr(), root.vptr());
                    cache.write(ptr, &[round; 64]).unwrap();

                    let mut buf = [0u8; 64];
                    assert_eq!(cache.read(ptr, &mut buf), Some(64));
                    assert_eq!(buf, [round; 64], "thread {t}");
                }
            });
        }
    });

    let mut buf = [0u8; 8 * 64];
    assert_eq!(cache.read(root, &mut buf), Some(buf.len()));
    assert!(buf.iter().all(|&b| b == 199));
    assert_eq!(cache.stats().hits, 8 * 200);
    cache.check_invariants().unwrap();
}

// ==============================================
// lock_page Read-Modify-Write
// ==============================================

fn locked_increments(config: FurrConfig) -> u64 {
    let cache = ball(config);
    cache.put(0, &0u64.to_le_bytes()).unwrap();

    thread::scope(|scope| {
        for _ in 0..4 {
            let cache = &cache;
            scope.spawn(move || {
                for _ in 0..250 {
                    let mut guard = cache.lock_page(0).unwrap();
                    let mut bytes = [0u8; 8];
                    guard.read(0, &mut bytes);
                    let next = u64::from_le_bytes(bytes) + 1;
                    guard.write(0, &next.to_le_bytes());
                }
            });
        }
    });

    let mut bytes = [0u8; 8];
    cache.read(cache.get(0).unwrap(), &mut bytes).unwrap();
    u64::from_le_bytes(bytes)
}

#[test]
fn lock_page_serializes_plain_pages() {
    assert_eq!(locked_increments(config()), 1000);
}

#[test]
fn lock_page_serializes_lockable_pages() {
    assert_eq!(locked_increments(config().with_lockable_pages(true)), 1000);
}

// ==============================================
// Integrity Under Eviction
// ==============================================

#[test]
fn concurrent_writers_keep_their_pages_under_eviction() {
    for lockable in [false, true] {
        let cache = ball(config().with_lockable_pages(lockable).with_resize_threshold(2));
        let threads = 4u64;
        let pages_per_thread = 6u64;

        thread::scope(|scope| {
            for t in 0..threads {
                let cache = &cache;
                scope.spawn(move || {
                    for round in 0..5u8 {
                        for p in 0..pages_per_thread {
                            let address = (t * pages_per_thread + p) * PAGE;
                            let pattern = [t as u8, p as u8, round, 0xAB];
                            cache.put(address, &pattern).unwrap();

                            // Only this thread writes the page, so whatever
                            // happened to its frame the bytes must match.
                            let guard = cache.lock_page(address).unwrap();
                            let mut buf = [0u8; 4];
                            assert_eq!(guard.read(0, &mut buf), 4);
                            assert_eq!(buf, pattern, "lockable={lockable}");
                        }
                    }
                });
            }
        });

        cache.check_invariants().unwrap();
        assert!(cache.page_count() <= 8);
        assert!(cache.stats().evictions > 0);
        assert_eq!(cache.known_pages(), (threads * pages_per_thread) as usize);

        for t in 0..threads {
            for p in 0..pages_per_thread {
                let address = (t * pages_per_thread + p) * PAGE;
                let mut buf = [0u8; 4];
                cache.read(cache.get(address).unwrap(), &mut buf).unwrap();
                assert_eq!(buf, [t as u8, p as u8, 4, 0xAB]);
            }
        }
    }
}

// ==============================================
// Flush Racing Eviction
// ==============================================

#[test]
fn flush_never_overwrites_a_newer_evicted_copy() {
    for burst in [false, true] {
        let cache = ball(
            config()
                .with_capacity_limit(4 * PAGE as usize)
                .with_policy(PolicyKind::Lru)
                .with_burst_mode(burst),
        );
        let rounds = 500u64;

        thread::scope(|scope| {
            let cache = &cache;
            scope.spawn(move || {
                for version in 1..=rounds {
                    cache.put(0, &version.to_le_bytes()).unwrap();
                }
            });
            scope.spawn(move || {
                for round in 0..rounds {
                    cache.put((1 + round % 8) * PAGE, b"churn").unwrap();
                }
            });
            scope.spawn(move || {
                for _ in 0..rounds / 5 {
                    assert!(cache.flush());
                }
            });
        });

        // Push page 0 out so the store copy is the only one left.
        for i in 9..13u64 {
            cache.put(i * PAGE, b"late").unwrap();
        }
        assert!(!cache.resident_pages().contains(&0), "burst={burst}");
        assert!(cache.flush());
        let stored = cache.store().get(0).unwrap().unwrap();
        let mut version = [0u8; 8];
        version.copy_from_slice(&stored[..8]);
        assert_eq!(u64::from_le_bytes(version), rounds, "burst={burst}");
    }
}
