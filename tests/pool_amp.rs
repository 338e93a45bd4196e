// ==============================================
// ADAPTIVE POOL GROWTH TESTS (integration)
// ==============================================
//
// Hot evictions grow the page pool through the cache facade, growth stops
// at the capacity limit, and defragmentation moves frames without
// disturbing outstanding handles.

use std::sync::Arc;

use furrballs::prelude::*;

const PAGE: u64 = 4096;

fn growing_config() -> FurrConfig {
    FurrConfig::default()
        .with_page_size(PAGE as usize)
        .with_initial_page_count(2)
        .with_capacity_limit(16 * PAGE as usize)
        .with_resize_threshold(2)
        .with_policy(PolicyKind::Lru)
}

fn ball(config: FurrConfig) -> FurrBall {
    FurrBall::with_parts(MemoryStore::new(), config, Arc::new(SystemAllocator::new())).unwrap()
}

// ==============================================
// Growth
// ==============================================

#[test]
fn hot_evictions_grow_pool_up_to_limit() {
    let cache = ball(growing_config());
    assert_eq!(cache.page_count(), 2);

    for i in 0..40u64 {
        cache.put(i * PAGE, &i.to_le_bytes()).unwrap();
        // A hit marks the page hot before it is evicted.
        cache.get(i * PAGE).unwrap();
        cache.check_invariants().unwrap();
    }

    assert_eq!(cache.page_count(), 16);
    assert_eq!(cache.backing_policy_len(), 16);
    let amp = cache.amp_state();
    assert!(amp.expansion_multiplier >= 2, "{amp:?}");

    let stats = cache.stats();
    assert!(stats.expansions >= 7, "{stats:?}");
    assert_eq!(stats.hot_evictions, stats.evictions);
    assert_eq!(stats.page_count, 16);
    assert_eq!(stats.preallocated_bytes, 16 * PAGE as usize);
}

#[test]
fn first_expansion_waits_for_threshold() {
    let cache = ball(growing_config());
    for i in 0..3u64 {
        cache.put(i * PAGE, b"hot").unwrap();
        cache.get(i * PAGE).unwrap();
    }
    // One hot eviction so far.
    assert_eq!(cache.page_count(), 2);
    assert_eq!(cache.amp_state().expansion_counter, 1);

    cache.put(3 * PAGE, b"hot").unwrap();
    assert_eq!(cache.page_count(), 3);
    assert_eq!(cache.amp_state().expansion_counter, 0);
    assert_eq!(cache.amp_state().expansion_events, 1);

    // The new frame takes the next page without another eviction.
    cache.put(4 * PAGE, b"hot").unwrap();
    assert_eq!(cache.backing_policy_len(), 3);
    cache.check_invariants().unwrap();
}

#[test]
fn cold_evictions_do_not_grow_pool() {
    let cache = ball(growing_config());
    for i in 0..40u64 {
        cache.put(i * PAGE, b"cold").unwrap();
    }
    assert_eq!(cache.page_count(), 2);
    let stats = cache.stats();
    assert_eq!(stats.evictions, 38);
    assert_eq!(stats.hot_evictions, 0);
    assert_eq!(stats.expansions, 0);
    assert_eq!(cache.amp_state().expansion_counter, 0);
}

#[test]
fn failed_expansion_leaves_pool_serving() {
    // Room for the initial slab and nothing more.
    let allocator = Arc::new(BudgetAllocator::new(2 * PAGE as usize));
    let cache: FurrBall =
        FurrBall::with_parts(MemoryStore::new(), growing_config(), allocator).unwrap();

    for i in 0..10u64 {
        cache.put(i * PAGE, &[i as u8 + 1; 8]).unwrap();
        cache.get(i * PAGE).unwrap();
    }
    assert_eq!(cache.page_count(), 2);
    assert_eq!(cache.stats().expansions, 0);

    let mut buf = [0u8; 8];
    cache.read(cache.get(0).unwrap(), &mut buf).unwrap();
    assert_eq!(buf, [1u8; 8]);
    cache.check_invariants().unwrap();
}

// ==============================================
// Defragmentation
// ==============================================

#[test]
fn defragment_keeps_handles_and_data() {
    let cache = ball(growing_config());
    let mut handles = Vec::new();
    for i in 0..24u64 {
        handles.push(cache.put(i * PAGE, &[i as u8 + 1; 64]).unwrap());
        cache.get(i * PAGE).unwrap();
    }
    assert!(cache.page_count() > 2);

    let resident_before = cache.resident_pages();
    cache.defragment();
    assert_eq!(cache.resident_pages(), resident_before);
    assert_eq!(cache.stats().preallocated_bytes, cache.page_count() * PAGE as usize);
    cache.check_invariants().unwrap();

    for (i, handle) in handles.iter().enumerate() {
        let mut buf = [0u8; 64];
        assert_eq!(cache.read(*handle, &mut buf), Some(64));
        assert_eq!(buf, [i as u8 + 1; 64], "page {i}");
    }
}

#[test]
fn defragment_counts_relocations() {
    let cache = ball(growing_config());
    for i in 0..24u64 {
        cache.put(i * PAGE, b"x").unwrap();
        cache.get(i * PAGE).unwrap();
    }
    let relocated = cache.defragment();
    let stats = cache.stats();
    assert_eq!(stats.relocations, relocated as u64);
    assert_eq!(stats.pointer_redirect.count, 1);

    // Already compact: a second pass moves nothing.
    assert_eq!(cache.defragment(), 0);
}
