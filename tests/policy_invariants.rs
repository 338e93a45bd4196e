// ==============================================
// CROSS-POLICY INVARIANT TESTS (integration)
// ==============================================
//
// Properties every replacement policy must keep, plus the ARC-specific
// bookkeeping the cache facade depends on: bounded history, one eviction
// callback per displaced resident, and ghost values that come back intact.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use furrballs::builder::{PolicyBuilder, PolicyKind};
use furrballs::policy::ArcPolicy;
use furrballs::traits::{EvictionPolicy, ReadOnlyCache};
use parking_lot::Mutex;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Operation {
    Add(u16, u32),
    Touch(u16),
    Get(u16),
    Set(u16, u32),
    Remove(u16),
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => (0u16..64, any::<u32>()).prop_map(|(k, v)| Operation::Add(k, v)),
        3 => (0u16..64).prop_map(Operation::Touch),
        2 => (0u16..64).prop_map(Operation::Get),
        1 => (0u16..64, any::<u32>()).prop_map(|(k, v)| Operation::Set(k, v)),
        1 => (0u16..64).prop_map(Operation::Remove),
    ]
}

fn counting_callback(counter: &Arc<AtomicUsize>) -> Box<dyn FnMut(&u16, &mut u32) + Send> {
    let counter = Arc::clone(counter);
    Box::new(move |_: &u16, _: &mut u32| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

// ==============================================
// Capacity-4 Scenario
// ==============================================

#[test]
fn arc_capacity_four_scenario() {
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&evicted);
    let mut policy: ArcPolicy<u64, &str> = ArcPolicy::with_callback(
        4,
        Box::new(move |key: &u64, _: &mut &str| sink.lock().push(*key)),
    );

    for key in 0..4 {
        policy.add(key, "page");
    }
    assert_eq!(policy.t1_len(), 4);

    policy.add(4, "page");
    assert_eq!(*evicted.lock(), vec![0]);
    assert!(policy.in_b1(&0));

    let p_before = policy.p_value();
    assert!(policy.touch(&0));
    assert!(policy.p_value() > p_before);
    assert!(policy.in_t2(&0));
    assert_eq!(policy.peek(&0), Some(&"page"));
    policy.check_invariants().unwrap();
}

// ==============================================
// Zero Capacity
// ==============================================

#[test]
fn capacity_zero_rejects_inserts_for_every_policy() {
    for kind in PolicyKind::ALL {
        let mut policy = PolicyBuilder::new(0).build::<u16, u32>(kind);
        policy.add(1, 1);
        assert_eq!(policy.len(), 0, "{kind} accepted an insert at capacity 0");
        assert!(!policy.touch(&1));
    }
}

proptest! {
    /// len() never exceeds capacity, whatever the policy.
    #[cfg_attr(miri, ignore)]
    #[test]
    fn prop_len_within_capacity(
        kind_index in 0usize..PolicyKind::ALL.len(),
        capacity in 1usize..32,
        ops in prop::collection::vec(operation_strategy(), 0..300)
    ) {
        let kind = PolicyKind::ALL[kind_index];
        let evictions = Arc::new(AtomicUsize::new(0));
        let mut policy = PolicyBuilder::new(capacity)
            .build_with_callback(kind, counting_callback(&evictions));
        let mut lookups_and_adds = 0;

        for op in ops {
            match op {
                Operation::Add(k, v) => policy.add(k, v),
                Operation::Touch(k) => { policy.touch(&k); }
                Operation::Get(k) => { policy.get(&k); }
                Operation::Set(k, v) => { policy.set(k, v); }
                Operation::Remove(k) => { policy.remove(&k); continue; }
            }
            lookups_and_adds += 1;
            prop_assert!(policy.len() <= policy.capacity());
        }
        // Removal never fires the callback; anything else displaces at most one entry.
        prop_assert!(evictions.load(Ordering::SeqCst) <= lookups_and_adds);
    }

    /// ARC keeps its size bounds and list structure under arbitrary operations.
    #[cfg_attr(miri, ignore)]
    #[test]
    fn prop_arc_invariants_hold(
        capacity in 1usize..24,
        ops in prop::collection::vec(operation_strategy(), 0..300)
    ) {
        let mut policy: ArcPolicy<u16, u32> = ArcPolicy::new(capacity);
        for op in ops {
            match op {
                Operation::Add(k, v) => policy.add(k, v),
                Operation::Touch(k) => { policy.touch(&k); }
                Operation::Get(k) => { policy.get(&k); }
                Operation::Set(k, v) => { policy.set(k, v); }
                Operation::Remove(k) => { policy.remove(&k); }
            }
            prop_assert!(policy.check_invariants().is_ok(), "{:?}", policy.check_invariants());
            #[cfg(debug_assertions)]
            policy.debug_validate_invariants();
        }
    }

    /// Displacing a resident entry fires the callback exactly once; nothing
    /// else does.
    #[cfg_attr(miri, ignore)]
    #[test]
    fn prop_arc_one_callback_per_displacement(
        capacity in 1usize..16,
        ops in prop::collection::vec(operation_strategy(), 0..300)
    ) {
        let evictions = Arc::new(AtomicUsize::new(0));
        let mut policy = ArcPolicy::with_callback(capacity, counting_callback(&evictions));

        for op in ops {
            let before = evictions.load(Ordering::SeqCst);
            let full = policy.len() >= capacity;
            let expected = match &op {
                Operation::Add(k, _) | Operation::Set(k, _) => {
                    usize::from(full && !policy.contains(k))
                }
                Operation::Touch(k) | Operation::Get(k) => {
                    usize::from(full && (policy.in_b1(k) || policy.in_b2(k)))
                }
                Operation::Remove(_) => 0,
            };
            match op {
                Operation::Add(k, v) => policy.add(k, v),
                Operation::Touch(k) => { policy.touch(&k); }
                Operation::Get(k) => { policy.get(&k); }
                Operation::Set(k, v) => { policy.set(k, v); }
                Operation::Remove(k) => { policy.remove(&k); }
            }
            prop_assert_eq!(evictions.load(Ordering::SeqCst) - before, expected);
        }
    }

    /// A ghost hit brings back the value the callback left behind.
    #[cfg_attr(miri, ignore)]
    #[test]
    fn prop_arc_ghost_values_survive(
        capacity in 1usize..16,
        keys in prop::collection::vec(0u16..48, 1..200)
    ) {
        let mut policy: ArcPolicy<u16, u32> = ArcPolicy::with_callback(
            capacity,
            Box::new(|key: &u16, value: &mut u32| *value = u32::from(*key) + 1_000),
        );
        for key in keys {
            let ghost = policy.in_b1(&key) || policy.in_b2(&key);
            if ghost {
                prop_assert!(policy.touch(&key));
                prop_assert_eq!(policy.peek(&key), Some(&(u32::from(key) + 1_000)));
            } else if !policy.contains(&key) {
                policy.add(key, u32::from(key));
            }
        }
    }
}
