//! Bounded recency list of recently evicted entries.
//!
//! Adaptive policies remember what they evicted so a quick return of the same
//! key can steer the policy. Each ghost keeps the value it was evicted with
//! (`V = ()` for key-only ghosts), which lets a policy bring the entry back
//! without asking the caller for it again.
//!
//! ```text
//!   index: FxHashMap<K, SlotId>      list: IntrusiveList<(K, V)>
//!                                    head ─► [A] ◄──► [B] ◄──► [C] ◄── tail
//!                                            newest              oldest
//! ```
//!
//! `record`, `remove` and `contains` are O(1) average.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::ds::intrusive_list::IntrusiveList;
use crate::ds::slot_arena::SlotId;

/// Bounded list of ghost entries ordered newest to oldest.
#[derive(Debug)]
pub struct GhostList<K, V = ()> {
    list: IntrusiveList<(K, V)>,
    index: FxHashMap<K, SlotId>,
    capacity: usize,
}

impl<K, V> GhostList<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            list: IntrusiveList::with_capacity(capacity),
            index: FxHashMap::default(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Changes the bound, dropping the oldest ghosts if the list shrank.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.list.len() > capacity {
            self.pop_oldest();
        }
    }

    /// Records `key` as the newest ghost.
    ///
    /// Returns the oldest ghost if it had to make room. Re-recording a known
    /// key replaces its value and moves it to the front.
    pub fn record(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.capacity == 0 {
            return None;
        }

        if let Some(&id) = self.index.get(&key) {
            if let Some(entry) = self.list.get_mut(id) {
                entry.1 = value;
            }
            self.list.move_to_front(id);
            return None;
        }

        let dropped = if self.list.len() >= self.capacity {
            self.pop_oldest()
        } else {
            None
        };

        let id = self.list.push_front((key.clone(), value));
        self.index.insert(key, id);
        dropped
    }

    /// Removes `key`, handing back the value it was evicted with.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let id = self.index.remove(key)?;
        self.list.remove(id).map(|(_, value)| value)
    }

    /// Removes and returns the oldest ghost.
    pub fn pop_oldest(&mut self) -> Option<(K, V)> {
        let (key, value) = self.list.pop_back()?;
        self.index.remove(&key);
        Some((key, value))
    }

    /// Iterates ghost keys from newest to oldest.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.list.iter().map(|(key, _)| key)
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.index.clear();
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert_eq!(self.list.len(), self.index.len());
        assert!(self.list.len() <= self.capacity);
        for (key, &id) in &self.index {
            let entry = self.list.get(id).expect("indexed ghost missing from list");
            assert!(entry.0 == *key);
        }
        self.list.debug_validate_invariants();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghost_list_drops_oldest_when_full() {
        let mut ghost = GhostList::new(2);
        assert_eq!(ghost.record("a", 1), None);
        assert_eq!(ghost.record("b", 2), None);

        ghost.record("a", 10);
        assert_eq!(ghost.record("c", 3), Some(("b", 2)));

        assert!(ghost.contains(&"a"));
        assert!(ghost.contains(&"c"));
        assert!(!ghost.contains(&"b"));
        assert_eq!(ghost.remove(&"a"), Some(10));
        ghost.debug_validate_invariants();
    }

    #[test]
    fn ghost_list_zero_capacity_is_noop() {
        let mut ghost: GhostList<&str> = GhostList::new(0);
        ghost.record("a", ());
        assert!(ghost.is_empty());
        assert!(!ghost.contains(&"a"));
    }

    #[test]
    fn ghost_list_pop_oldest_and_keys_order() {
        let mut ghost = GhostList::new(3);
        ghost.record(1, 'x');
        ghost.record(2, 'y');
        ghost.record(3, 'z');
        assert_eq!(ghost.keys().copied().collect::<Vec<_>>(), vec![3, 2, 1]);

        assert_eq!(ghost.pop_oldest(), Some((1, 'x')));
        assert_eq!(ghost.len(), 2);
        assert!(!ghost.contains(&1));
    }

    #[test]
    fn ghost_list_set_capacity_trims_oldest() {
        let mut ghost = GhostList::new(4);
        for key in 0..4 {
            ghost.record(key, ());
        }
        ghost.set_capacity(2);
        assert_eq!(ghost.len(), 2);
        assert!(ghost.contains(&3));
        assert!(ghost.contains(&2));
        assert!(!ghost.contains(&0));

        ghost.set_capacity(5);
        ghost.record(9, ());
        assert_eq!(ghost.len(), 3);
        ghost.debug_validate_invariants();
    }

    #[test]
    fn ghost_list_remove_missing_and_clear() {
        let mut ghost = GhostList::new(2);
        ghost.record("a", 1);
        assert_eq!(ghost.remove(&"missing"), None);
        ghost.clear();
        assert!(ghost.is_empty());
        assert_eq!(ghost.remove(&"a"), None);
    }
}
