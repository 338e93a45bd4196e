//! Least Recently Used policy.
//!
//! A single recency list: touching moves a key to the front, eviction takes
//! the back. No history is kept, so touching an evicted key is a no-op.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::ds::{IntrusiveList, SlotId};
use crate::traits::{EvictionCallback, EvictionPolicy, ReadOnlyCache};

/// LRU replacement policy.
pub struct LruPolicy<K, V> {
    map: FxHashMap<K, (V, SlotId)>,
    order: IntrusiveList<K>,
    capacity: usize,
    on_evict: Option<EvictionCallback<K, V>>,
}

impl<K, V> LruPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            order: IntrusiveList::with_capacity(capacity),
            capacity,
            on_evict: None,
        }
    }

    /// The key that would be evicted next.
    pub fn peek_lru(&self) -> Option<&K> {
        self.order.back()
    }

    fn evict_lru(&mut self) {
        if let Some(key) = self.order.pop_back()
            && let Some((mut value, _)) = self.map.remove(&key)
        {
            if let Some(on_evict) = self.on_evict.as_mut() {
                on_evict(&key, &mut value);
            }
        }
    }
}

impl<K, V> std::fmt::Debug for LruPolicy<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruPolicy")
            .field("capacity", &self.capacity)
            .field("len", &self.map.len())
            .finish()
    }
}

impl<K, V> ReadOnlyCache<K, V> for LruPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K, V> EvictionPolicy<K, V> for LruPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    fn touch(&mut self, key: &K) -> bool {
        match self.map.get(key) {
            Some(&(_, slot)) => self.order.move_to_front(slot),
            None => false,
        }
    }

    fn add(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some(entry) = self.map.get_mut(&key) {
            entry.0 = value;
            return;
        }
        if self.map.len() >= self.capacity {
            self.evict_lru();
        }
        let slot = self.order.push_front(key.clone());
        self.map.insert(key, (value, slot));
    }

    fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key).map(|(value, _)| value)
    }

    fn set(&mut self, key: K, value: V) -> Option<V> {
        if let Some((old, slot)) = self.map.get_mut(&key) {
            let previous = std::mem::replace(old, value);
            self.order.move_to_front(*slot);
            return Some(previous);
        }
        self.add(key, value);
        None
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let (value, slot) = self.map.remove(key)?;
        self.order.remove(slot);
        Some(value)
    }

    fn set_eviction_callback(&mut self, callback: EvictionCallback<K, V>) {
        self.on_evict = Some(callback);
    }

    fn grow(&mut self, additional: usize) {
        self.capacity += additional;
    }

    fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}
