//! Least Frequently Used policy.
//!
//! Keys are grouped into frequency buckets; eviction takes the oldest key of
//! the lowest bucket, so ties between equally cold keys go to insertion order.
//!
//! ```text
//!   buckets: BTreeMap<u64, IntrusiveList<K>>
//!     1 ─► [k7, k3]        ◄── victim is the back of the lowest bucket
//!     2 ─► [k1]
//!     5 ─► [k4, k2]
//! ```

use std::collections::BTreeMap;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::ds::{IntrusiveList, SlotId};
use crate::traits::{EvictionCallback, EvictionPolicy, ReadOnlyCache};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    freq: u64,
    slot: SlotId,
}

/// LFU replacement policy.
pub struct LfuPolicy<K, V> {
    map: FxHashMap<K, Entry<V>>,
    buckets: BTreeMap<u64, IntrusiveList<K>>,
    capacity: usize,
    on_evict: Option<EvictionCallback<K, V>>,
}

impl<K, V> LfuPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            buckets: BTreeMap::new(),
            capacity,
            on_evict: None,
        }
    }

    pub fn frequency(&self, key: &K) -> Option<u64> {
        self.map.get(key).map(|entry| entry.freq)
    }

    fn unlink(&mut self, freq: u64, slot: SlotId) {
        if let Some(bucket) = self.buckets.get_mut(&freq) {
            bucket.remove(slot);
            if bucket.is_empty() {
                self.buckets.remove(&freq);
            }
        }
    }

    fn link(&mut self, freq: u64, key: K) -> SlotId {
        self.buckets.entry(freq).or_default().push_front(key)
    }

    fn evict_lfu(&mut self) {
        let Some(mut bucket) = self.buckets.first_entry() else {
            return;
        };
        let victim = bucket.get_mut().pop_back();
        if bucket.get().is_empty() {
            bucket.remove();
        }
        if let Some(key) = victim
            && let Some(mut entry) = self.map.remove(&key)
        {
            if let Some(on_evict) = self.on_evict.as_mut() {
                on_evict(&key, &mut entry.value);
            }
        }
    }
}

impl<K, V> std::fmt::Debug for LfuPolicy<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LfuPolicy")
            .field("capacity", &self.capacity)
            .field("len", &self.map.len())
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

impl<K, V> ReadOnlyCache<K, V> for LfuPolicy<K, V>
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

impl<K, V> EvictionPolicy<K, V> for LfuPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    fn touch(&mut self, key: &K) -> bool {
        let Some(entry) = self.map.get(key) else {
            return false;
        };
        let (freq, slot) = (entry.freq, entry.slot);
        self.unlink(freq, slot);
        let slot = self.link(freq + 1, key.clone());
        if let Some(entry) = self.map.get_mut(key) {
            entry.freq = freq + 1;
            entry.slot = slot;
        }
        true
    }

    fn add(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some(entry) = self.map.get_mut(&key) {
            entry.value = value;
            return;
        }
        if self.map.len() >= self.capacity {
            self.evict_lfu();
        }
        let slot = self.link(1, key.clone());
        self.map.insert(
            key,
            Entry {
                value,
                freq: 1,
                slot,
            },
        );
    }

    fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key).map(|entry| &entry.value)
    }

    fn set(&mut self, key: K, value: V) -> Option<V> {
        if let Some(entry) = self.map.get_mut(&key) {
            let previous = std::mem::replace(&mut entry.value, value);
            self.touch(&key);
            return Some(previous);
        }
        self.add(key, value);
        None
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.map.remove(key)?;
        self.unlink(entry.freq, entry.slot);
        Some(entry.value)
    }

    fn set_eviction_callback(&mut self, callback: EvictionCallback<K, V>) {
        self.on_evict = Some(callback);
    }

    fn grow(&mut self, additional: usize) {
        self.capacity += additional;
    }

    fn clear(&mut self) {
        self.map.clear();
        self.buckets.clear();
    }
}
