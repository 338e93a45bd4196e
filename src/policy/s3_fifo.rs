//! S3-FIFO (Simple, Scalable, Scan-resistant FIFO) policy.
//!
//! Three FIFO queues instead of LRU bookkeeping: new keys enter a small
//! probationary queue, keys touched while there graduate to the main queue,
//! and keys evicted from the small queue are remembered (key only) so a quick
//! return skips probation.
//!
//! ```text
//!   add ──► SMALL [new ... old] ──freq>0──► MAIN [new ... old] ──freq>0─┐
//!                    │ freq == 0                 ▲       │ freq == 0    │
//!                    ▼                           │       ▼              │
//!                 GHOST (keys) ── re-add ────────┘    evicted           │
//!                                                        ▲── freq-1 ────┘
//! ```
//!
//! Access counts saturate at 3. Touching a ghost key is a no-op (ghosts carry
//! no value); re-adding it inserts straight into the main queue.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::ds::{GhostList, IntrusiveList, SlotId};
use crate::traits::{EvictionCallback, EvictionPolicy, ReadOnlyCache};

const MAX_FREQ: u8 = 3;
const SMALL_RATIO: f64 = 0.1;
const GHOST_RATIO: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    Small,
    Main,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    freq: u8,
    queue: QueueKind,
    slot: SlotId,
}

/// S3-FIFO replacement policy.
pub struct S3FifoPolicy<K, V> {
    map: FxHashMap<K, Entry<V>>,
    small: IntrusiveList<K>,
    main: IntrusiveList<K>,
    ghost: GhostList<K>,
    small_cap: usize,
    capacity: usize,
    on_evict: Option<EvictionCallback<K, V>>,
}

impl<K, V> S3FifoPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            small: IntrusiveList::new(),
            main: IntrusiveList::new(),
            ghost: GhostList::new(ghost_capacity(capacity)),
            small_cap: small_capacity(capacity),
            capacity,
            on_evict: None,
        }
    }

    pub fn small_len(&self) -> usize {
        self.small.len()
    }

    pub fn main_len(&self) -> usize {
        self.main.len()
    }

    pub fn ghost_len(&self) -> usize {
        self.ghost.len()
    }

    pub fn in_ghost(&self, key: &K) -> bool {
        self.ghost.contains(key)
    }

    fn queue_mut(&mut self, queue: QueueKind) -> &mut IntrusiveList<K> {
        match queue {
            QueueKind::Small => &mut self.small,
            QueueKind::Main => &mut self.main,
        }
    }

    fn evict_if_needed(&mut self) {
        while self.map.len() >= self.capacity {
            let queue = if self.small.len() > self.small_cap || self.main.is_empty() {
                QueueKind::Small
            } else {
                QueueKind::Main
            };
            if !self.evict_from(queue) {
                break;
            }
        }
    }

    /// Pops the oldest key of `queue`; it is either reinserted or evicted.
    fn evict_from(&mut self, queue: QueueKind) -> bool {
        let Some(key) = self.queue_mut(queue).pop_back() else {
            return false;
        };
        let Some(entry) = self.map.get_mut(&key) else {
            return true;
        };

        if entry.freq > 0 {
            entry.freq = match queue {
                QueueKind::Small => 0,
                QueueKind::Main => entry.freq - 1,
            };
            entry.queue = QueueKind::Main;
            entry.slot = self.main.push_front(key);
            return true;
        }

        if let Some(mut entry) = self.map.remove(&key) {
            if let Some(on_evict) = self.on_evict.as_mut() {
                on_evict(&key, &mut entry.value);
            }
        }
        if queue == QueueKind::Small {
            self.ghost.record(key, ());
        }
        true
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert_eq!(self.map.len(), self.small.len() + self.main.len());
        assert!(self.map.len() <= self.capacity);
        for (key, entry) in &self.map {
            let list = match entry.queue {
                QueueKind::Small => &self.small,
                QueueKind::Main => &self.main,
            };
            assert!(list.get(entry.slot) == Some(key));
            assert!(entry.freq <= MAX_FREQ);
            assert!(!self.ghost.contains(key));
        }
        self.small.debug_validate_invariants();
        self.main.debug_validate_invariants();
    }
}

fn small_capacity(capacity: usize) -> usize {
    (capacity as f64 * SMALL_RATIO).round() as usize
}

fn ghost_capacity(capacity: usize) -> usize {
    (capacity as f64 * GHOST_RATIO).round() as usize
}

impl<K, V> std::fmt::Debug for S3FifoPolicy<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3FifoPolicy")
            .field("capacity", &self.capacity)
            .field("small_len", &self.small.len())
            .field("main_len", &self.main.len())
            .field("small_cap", &self.small_cap)
            .finish()
    }
}

impl<K, V> ReadOnlyCache<K, V> for S3FifoPolicy<K, V>
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

impl<K, V> EvictionPolicy<K, V> for S3FifoPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    fn touch(&mut self, key: &K) -> bool {
        match self.map.get_mut(key) {
            Some(entry) => {
                entry.freq = (entry.freq + 1).min(MAX_FREQ);
                true
            }
            None => false,
        }
    }

    fn add(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some(entry) = self.map.get_mut(&key) {
            entry.value = value;
            return;
        }

        let queue = if self.ghost.remove(&key).is_some() {
            QueueKind::Main
        } else {
            QueueKind::Small
        };
        self.evict_if_needed();

        let slot = self.queue_mut(queue).push_front(key.clone());
        self.map.insert(
            key,
            Entry {
                value,
                freq: 0,
                queue,
                slot,
            },
        );
    }

    fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key).map(|entry| &entry.value)
    }

    fn set(&mut self, key: K, value: V) -> Option<V> {
        if let Some(entry) = self.map.get_mut(&key) {
            entry.freq = (entry.freq + 1).min(MAX_FREQ);
            return Some(std::mem::replace(&mut entry.value, value));
        }
        self.add(key, value);
        None
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let Some(entry) = self.map.remove(key) else {
            self.ghost.remove(key);
            return None;
        };
        self.queue_mut(entry.queue).remove(entry.slot);
        Some(entry.value)
    }

    fn set_eviction_callback(&mut self, callback: EvictionCallback<K, V>) {
        self.on_evict = Some(callback);
    }

    fn grow(&mut self, additional: usize) {
        self.capacity += additional;
        self.small_cap = small_capacity(self.capacity);
        self.ghost.set_capacity(ghost_capacity(self.capacity));
    }

    fn clear(&mut self) {
        self.map.clear();
        self.small.clear();
        self.main.clear();
        self.ghost.clear();
    }
}
