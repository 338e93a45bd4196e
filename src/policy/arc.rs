//! Adaptive Replacement Cache (ARC) policy.
//!
//! ARC balances recency against frequency by keeping two resident lists and
//! two ghost lists, and by moving a target size `p` for the recency side
//! whenever a remembered key comes back.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         ArcPolicy<K, V> Layout                          │
//! │                                                                         │
//! │   map: FxHashMap<K, NonNull<Node>>  (resident entries only)             │
//! │                                                                         │
//! │   T1 (seen once)                      T2 (seen again)                   │
//! │   head ─► [n3] ◄──► [n1] ◄── tail     head ─► [n2] ◄──► [n4] ◄── tail   │
//! │            MRU          LRU                    MRU          LRU         │
//! │              │ demote                            │ demote               │
//! │              ▼                                   ▼                      │
//! │   B1 ghosts: (key, value)             B2 ghosts: (key, value)           │
//! │                                                                         │
//! │   p: target size of T1                                                  │
//! │     • ghost hit in B1 → p grows  (recency is paying off)                │
//! │     • ghost hit in B2 → p shrinks (frequency is paying off)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Bounds
//!
//! - `|T1| + |T2| ≤ capacity`
//! - `|T1| + |T2| + |B1| + |B2| ≤ 2 · capacity`
//! - `0 ≤ p ≤ capacity`
//!
//! ## Eviction
//!
//! Adding at capacity frees exactly one resident slot and runs the eviction
//! callback exactly once. The callback sees the entry before it becomes a
//! ghost and may rewrite its value; the ghost keeps the rewritten value, and
//! touching the ghost later restores that value into T2.
//!
//! ## Example
//!
//! ```
//! use furrballs::policy::arc::ArcPolicy;
//! use furrballs::traits::{EvictionPolicy, ReadOnlyCache};
//!
//! let mut policy = ArcPolicy::new(4);
//! for page in 0..4u64 {
//!     policy.add(page, page * 10);
//! }
//! policy.add(4, 40);
//! assert!(!policy.contains(&0));
//! assert!(policy.in_b1(&0));
//!
//! let p_before = policy.p_value();
//! assert!(policy.touch(&0));
//! assert!(policy.in_t2(&0));
//! assert!(policy.p_value() > p_before);
//! assert_eq!(policy.peek(&0), Some(&0));
//! ```

use std::hash::Hash;
use std::ptr::NonNull;

use rustc_hash::FxHashMap;

use crate::ds::GhostList;
use crate::error::InvariantError;
use crate::traits::{EvictionCallback, EvictionPolicy, ReadOnlyCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    T1,
    T2,
}

#[repr(C)]
struct Node<K, V> {
    prev: Option<NonNull<Node<K, V>>>,
    next: Option<NonNull<Node<K, V>>>,
    list: ListKind,
    key: K,
    value: V,
}

/// ARC replacement policy with value-retaining ghost lists.
///
/// Resident entries live in intrusive lists of heap nodes linked by raw
/// pointers; the map only points at nodes. Ghost lists are bounded by
/// `capacity` each.
pub struct ArcPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    map: FxHashMap<K, NonNull<Node<K, V>>>,

    t1_head: Option<NonNull<Node<K, V>>>,
    t1_tail: Option<NonNull<Node<K, V>>>,
    t1_len: usize,

    t2_head: Option<NonNull<Node<K, V>>>,
    t2_tail: Option<NonNull<Node<K, V>>>,
    t2_len: usize,

    b1: GhostList<K, V>,
    b2: GhostList<K, V>,

    p: usize,
    capacity: usize,
    on_evict: Option<EvictionCallback<K, V>>,
}

// SAFETY: nodes are uniquely owned by the policy and only reachable through
// `&mut self`; moving the policy moves that ownership with it.
unsafe impl<K, V> Send for ArcPolicy<K, V>
where
    K: Clone + Eq + Hash + Send,
    V: Send,
{
}

impl<K, V> ArcPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates an empty policy holding up to `capacity` resident entries.
    ///
    /// The adaptation target starts at `capacity / 2`.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            t1_head: None,
            t1_tail: None,
            t1_len: 0,
            t2_head: None,
            t2_tail: None,
            t2_len: 0,
            b1: GhostList::new(capacity),
            b2: GhostList::new(capacity),
            p: capacity / 2,
            capacity,
            on_evict: None,
        }
    }

    /// Creates a policy with an eviction callback already installed.
    pub fn with_callback(capacity: usize, on_evict: EvictionCallback<K, V>) -> Self {
        let mut policy = Self::new(capacity);
        policy.on_evict = Some(on_evict);
        policy
    }

    pub fn p_value(&self) -> usize {
        self.p
    }

    pub fn t1_len(&self) -> usize {
        self.t1_len
    }

    pub fn t2_len(&self) -> usize {
        self.t2_len
    }

    pub fn b1_len(&self) -> usize {
        self.b1.len()
    }

    pub fn b2_len(&self) -> usize {
        self.b2.len()
    }

    pub fn in_t1(&self, key: &K) -> bool {
        self.list_of(key) == Some(ListKind::T1)
    }

    pub fn in_t2(&self, key: &K) -> bool {
        self.list_of(key) == Some(ListKind::T2)
    }

    pub fn in_b1(&self, key: &K) -> bool {
        self.b1.contains(key)
    }

    pub fn in_b2(&self, key: &K) -> bool {
        self.b2.contains(key)
    }

    /// Resident plus remembered entries.
    pub fn total_len(&self) -> usize {
        self.t1_len + self.t2_len + self.b1.len() + self.b2.len()
    }

    fn list_of(&self, key: &K) -> Option<ListKind> {
        // SAFETY: every pointer in `map` is a live node owned by `self`.
        self.map.get(key).map(|ptr| unsafe { ptr.as_ref().list })
    }

    #[inline(always)]
    fn detach(&mut self, node_ptr: NonNull<Node<K, V>>) {
        // SAFETY: `node_ptr` is linked into the list named by `node.list`,
        // and its neighbours are live nodes of the same list.
        unsafe {
            let node = node_ptr.as_ref();
            let (prev, next) = (node.prev, node.next);

            let (head, tail, len) = match node.list {
                ListKind::T1 => (&mut self.t1_head, &mut self.t1_tail, &mut self.t1_len),
                ListKind::T2 => (&mut self.t2_head, &mut self.t2_tail, &mut self.t2_len),
            };

            match prev {
                Some(mut p) => p.as_mut().next = next,
                None => *head = next,
            }
            match next {
                Some(mut n) => n.as_mut().prev = prev,
                None => *tail = prev,
            }
            *len -= 1;
        }
    }

    #[inline(always)]
    fn attach_head(&mut self, mut node_ptr: NonNull<Node<K, V>>, list: ListKind) {
        let (head, tail, len) = match list {
            ListKind::T1 => (&mut self.t1_head, &mut self.t1_tail, &mut self.t1_len),
            ListKind::T2 => (&mut self.t2_head, &mut self.t2_tail, &mut self.t2_len),
        };
        // SAFETY: `node_ptr` is a live, currently unlinked node.
        unsafe {
            let node = node_ptr.as_mut();
            node.prev = None;
            node.next = *head;
            node.list = list;
            match *head {
                Some(mut h) => h.as_mut().prev = Some(node_ptr),
                None => *tail = Some(node_ptr),
            }
        }
        *head = Some(node_ptr);
        *len += 1;
    }

    fn insert_head(&mut self, key: K, value: V, list: ListKind) {
        let node = Box::new(Node {
            prev: None,
            next: None,
            list,
            key: key.clone(),
            value,
        });
        let node_ptr = NonNull::from(Box::leak(node));
        self.map.insert(key, node_ptr);
        self.attach_head(node_ptr, list);
    }

    /// Unlinks the LRU node of `list` and hands back ownership of it.
    fn pop_tail(&mut self, list: ListKind) -> Option<Box<Node<K, V>>> {
        let tail = match list {
            ListKind::T1 => self.t1_tail?,
            ListKind::T2 => self.t2_tail?,
        };
        self.detach(tail);
        // SAFETY: `tail` was allocated by `insert_head` through `Box::leak`
        // and is now unlinked; the map entry is removed right after.
        let node = unsafe { Box::from_raw(tail.as_ptr()) };
        self.map.remove(&node.key);
        Some(node)
    }

    /// Moves the LRU entry of `list` into its ghost list, running the callback.
    fn demote(&mut self, list: ListKind) {
        if let Some(node) = self.pop_tail(list) {
            let Node { key, mut value, .. } = *node;
            if let Some(on_evict) = self.on_evict.as_mut() {
                on_evict(&key, &mut value);
            }
            match list {
                ListKind::T1 => self.b1.record(key, value),
                ListKind::T2 => self.b2.record(key, value),
            };
        }
    }

    /// Drops the LRU entry of T2 without remembering it, running the callback.
    fn discard_t2(&mut self) {
        if let Some(node) = self.pop_tail(ListKind::T2) {
            let Node { key, mut value, .. } = *node;
            if let Some(on_evict) = self.on_evict.as_mut() {
                on_evict(&key, &mut value);
            }
        }
    }

    /// Demotes one resident entry, chosen by the adaptation target `p`.
    fn replace(&mut self, in_b2: bool) {
        let from_t1 = self.t1_len > 0
            && (self.t1_len > self.p || (in_b2 && self.t1_len == self.p) || self.t2_len == 0);
        if from_t1 {
            self.demote(ListKind::T1);
        } else {
            self.demote(ListKind::T2);
        }
    }

    /// Makes room for one new resident entry and keeps history bounded.
    fn evict(&mut self) {
        let c = self.capacity;

        // Recency side: T1 and B1 together stay within `c`.
        if self.t1_len + self.b1.len() >= c {
            if self.t1_len < c {
                self.b1.pop_oldest();
            } else {
                self.demote(ListKind::T1);
            }
        }

        // History: all four lists together stay within `2c`.
        if self.total_len() >= 2 * c {
            if self.t2_len + self.b2.len() > c && !self.b2.is_empty() {
                self.b2.pop_oldest();
            } else if self.t2_len > 0 {
                self.discard_t2();
            } else {
                self.b1.pop_oldest();
            }
        }

        if self.t1_len + self.t2_len >= c {
            self.replace(false);
        }
    }

    /// Checks the ARC size bounds without walking the lists.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let resident = self.t1_len + self.t2_len;
        if self.map.len() != resident {
            return Err(InvariantError::new(format!(
                "map holds {} entries but T1 + T2 = {}",
                self.map.len(),
                resident
            )));
        }
        if resident > self.capacity {
            return Err(InvariantError::new(format!(
                "resident entries ({}) exceed capacity ({})",
                resident, self.capacity
            )));
        }
        if self.total_len() > 2 * self.capacity {
            return Err(InvariantError::new(format!(
                "history ({}) exceeds twice the capacity ({})",
                self.total_len(),
                self.capacity
            )));
        }
        if self.p > self.capacity {
            return Err(InvariantError::new(format!(
                "p ({}) exceeds capacity ({})",
                self.p, self.capacity
            )));
        }
        Ok(())
    }

    #[cfg(any(test, debug_assertions))]
    /// Panics if any structural or size invariant is violated.
    pub fn debug_validate_invariants(&self)
    where
        K: std::fmt::Debug,
    {
        assert_eq!(self.map.len(), self.t1_len + self.t2_len);
        assert!(
            self.t1_len + self.t2_len <= self.capacity,
            "resident entries ({}) exceed capacity ({})",
            self.t1_len + self.t2_len,
            self.capacity
        );
        assert!(
            self.total_len() <= 2 * self.capacity,
            "history ({}) exceeds twice the capacity ({})",
            self.total_len(),
            self.capacity
        );
        assert!(self.p <= self.capacity, "p ({}) exceeds capacity", self.p);

        for (list, head, expected) in [
            (ListKind::T1, self.t1_head, self.t1_len),
            (ListKind::T2, self.t2_head, self.t2_len),
        ] {
            let mut count = 0;
            let mut current = head;
            while let Some(node_ptr) = current {
                // SAFETY: list nodes are live while `self` is borrowed.
                let node = unsafe { node_ptr.as_ref() };
                assert_eq!(node.list, list, "node linked into the wrong list");
                assert_eq!(self.map.get(&node.key), Some(&node_ptr));
                count += 1;
                assert!(count <= expected, "cycle in {list:?}");
                current = node.next;
            }
            assert_eq!(count, expected, "{list:?} length mismatch");
        }

        for key in self.map.keys() {
            assert!(!self.b1.contains(key), "{key:?} is resident and in B1");
            assert!(!self.b2.contains(key), "{key:?} is resident and in B2");
        }
        for key in self.b1.keys() {
            assert!(!self.b2.contains(key), "{key:?} is in both ghost lists");
        }
        self.b1.debug_validate_invariants();
        self.b2.debug_validate_invariants();
    }
}

impl<K, V> std::fmt::Debug for ArcPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcPolicy")
            .field("capacity", &self.capacity)
            .field("t1_len", &self.t1_len)
            .field("t2_len", &self.t2_len)
            .field("b1_len", &self.b1.len())
            .field("b2_len", &self.b2.len())
            .field("p", &self.p)
            .finish()
    }
}

impl<K, V> ReadOnlyCache<K, V> for ArcPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn len(&self) -> usize {
        self.t1_len + self.t2_len
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K, V> EvictionPolicy<K, V> for ArcPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    fn touch(&mut self, key: &K) -> bool {
        if let Some(&node_ptr) = self.map.get(key) {
            self.detach(node_ptr);
            self.attach_head(node_ptr, ListKind::T2);
            return true;
        }

        let in_b1 = self.b1.contains(key);
        let in_b2 = !in_b1 && self.b2.contains(key);
        if !in_b1 && !in_b2 {
            return false;
        }

        let value = if in_b1 {
            let delta = (self.b2.len() / self.b1.len()).max(1);
            self.p = (self.p + delta).min(self.capacity);
            self.b1.remove(key)
        } else {
            let delta = (self.b1.len() / self.b2.len()).max(1);
            self.p = self.p.saturating_sub(delta);
            self.b2.remove(key)
        };

        if self.t1_len + self.t2_len >= self.capacity {
            self.replace(in_b2);
        }
        if let Some(value) = value {
            self.insert_head(key.clone(), value, ListKind::T2);
        }
        true
    }

    fn add(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some(&node_ptr) = self.map.get(&key) {
            // SAFETY: resident node owned by `self`.
            unsafe { (*node_ptr.as_ptr()).value = value };
            return;
        }

        self.b1.remove(&key);
        self.b2.remove(&key);
        if self.t1_len + self.t2_len >= self.capacity {
            self.evict();
        }
        self.insert_head(key, value, ListKind::T1);
    }

    fn peek(&self, key: &K) -> Option<&V> {
        // SAFETY: resident node owned by `self`, borrowed for `&self`.
        self.map.get(key).map(|ptr| unsafe { &ptr.as_ref().value })
    }

    fn set(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&node_ptr) = self.map.get(&key) {
            // SAFETY: resident node owned by `self`.
            let old = unsafe { std::mem::replace(&mut (*node_ptr.as_ptr()).value, value) };
            self.touch(&key);
            return Some(old);
        }
        self.add(key, value);
        None
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        if let Some(node_ptr) = self.map.remove(key) {
            self.detach(node_ptr);
            // SAFETY: unlinked and removed from the map above.
            let node = unsafe { Box::from_raw(node_ptr.as_ptr()) };
            return Some(node.value);
        }
        self.b1.remove(key).or_else(|| self.b2.remove(key))
    }

    fn set_eviction_callback(&mut self, callback: EvictionCallback<K, V>) {
        self.on_evict = Some(callback);
    }

    fn grow(&mut self, additional: usize) {
        self.capacity += additional;
        self.b1.set_capacity(self.capacity);
        self.b2.set_capacity(self.capacity);
    }

    fn clear(&mut self) {
        while self.pop_tail(ListKind::T1).is_some() {}
        while self.pop_tail(ListKind::T2).is_some() {}
        self.b1.clear();
        self.b2.clear();
        self.p = self.capacity / 2;
    }
}

impl<K, V> Drop for ArcPolicy<K, V>
where
    K: Clone + Eq + Hash,
{
    fn drop(&mut self) {
        EvictionPolicy::clear(self);
    }
}
