//! # Eviction Policy Traits
//!
//! Every replacement policy in [`crate::policy`] implements one trait pair so
//! the cache facade can hold any of them behind a `Box<dyn EvictionPolicy>`
//! chosen at construction time.
//!
//! ```text
//!   ┌──────────────────────────────────────────┐
//!   │           ReadOnlyCache<K, V>            │
//!   │                                          │
//!   │  contains(&, &K) → bool                  │
//!   │  len(&) → usize                          │
//!   │  is_empty(&) → bool                      │
//!   │  capacity(&) → usize                     │
//!   └────────────────────┬─────────────────────┘
//!                        │
//!                        ▼
//!   ┌──────────────────────────────────────────┐
//!   │          EvictionPolicy<K, V>            │
//!   │                                          │
//!   │  touch(&mut, &K) → bool                  │
//!   │  add(&mut, K, V)                         │
//!   │  get(&mut, &K) → Option<&V>              │
//!   │  peek(&, &K) → Option<&V>                │
//!   │  set(&mut, K, V) → Option<V>             │
//!   │  remove(&mut, &K) → Option<V>            │
//!   │  set_eviction_callback(&mut, callback)   │
//!   │  grow(&mut, usize)                       │
//!   │  clear(&mut)                             │
//!   └──────────────────────────────────────────┘
//! ```
//!
//! ## Eviction callback contract
//!
//! The callback runs synchronously, inside the policy call that caused the
//! eviction, once per entry leaving residency. It receives the key and a
//! mutable reference to the value and may rewrite the value in place; policies
//! that remember evicted entries (ARC's ghost lists) keep the rewritten value.
//! The callback must not call back into the same policy.
//!
//! `remove` and `clear` never invoke the callback.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use furrballs::policy::arc::ArcPolicy;
//! use furrballs::traits::{EvictionPolicy, ReadOnlyCache};
//!
//! let evicted = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&evicted);
//!
//! let mut policy = ArcPolicy::new(2);
//! policy.set_eviction_callback(Box::new(move |_key: &u64, _value: &mut &str| {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! }));
//!
//! policy.add(1, "one");
//! policy.add(2, "two");
//! policy.add(3, "three");
//!
//! assert_eq!(policy.len(), 2);
//! assert_eq!(evicted.load(Ordering::Relaxed), 1);
//! ```

/// Callback invoked when an entry leaves residency.
pub type EvictionCallback<K, V> = Box<dyn FnMut(&K, &mut V) + Send>;

/// Side-effect free queries shared by all policies.
pub trait ReadOnlyCache<K, V> {
    /// Returns `true` if `key` is resident. Ghost entries are not resident.
    fn contains(&self, key: &K) -> bool;

    /// Number of resident entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of resident entries.
    fn capacity(&self) -> usize;
}

/// A replacement policy mapping keys to values under a fixed resident budget.
///
/// All operations are total: unknown keys are no-ops or `None`, never panics.
pub trait EvictionPolicy<K, V>: ReadOnlyCache<K, V> {
    /// Records an access to `key`.
    ///
    /// Returns `true` if the key was known to the policy. For policies with
    /// history (ARC), touching a remembered key brings it back into residency
    /// with the value it was evicted with.
    fn touch(&mut self, key: &K) -> bool;

    /// Inserts a key the policy has not seen before, evicting if full.
    ///
    /// Adding a key that is already resident updates its value in place.
    fn add(&mut self, key: K, value: V);

    /// Touches `key` and returns its value if resident afterwards.
    fn get(&mut self, key: &K) -> Option<&V> {
        self.touch(key);
        self.peek(key)
    }

    /// Returns the value of a resident key without recording an access.
    fn peek(&self, key: &K) -> Option<&V>;

    /// Upsert: updates and touches a resident key, otherwise adds it.
    ///
    /// Returns the previous value of a resident key.
    fn set(&mut self, key: K, value: V) -> Option<V>;

    /// Drops `key` (resident or remembered) without invoking the callback.
    fn remove(&mut self, key: &K) -> Option<V>;

    /// Installs the callback run for every eviction.
    fn set_eviction_callback(&mut self, callback: EvictionCallback<K, V>);

    /// Raises the resident budget by `additional` entries.
    fn grow(&mut self, additional: usize);

    /// Drops every entry and all history without invoking the callback.
    fn clear(&mut self);
}
