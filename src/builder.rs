//! Policy selection at construction time.
//!
//! The cache facade never names a concrete policy type; it asks the builder
//! for a boxed [`EvictionPolicy`] of the configured [`PolicyKind`].
//!
//! ```rust
//! use furrballs::builder::{PolicyBuilder, PolicyKind};
//! use furrballs::traits::{EvictionPolicy, ReadOnlyCache};
//!
//! let mut policy = PolicyBuilder::new(2).build::<u64, &str>(PolicyKind::Lru);
//! policy.add(1, "one");
//! policy.add(2, "two");
//! policy.touch(&1);
//! policy.add(3, "three");
//! assert!(policy.contains(&1));
//! assert!(!policy.contains(&2));
//! ```

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::policy::{ArcPolicy, LfuPolicy, LruPolicy, S3FifoPolicy};
use crate::traits::{EvictionCallback, EvictionPolicy};

/// Boxed policy as held by the cache facade.
pub type BoxedPolicy<K, V> = Box<dyn EvictionPolicy<K, V> + Send>;

/// Available replacement policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// Adaptive Replacement Cache.
    #[default]
    Arc,
    /// Small/main FIFO queues with a ghost list.
    S3Fifo,
    /// Least Recently Used.
    Lru,
    /// Least Frequently Used.
    Lfu,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 4] = [
        PolicyKind::Arc,
        PolicyKind::S3Fifo,
        PolicyKind::Lru,
        PolicyKind::Lfu,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Arc => "arc",
            PolicyKind::S3Fifo => "s3-fifo",
            PolicyKind::Lru => "lru",
            PolicyKind::Lfu => "lfu",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::new(format!("unknown eviction policy: {s}")))
    }
}

/// Builds boxed policies of a fixed capacity.
#[derive(Debug, Clone, Copy)]
pub struct PolicyBuilder {
    capacity: usize,
}

impl PolicyBuilder {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn build<K, V>(self, kind: PolicyKind) -> BoxedPolicy<K, V>
    where
        K: Clone + Eq + Hash + Send + 'static,
        V: Send + 'static,
    {
        match kind {
            PolicyKind::Arc => Box::new(ArcPolicy::new(self.capacity)),
            PolicyKind::S3Fifo => Box::new(S3FifoPolicy::new(self.capacity)),
            PolicyKind::Lru => Box::new(LruPolicy::new(self.capacity)),
            PolicyKind::Lfu => Box::new(LfuPolicy::new(self.capacity)),
        }
    }

    /// Builds a policy with `on_evict` already installed.
    pub fn build_with_callback<K, V>(
        self,
        kind: PolicyKind,
        on_evict: EvictionCallback<K, V>,
    ) -> BoxedPolicy<K, V>
    where
        K: Clone + Eq + Hash + Send + 'static,
        V: Send + 'static,
    {
        let mut policy = self.build(kind);
        policy.set_eviction_callback(on_evict);
        policy
    }
}
