//! Cache configuration.
//!
//! [`FurrConfig`] is a plain value: build it with `Default` plus the
//! `with_*` methods, hand it to [`FurrBall::create`](crate::FurrBall::create),
//! and the cache keeps an immutable, resolved copy.
//!
//! Page size and capacity limit are hints. Resolution rounds the page size up
//! to a power of two and replaces zeros with defaults:
//!
//! | Field                | Default   | Resolution                      |
//! |----------------------|-----------|---------------------------------|
//! | `page_size`          | 4096      | next power of two, `0` → 4096   |
//! | `capacity_limit`     | 1 MiB     | `0` → 1 MiB                     |
//! | `initial_page_count` | 2         | clamped to available memory     |
//! | `resize_threshold`   | 4         | must be non-zero                |
//! | `contingency_pages`  | 1         |                                 |
//!
//! ```
//! use furrballs::builder::PolicyKind;
//! use furrballs::config::FurrConfig;
//!
//! let config = FurrConfig::default()
//!     .with_page_size(3000)
//!     .with_initial_page_count(8)
//!     .with_policy(PolicyKind::Lru)
//!     .with_volatile(true);
//!
//! let resolved = config.resolved();
//! assert_eq!(resolved.page_size, 4096);
//! assert!(resolved.validate().is_ok());
//! ```

use crate::builder::PolicyKind;
use crate::error::ConfigError;

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_CAPACITY_LIMIT: usize = 1 << 20;
pub const DEFAULT_INITIAL_PAGE_COUNT: usize = 2;
pub const DEFAULT_RESIZE_THRESHOLD: usize = 4;
pub const DEFAULT_CONTINGENCY_PAGES: usize = 1;

/// Configuration of one cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FurrConfig {
    /// Upper bound, in bytes, on the memory the page pool may grow to.
    pub capacity_limit: usize,
    /// Pages allocated up front; reduced if memory is short.
    pub initial_page_count: usize,
    /// Bytes per page.
    pub page_size: usize,
    /// Hot evictions per pool expansion, and expansions per growth step of
    /// the expansion size.
    pub resize_threshold: usize,
    /// How many pages around a known page a miss may reach and still be
    /// loaded.
    pub contingency_pages: usize,
    pub policy: PolicyKind,
    /// Give every page its own mutex.
    pub lockable_pages: bool,
    /// Evicted data is dropped instead of written back.
    pub is_volatile: bool,
    /// Emit per-operation `debug!` events.
    pub enable_logging: bool,
    /// Hand write-backs to a background worker.
    pub enable_burst_mode: bool,
    /// Allocate slabs through the allocator's node-local path.
    pub enable_numa: bool,
    /// Mixed page sizes; not supported, rejected by [`validate`](Self::validate).
    pub use_hybrid_pages: bool,
}

impl Default for FurrConfig {
    fn default() -> Self {
        Self {
            capacity_limit: DEFAULT_CAPACITY_LIMIT,
            initial_page_count: DEFAULT_INITIAL_PAGE_COUNT,
            page_size: DEFAULT_PAGE_SIZE,
            resize_threshold: DEFAULT_RESIZE_THRESHOLD,
            contingency_pages: DEFAULT_CONTINGENCY_PAGES,
            policy: PolicyKind::default(),
            lockable_pages: false,
            is_volatile: false,
            enable_logging: false,
            enable_burst_mode: false,
            enable_numa: false,
            use_hybrid_pages: false,
        }
    }
}

impl FurrConfig {
    pub fn with_capacity_limit(mut self, bytes: usize) -> Self {
        self.capacity_limit = bytes;
        self
    }

    pub fn with_initial_page_count(mut self, pages: usize) -> Self {
        self.initial_page_count = pages;
        self
    }

    pub fn with_page_size(mut self, bytes: usize) -> Self {
        self.page_size = bytes;
        self
    }

    pub fn with_resize_threshold(mut self, threshold: usize) -> Self {
        self.resize_threshold = threshold;
        self
    }

    pub fn with_contingency_pages(mut self, pages: usize) -> Self {
        self.contingency_pages = pages;
        self
    }

    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_lockable_pages(mut self, enabled: bool) -> Self {
        self.lockable_pages = enabled;
        self
    }

    pub fn with_volatile(mut self, enabled: bool) -> Self {
        self.is_volatile = enabled;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    pub fn with_burst_mode(mut self, enabled: bool) -> Self {
        self.enable_burst_mode = enabled;
        self
    }

    pub fn with_numa(mut self, enabled: bool) -> Self {
        self.enable_numa = enabled;
        self
    }

    pub fn with_hybrid_pages(mut self, enabled: bool) -> Self {
        self.use_hybrid_pages = enabled;
        self
    }

    /// Returns a copy with hints rounded and zeros replaced by defaults.
    pub fn resolved(&self) -> Self {
        let page_size = match self.page_size {
            0 => DEFAULT_PAGE_SIZE,
            size => size.checked_next_power_of_two().unwrap_or(DEFAULT_PAGE_SIZE),
        };
        let capacity_limit = match self.capacity_limit {
            0 => DEFAULT_CAPACITY_LIMIT,
            limit => limit,
        };
        Self {
            page_size,
            capacity_limit,
            ..self.clone()
        }
    }

    /// Most pages the pool may ever hold.
    pub fn max_pages(&self) -> usize {
        let resolved = self.resolved();
        resolved.capacity_limit / resolved.page_size
    }

    /// Checks the configuration after resolution.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let resolved = self.resolved();
        if resolved.resize_threshold == 0 {
            return Err(ConfigError::new("resize_threshold must be greater than zero"));
        }
        if resolved.use_hybrid_pages {
            return Err(ConfigError::new("hybrid page sizes are not supported"));
        }
        if resolved.capacity_limit < resolved.page_size {
            return Err(ConfigError::new(format!(
                "capacity_limit ({}) is smaller than one page ({})",
                resolved.capacity_limit, resolved.page_size
            )));
        }
        Ok(())
    }
}
