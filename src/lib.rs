//! furrballs: an adaptive paged memory cache.
//!
//! A [`FurrBall`] keeps a working set of fixed-size pages in memory in front
//! of a persistent [`BackingStore`](store::BackingStore). Callers address
//! bytes and hold stable [`VirtualPointer`](pool::VirtualPointer) handles;
//! pages move between memory and the store, and between frames, underneath
//! those handles.
//!
//! ## Modules
//!
//! - [`ball`]: the cache facade.
//! - [`policy`]: ARC and alternative replacement policies behind
//!   [`traits::EvictionPolicy`].
//! - [`pool`]: slab-backed frames, the indirection table, adaptive growth
//!   and defragmentation.
//! - [`store`]: backing stores and codecs.
//! - [`metrics`]: statistics snapshots and export.
//! - [`registry`]: owner of open caches keyed by path.
//! - [`ds`]: slot arenas, arena-linked queues, ghost lists, page history.

pub mod alloc;
pub mod ball;
pub mod builder;
pub mod config;
pub mod ds;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod pool;
pub mod prelude;
pub mod registry;
pub mod store;
pub mod traits;
mod worker;

pub use crate::ball::{EvictionHook, FurrBall, PagePtr};
pub use crate::config::FurrConfig;
pub use crate::pool::{PageLockGuard, VirtualPointer};
