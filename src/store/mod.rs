//! Backing stores.
//!
//! - [`MemoryStore`]: in-process map, the default for [`FurrBall`](crate::FurrBall).
//! - [`DirStore`]: one file per page, optionally compressed through a [`Codec`].

pub mod dir;
pub mod memory;
pub mod traits;

pub use dir::DirStore;
pub use memory::MemoryStore;
pub use traits::{BackingStore, Codec, PageId, Passthrough, RunLength};
