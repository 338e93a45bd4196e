//! Replacement policies implementing [`EvictionPolicy`](crate::traits::EvictionPolicy).
//!
//! | Policy         | Eviction basis                    | Keeps history      |
//! |----------------|-----------------------------------|--------------------|
//! | [`ArcPolicy`]  | adaptive recency/frequency split  | keys and values    |
//! | [`S3FifoPolicy`] | probationary FIFO + main FIFO   | keys only          |
//! | [`LruPolicy`]  | last access                       | no                 |
//! | [`LfuPolicy`]  | access count, then age            | no                 |

pub mod arc;
pub mod lfu;
pub mod lru;
pub mod s3_fifo;

pub use arc::ArcPolicy;
pub use lfu::LfuPolicy;
pub use lru::LruPolicy;
pub use s3_fifo::S3FifoPolicy;
