//! Error types for furrballs.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: a [`FurrConfig`](crate::config::FurrConfig) or policy
//!   name failed validation.
//! - [`InvariantError`]: an internal consistency check failed (returned by
//!   `check_invariants` helpers, used in tests and debug builds).
//! - [`StoreError`]: the backing store could not read, write or decode a page.
//! - [`SetupError`]: a cache could not be created. `FurrBall::create` logs it
//!   and returns `None`; `FurrBall::try_create` hands it to the caller.
//!
//! ## Example Usage
//!
//! ```
//! use furrballs::config::FurrConfig;
//! use furrballs::error::ConfigError;
//!
//! let bad = FurrConfig::default().with_resize_threshold(0);
//! let err: ConfigError = bad.validate().unwrap_err();
//! assert!(err.to_string().contains("resize_threshold"));
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::store::PageId;

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvariantError(String);

impl InvariantError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when configuration parameters are invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failure reported by a [`BackingStore`](crate::store::BackingStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("page {page:#x} could not be decoded: {reason}")]
    Codec { page: PageId, reason: String },

    #[error("store at {} is not available: {reason}", path.display())]
    Unavailable { path: PathBuf, reason: String },
}

// ---------------------------------------------------------------------------
// SetupError
// ---------------------------------------------------------------------------

/// Reason a cache could not be created.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open backing store: {0}")]
    StoreOpen(#[source] StoreError),

    #[error("insufficient memory for a single page of {page_size} bytes ({available} available)")]
    InsufficientMemory { page_size: usize, available: usize },

    #[error("failed to allocate a slab of {bytes} bytes")]
    SlabAllocation { bytes: usize },

    #[error("failed to start background worker: {0}")]
    Worker(#[source] io::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
