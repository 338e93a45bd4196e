//! Backing store contracts.
//!
//! The cache only ever moves whole pages in and out of a store, keyed by
//! [`PageId`]. How the bytes are laid out, compressed or made durable is the
//! store's business; [`Codec`] is the seam for compression.

use std::path::Path;

use crate::error::StoreError;

/// Address of the first byte of a page (`address & !(page_size - 1)`).
pub type PageId = u64;

/// Durable page storage behind a cache.
pub trait BackingStore: Send + Sync + Sized {
    /// Open the store at `path`, discarding existing pages if `overwrite`.
    fn open(path: &Path, overwrite: bool) -> Result<Self, StoreError>;

    /// Fetch a page. `Ok(None)` means the store has never seen it.
    fn get(&self, page: PageId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a page, replacing any previous contents.
    fn put(&self, page: PageId, data: &[u8]) -> Result<(), StoreError>;

    /// Check if a page exists.
    fn contains(&self, page: PageId) -> bool;

    /// Make every completed `put` durable.
    fn flush(&self) -> Result<(), StoreError>;

    /// Number of stored pages.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Byte transform applied to pages on their way to and from disk.
pub trait Codec: Send + Sync {
    fn encode(&self, data: &[u8]) -> Vec<u8>;

    fn decode(&self, page: PageId, data: &[u8]) -> Result<Vec<u8>, StoreError>;
}

/// Identity codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Codec for Passthrough {
    fn encode(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn decode(&self, _page: PageId, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        Ok(data.to_vec())
    }
}

/// Run-length codec: `(count, byte)` pairs, count in `1..=255`.
///
/// Pages are mostly zero-filled, which this handles well.
///
/// ```
/// use furrballs::store::{Codec, RunLength};
///
/// let page = [0u8; 4096];
/// let encoded = RunLength.encode(&page);
/// assert_eq!(encoded.len(), 34);
/// assert_eq!(RunLength.decode(0, &encoded).unwrap(), page.to_vec());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLength;

impl Codec for RunLength {
    fn encode(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut bytes = data.iter().copied().peekable();
        while let Some(byte) = bytes.next() {
            let mut run = 1u8;
            while run < u8::MAX && bytes.next_if_eq(&byte).is_some() {
                run += 1;
            }
            out.extend_from_slice(&[run, byte]);
        }
        out
    }

    fn decode(&self, page: PageId, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        if data.len() % 2 != 0 {
            return Err(StoreError::Codec {
                page,
                reason: "truncated run".into(),
            });
        }
        let mut out = Vec::with_capacity(data.len());
        for pair in data.chunks_exact(2) {
            if pair[0] == 0 {
                return Err(StoreError::Codec {
                    page,
                    reason: "zero-length run".into(),
                });
            }
            out.extend(std::iter::repeat_n(pair[1], usize::from(pair[0])));
        }
        Ok(out)
    }
}
