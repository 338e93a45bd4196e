//! Frame descriptors.
//!
//! A [`Page`] describes one fixed-size frame carved out of a slab. The frame
//! memory belongs to the slab; the descriptor only records where it is and
//! what state it is in. Frames are reset, never freed, when their page is
//! evicted, so the same memory serves many pages over the pool's lifetime.
//!
//! Byte access goes through `&self`. Plain frames rely on the caller to
//! serialize access; lockable frames take their own mutex.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Descriptor of one frame of pool memory.
pub struct Page {
    base: NonNull<u8>,
    size: usize,
    index: usize,
    dirty: AtomicBool,
    accessed: AtomicBool,
    lock: Option<Arc<Mutex<()>>>,
}

// SAFETY: `base` points into a slab owned by the pool that owns this
// descriptor; concurrent byte access is serialized by the frame mutex or by
// the cache's access gate.
unsafe impl Send for Page {}
// SAFETY: see above.
unsafe impl Sync for Page {}

impl Page {
    pub(crate) fn new(base: NonNull<u8>, size: usize, index: usize, lockable: bool) -> Self {
        Self {
            base,
            size,
            index,
            dirty: AtomicBool::new(false),
            accessed: AtomicBool::new(false),
            lock: lockable.then(|| Arc::new(Mutex::new(()))),
        }
    }

    /// Position of the frame in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Whether the resident page was hit since it was loaded.
    pub fn is_accessed(&self) -> bool {
        self.accessed.load(Ordering::Acquire)
    }

    /// Whether byte access takes a per-frame mutex.
    pub fn is_lockable(&self) -> bool {
        self.lock.is_some()
    }

    pub(crate) fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub(crate) fn mark_accessed(&self) {
        self.accessed.store(true, Ordering::Release);
    }

    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Clears per-page state before the frame is handed to another page.
    pub(crate) fn reset(&self) {
        self.dirty.store(false, Ordering::Release);
        self.accessed.store(false, Ordering::Release);
    }

    /// Points the descriptor at relocated memory.
    pub(crate) fn rebase(&mut self, base: NonNull<u8>, index: usize) {
        self.base = base;
        self.index = index;
    }

    pub(crate) fn lock_handle(&self) -> Option<&Arc<Mutex<()>>> {
        self.lock.as_ref()
    }

    /// Copies bytes out of the frame starting at `offset`.
    pub(crate) fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let _guard = self.lock.as_ref().map(|lock| lock.lock());
        self.read_unlocked(offset, buf)
    }

    /// Copies `data` into the frame at `offset` and marks it dirty.
    pub(crate) fn write_at(&self, offset: usize, data: &[u8]) -> usize {
        let _guard = self.lock.as_ref().map(|lock| lock.lock());
        self.write_unlocked(offset, data)
    }

    /// [`read_at`](Self::read_at) for callers already holding the frame mutex.
    pub(crate) fn read_unlocked(&self, offset: usize, buf: &mut [u8]) -> usize {
        let len = self.clamp(offset, buf.len());
        if len > 0 {
            // SAFETY: `offset + len <= size`, the frame is live, and `buf`
            // cannot alias pool memory.
            unsafe {
                std::ptr::copy_nonoverlapping(self.base.as_ptr().add(offset), buf.as_mut_ptr(), len)
            };
        }
        len
    }

    /// [`write_at`](Self::write_at) for callers already holding the frame mutex.
    pub(crate) fn write_unlocked(&self, offset: usize, data: &[u8]) -> usize {
        let len = self.clamp(offset, data.len());
        if len > 0 {
            // SAFETY: `offset + len <= size` and access is serialized by the
            // caller.
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), self.base.as_ptr().add(offset), len)
            };
            self.dirty.store(true, Ordering::Release);
        }
        len
    }

    /// Replaces the frame contents with `data`, zero-filling the tail.
    pub(crate) fn fill(&self, data: &[u8]) {
        let len = data.len().min(self.size);
        // SAFETY: both ranges lie within the frame, which the pool holds
        // exclusively while filling.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.base.as_ptr(), len);
            std::ptr::write_bytes(self.base.as_ptr().add(len), 0, self.size - len);
        }
    }

    /// Copies the whole frame.
    pub(crate) fn snapshot(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size];
        self.read_at(0, &mut bytes);
        bytes
    }

    fn clamp(&self, offset: usize, len: usize) -> usize {
        self.size.saturating_sub(offset).min(len)
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("size", &self.size)
            .field("dirty", &self.is_dirty())
            .field("accessed", &self.is_accessed())
            .field("lockable", &self.is_lockable())
            .finish()
    }
}
