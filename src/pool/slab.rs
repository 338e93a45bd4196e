//! Contiguous runs of frame memory.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::alloc::PageAllocator;

/// One allocation from a [`PageAllocator`], released on drop.
pub struct Slab {
    ptr: NonNull<u8>,
    len: usize,
    allocator: Arc<dyn PageAllocator>,
}

// SAFETY: the slab exclusively owns its allocation; access to the bytes is
// coordinated by the pool.
unsafe impl Send for Slab {}
// SAFETY: see above.
unsafe impl Sync for Slab {}

impl Slab {
    /// Allocates `len` zeroed bytes, node-local when `numa` is set.
    pub fn allocate(allocator: &Arc<dyn PageAllocator>, len: usize, numa: bool) -> Option<Self> {
        let ptr = if numa {
            allocator.allocate_local(len)?
        } else {
            allocator.allocate(len)?
        };
        Some(Self {
            ptr,
            len,
            allocator: Arc::clone(allocator),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start of the `index`-th frame of `frame_size` bytes.
    pub fn frame_ptr(&self, index: usize, frame_size: usize) -> Option<NonNull<u8>> {
        let offset = index.checked_mul(frame_size)?;
        if offset.checked_add(frame_size)? > self.len {
            return None;
        }
        // SAFETY: `offset + frame_size <= len`, so the result stays inside
        // the allocation and is non-null.
        Some(unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) })
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from this allocator with exactly `len` bytes and
        // no frame outlives the slab.
        unsafe { self.allocator.free(self.ptr, self.len) };
    }
}

impl std::fmt::Debug for Slab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slab")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
