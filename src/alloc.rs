//! Raw page-aligned memory for the page pool.
//!
//! The pool never touches the global allocator directly; it asks a
//! [`PageAllocator`] for zeroed, page-aligned slabs and for an estimate of the
//! memory still available. [`SystemAllocator`] is the production
//! implementation; [`BudgetAllocator`] caps the bytes it will hand out, which
//! makes memory pressure reproducible.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use sysinfo::System;

/// Alignment of every slab handed to the pool.
pub const SLAB_ALIGN: usize = 4096;

/// Source of zeroed, [`SLAB_ALIGN`]-aligned memory.
pub trait PageAllocator: Send + Sync {
    /// Allocates `size` zeroed bytes, or `None` if the request cannot be met.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Releases memory returned by [`allocate`](Self::allocate) or
    /// [`allocate_local`](Self::allocate_local).
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator with the same `size`, and must not
    /// be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize);

    /// Bytes the allocator believes it can still provide.
    fn available_memory(&self) -> usize;

    /// Allocates on the memory node of the calling thread.
    ///
    /// Allocators without node awareness fall back to [`allocate`](Self::allocate).
    fn allocate_local(&self, size: usize) -> Option<NonNull<u8>> {
        self.allocate(size)
    }
}

fn slab_layout(size: usize) -> Option<Layout> {
    if size == 0 {
        return None;
    }
    Layout::from_size_align(size, SLAB_ALIGN).ok()
}

/// Global-allocator backed slabs; available memory comes from the OS.
pub struct SystemAllocator {
    system: Mutex<System>,
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemAllocator").finish_non_exhaustive()
    }
}

impl PageAllocator for SystemAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let layout = slab_layout(size)?;
        // SAFETY: `layout` has a non-zero size.
        NonNull::new(unsafe { alloc_zeroed(layout) })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        if let Some(layout) = slab_layout(size) {
            // SAFETY: caller guarantees `ptr` came from `allocate(size)`,
            // which used this exact layout.
            unsafe { dealloc(ptr.as_ptr(), layout) };
        }
    }

    fn available_memory(&self) -> usize {
        let mut system = self.system.lock();
        system.refresh_memory();
        usize::try_from(system.available_memory()).unwrap_or(usize::MAX)
    }
}

/// Allocator that refuses to exceed a fixed byte budget.
///
/// ```
/// use furrballs::alloc::{BudgetAllocator, PageAllocator};
///
/// let allocator = BudgetAllocator::new(8192);
/// let slab = allocator.allocate(8192).unwrap();
/// assert_eq!(allocator.available_memory(), 0);
/// assert!(allocator.allocate(4096).is_none());
/// unsafe { allocator.free(slab, 8192) };
/// assert_eq!(allocator.available_memory(), 8192);
/// ```
#[derive(Debug)]
pub struct BudgetAllocator {
    budget: usize,
    in_use: AtomicUsize,
    inner: SystemAllocator,
}

impl BudgetAllocator {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            in_use: AtomicUsize::new(0),
            inner: SystemAllocator::new(),
        }
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

impl PageAllocator for BudgetAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|&total| total <= self.budget)
            })
            .ok()?;
        let ptr = self.inner.allocate(size);
        if ptr.is_none() {
            self.in_use.fetch_sub(size, Ordering::AcqRel);
        }
        ptr
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: forwarded caller guarantee.
        unsafe { self.inner.free(ptr, size) };
        self.in_use.fetch_sub(size, Ordering::AcqRel);
    }

    fn available_memory(&self) -> usize {
        self.budget.saturating_sub(self.in_use())
    }
}
