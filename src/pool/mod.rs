//! Adaptive memory pool.
//!
//! The pool owns every byte of page memory. Frames are carved from slabs
//! obtained through a [`PageAllocator`], handed to pages on load and reset on
//! eviction. Callers never see frame addresses: all access goes through
//! [`VirtualPointer`]s resolved by the pool's [`IndirectionTable`].
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────── PagePool ────────────────────────┐
//!   │  amp: Mutex<AmpState>        (growth counters)           │
//!   │  state: Arc<RwLock<PoolState>>                            │
//!   │    ├── slabs   [ Slab 0 ][ Slab 1 ] ...                   │
//!   │    ├── frames  [ Page0 | Page1 | Page2 | ... ]            │
//!   │    ├── free    [ 2, 5, ... ]                              │
//!   │    └── table   vptr ─► Frame(i) | External | Detached     │
//!   └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking
//!
//! Byte access takes the state read lock; lockable frames additionally take
//! their frame mutex. Attaching, detaching, expansion and defragmentation
//! take the write lock, so they never overlap byte access.
//!
//! ## Growth
//!
//! Evicting a page that was hit while resident is a *hot eviction*. See
//! [`AmpState`] for how hot evictions turn into new slabs. Growth stops at
//! `capacity_limit / page_size` frames.

pub mod amp;
pub mod indirection;
pub mod page;
pub mod slab;

use std::sync::Arc;

use parking_lot::lock_api::{ArcMutexGuard, ArcRwLockReadGuard};
use parking_lot::{Mutex, RawMutex, RawRwLock, RwLock};
use tracing::{error, info, warn};

use crate::alloc::PageAllocator;
use crate::config::FurrConfig;
use crate::error::SetupError;
use crate::store::PageId;

pub use amp::AmpState;
pub use indirection::{IndirectionTable, Location, VirtualPointer};
pub use page::Page;
pub use slab::Slab;

/// Whether the pool is serving requests or relocating frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    Serving,
    Compacting,
}

#[derive(Debug, Clone, Copy)]
struct FrameOwner {
    page: PageId,
    vptr: VirtualPointer,
}

#[derive(Debug)]
struct Frame {
    page: Page,
    owner: Option<FrameOwner>,
}

#[derive(Debug)]
struct PoolState {
    slabs: Vec<Slab>,
    frames: Vec<Frame>,
    free: Vec<usize>,
    table: IndirectionTable,
    external_bytes: usize,
}

/// A page that just left its frame.
#[derive(Debug)]
pub struct DetachedPage {
    pub page: PageId,
    /// Frame contents, present only if the page was modified.
    pub dirty: Option<Vec<u8>>,
    /// Whether the page was hit while resident.
    pub accessed: bool,
}

/// Slab-backed frame pool with an indirection table.
pub struct PagePool {
    state: Arc<RwLock<PoolState>>,
    phase: Mutex<PoolPhase>,
    amp: Mutex<AmpState>,
    allocator: Arc<dyn PageAllocator>,
    page_size: usize,
    max_pages: usize,
    lockable: bool,
    numa: bool,
}

impl PagePool {
    /// Allocates the initial slab.
    ///
    /// The initial page count is reduced until it fits in the memory the
    /// allocator reports as available.
    pub fn new(config: &FurrConfig, allocator: Arc<dyn PageAllocator>) -> Result<Self, SetupError> {
        let config = config.resolved();
        let page_size = config.page_size;
        let max_pages = config.max_pages().max(1);
        let available = allocator.available_memory();
        let pages = config
            .initial_page_count
            .max(1)
            .min(max_pages)
            .min(available / page_size);
        if pages == 0 {
            error!(page_size, available, "not enough memory for a single page");
            return Err(SetupError::InsufficientMemory {
                page_size,
                available,
            });
        }

        let pool = Self {
            state: Arc::new(RwLock::new(PoolState {
                slabs: Vec::new(),
                frames: Vec::with_capacity(pages),
                free: Vec::with_capacity(pages),
                table: IndirectionTable::new(),
                external_bytes: 0,
            })),
            phase: Mutex::new(PoolPhase::Serving),
            amp: Mutex::new(AmpState::new(config.resize_threshold)),
            allocator,
            page_size,
            max_pages,
            lockable: config.lockable_pages,
            numa: config.enable_numa,
        };
        if !pool.add_slab(&mut pool.state.write(), pages) {
            let bytes = pages * page_size;
            warn!(bytes, "initial slab allocation failed");
            return Err(SetupError::SlabAllocation { bytes });
        }
        Ok(pool)
    }

    fn add_slab(&self, state: &mut PoolState, pages: usize) -> bool {
        let Some(slab) = Slab::allocate(&self.allocator, pages * self.page_size, self.numa) else {
            return false;
        };
        let start = state.frames.len();
        for base in (0..pages).filter_map(|i| slab.frame_ptr(i, self.page_size)) {
            let index = state.frames.len();
            state.frames.push(Frame {
                page: Page::new(base, self.page_size, index, self.lockable),
                owner: None,
            });
        }
        state.free.extend((start..state.frames.len()).rev());
        state.slabs.push(slab);
        true
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Frames the pool may grow to.
    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Frames currently carved, resident or free.
    pub fn page_count(&self) -> usize {
        self.state.read().frames.len()
    }

    pub fn resident_count(&self) -> usize {
        let state = self.state.read();
        state.frames.len() - state.free.len()
    }

    pub fn free_count(&self) -> usize {
        self.state.read().free.len()
    }

    pub fn slab_count(&self) -> usize {
        self.state.read().slabs.len()
    }

    /// Bytes held in slabs.
    pub fn preallocated_bytes(&self) -> usize {
        self.state.read().slabs.iter().map(Slab::len).sum()
    }

    /// Bytes of shared caller memory registered through
    /// [`register_external`](Self::register_external).
    pub fn external_bytes(&self) -> usize {
        self.state.read().external_bytes
    }

    /// Readable without the state lock, so it reports `Compacting` while a
    /// defragmentation is holding everyone else out.
    pub fn phase(&self) -> PoolPhase {
        *self.phase.lock()
    }

    pub fn amp(&self) -> AmpState {
        *self.amp.lock()
    }

    /// Ids of resident pages, ascending.
    pub fn resident_pages(&self) -> Vec<PageId> {
        let state = self.state.read();
        let mut pages: Vec<_> = state
            .frames
            .iter()
            .filter_map(|frame| frame.owner.map(|owner| owner.page))
            .collect();
        pages.sort_unstable();
        pages
    }

    /// Issues a handle for a page that is known but not yet resident.
    pub fn register_detached(&self) -> VirtualPointer {
        self.state.write().table.register(Location::Detached, self.lockable)
    }

    /// Issues a handle for caller memory. The bytes are shared, not copied.
    pub fn register_external(&self, data: Arc<[u8]>) -> VirtualPointer {
        let mut state = self.state.write();
        state.external_bytes += data.len();
        state.table.register(Location::External(data), false)
    }

    /// Unregisters a handle from [`register_external`](Self::register_external).
    ///
    /// Page handles, resident or not, are refused.
    pub fn release_external(&self, vptr: VirtualPointer) -> bool {
        let mut state = self.state.write();
        if !matches!(state.table.resolve(vptr), Some(Location::External(_))) {
            return false;
        }
        match state.table.release(vptr) {
            Some(Location::External(data)) => {
                state.external_bytes -= data.len();
                true
            }
            _ => false,
        }
    }

    pub fn is_resident(&self, vptr: VirtualPointer) -> bool {
        self.frame_index(vptr).is_some()
    }

    /// Frame currently backing `vptr`.
    pub fn frame_index(&self, vptr: VirtualPointer) -> Option<usize> {
        match self.state.read().table.resolve(vptr)? {
            Location::Frame(index) => Some(*index),
            _ => None,
        }
    }

    pub fn is_known(&self, vptr: VirtualPointer) -> bool {
        self.state.read().table.contains(vptr)
    }

    /// Loads `page` into a free frame behind a detached handle.
    ///
    /// `data` is copied in and the rest of the frame is zeroed. Returns
    /// `false` if no frame is free or the handle is not detached; a handle
    /// that is already resident is left untouched.
    pub fn attach(&self, vptr: VirtualPointer, page: PageId, data: &[u8]) -> bool {
        let mut guard = self.state.write();
        let state = &mut *guard;
        match state.table.resolve(vptr) {
            Some(Location::Detached) => {}
            Some(Location::Frame(_)) => return true,
            _ => return false,
        }
        let Some(index) = state.free.pop() else {
            return false;
        };
        let frame = &mut state.frames[index];
        frame.page.reset();
        frame.page.fill(data);
        frame.owner = Some(FrameOwner { page, vptr });
        state.table.redirect(vptr, Location::Frame(index));
        true
    }

    /// Takes the page behind `vptr` out of its frame, leaving the handle
    /// detached.
    pub fn detach(&self, vptr: VirtualPointer) -> Option<DetachedPage> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let index = match state.table.resolve(vptr)? {
            Location::Frame(index) => *index,
            _ => return None,
        };
        let frame = &mut state.frames[index];
        let owner = frame.owner.take()?;
        let dirty = frame.page.take_dirty().then(|| frame.page.snapshot());
        let accessed = frame.page.is_accessed();
        frame.page.reset();
        state.free.push(index);
        state.table.redirect(vptr, Location::Detached);
        Some(DetachedPage {
            page: owner.page,
            dirty,
            accessed,
        })
    }

    /// Flags the resident page behind `vptr` as hit.
    pub fn mark_accessed(&self, vptr: VirtualPointer) {
        let state = self.state.read();
        if let Some(Location::Frame(index)) = state.table.resolve(vptr) {
            state.frames[*index].page.mark_accessed();
        }
    }

    /// Copies bytes from the data behind `vptr` into `buf`.
    ///
    /// Returns `None` if the handle does not resolve to resident or external
    /// data. Copies are clamped to the end of the data.
    pub fn read(&self, vptr: VirtualPointer, offset: usize, buf: &mut [u8]) -> Option<usize> {
        let state = self.state.read();
        match state.table.resolve(vptr)? {
            Location::Frame(index) => Some(state.frames[*index].page.read_at(offset, buf)),
            Location::External(data) => {
                let len = data.len().saturating_sub(offset).min(buf.len());
                if len > 0 {
                    buf[..len].copy_from_slice(&data[offset..offset + len]);
                }
                Some(len)
            }
            Location::Detached => None,
        }
    }

    /// Copies `data` into the resident page behind `vptr`, marking it dirty.
    ///
    /// External data is read-only and yields `None`.
    pub fn write(&self, vptr: VirtualPointer, offset: usize, data: &[u8]) -> Option<usize> {
        let state = self.state.read();
        match state.table.resolve(vptr)? {
            Location::Frame(index) => Some(state.frames[*index].page.write_at(offset, data)),
            Location::External(_) | Location::Detached => None,
        }
    }

    /// Snapshots every dirty resident page and clears its dirty flag.
    pub fn take_dirty_pages(&self) -> Vec<(PageId, Vec<u8>)> {
        let state = self.state.read();
        state
            .frames
            .iter()
            .filter_map(|frame| {
                let owner = frame.owner?;
                frame
                    .page
                    .take_dirty()
                    .then(|| (owner.page, frame.page.snapshot()))
            })
            .collect()
    }

    /// Counts a hot eviction and expands the pool when the counters say so.
    ///
    /// Returns the number of frames added.
    pub fn record_hot_eviction(&self) -> usize {
        let mut amp = self.amp.lock();
        let Some(pages) = amp.record_hot_eviction() else {
            return 0;
        };
        let added = self.expand(pages);
        if added > 0 {
            amp.record_expansion();
        }
        added
    }

    /// Adds up to `pages` frames in one new slab, bounded by
    /// [`max_pages`](Self::max_pages). Returns the number added.
    pub fn expand(&self, pages: usize) -> usize {
        let mut state = self.state.write();
        let pages = pages.min(self.max_pages.saturating_sub(state.frames.len()));
        if pages == 0 {
            return 0;
        }
        if !self.add_slab(&mut state, pages) {
            warn!(
                pages,
                page_size = self.page_size,
                "pool expansion skipped, slab allocation failed"
            );
            return 0;
        }
        info!(added = pages, total = state.frames.len(), "page pool expanded");
        pages
    }

    /// Compacts every frame into one new slab, resident pages first.
    ///
    /// Handles keep resolving to the same data. Returns the number of
    /// resident pages that changed frame; if the new slab cannot be
    /// allocated nothing moves.
    pub fn defragment(&self) -> usize {
        let mut state = self.state.write();
        *self.phase.lock() = PoolPhase::Compacting;
        let relocated = self.compact(&mut state);
        *self.phase.lock() = PoolPhase::Serving;
        relocated
    }

    fn compact(&self, state: &mut PoolState) -> usize {
        let total = state.frames.len();
        if total == 0 {
            return 0;
        }
        let Some(slab) = Slab::allocate(&self.allocator, total * self.page_size, self.numa) else {
            warn!(frames = total, "defragmentation skipped, slab allocation failed");
            return 0;
        };

        let (resident, free): (Vec<Frame>, Vec<Frame>) = std::mem::take(&mut state.frames)
            .into_iter()
            .partition(|frame| frame.owner.is_some());
        let resident_count = resident.len();
        let targets = (0..total).filter_map(|i| slab.frame_ptr(i, self.page_size));

        let mut relocated = 0;
        let frames = resident.into_iter().chain(free).zip(targets);
        for (index, (mut frame, base)) in frames.enumerate() {
            if let Some(owner) = frame.owner {
                // SAFETY: both frames are `page_size` bytes, belong to
                // different slabs, and the write lock excludes all access.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        frame.page.base().as_ptr(),
                        base.as_ptr(),
                        self.page_size,
                    );
                }
                if frame.page.index() != index {
                    relocated += 1;
                }
                state.table.redirect(owner.vptr, Location::Frame(index));
            }
            frame.page.rebase(base, index);
            state.frames.push(frame);
        }
        state.free = (resident_count..state.frames.len()).rev().collect();
        state.slabs = vec![slab];
        info!(relocated, frames = total, "page pool defragmented");
        relocated
    }

    /// Locks the resident page behind `vptr` for exclusive byte access.
    ///
    /// Lockable frames are locked with their own mutex. Plain frames need
    /// the caller's `gate` guard, which becomes the guard's lock.
    pub fn lock_frame(
        &self,
        vptr: VirtualPointer,
        gate: Option<ArcMutexGuard<RawMutex, ()>>,
    ) -> Option<PageLockGuard> {
        let state = self.state.read_arc();
        let index = match state.table.resolve(vptr)? {
            Location::Frame(index) => *index,
            _ => return None,
        };
        let lock = match gate {
            Some(gate) => gate,
            None => state.frames[index].page.lock_handle()?.lock_arc(),
        };
        Some(PageLockGuard {
            _lock: lock,
            state,
            index,
            vptr,
        })
    }
}

impl std::fmt::Debug for PagePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("PagePool")
            .field("page_size", &self.page_size)
            .field("frames", &state.frames.len())
            .field("free", &state.free.len())
            .field("slabs", &state.slabs.len())
            .field("phase", &*self.phase.lock())
            .finish()
    }
}

/// Exclusive access to one resident page.
///
/// The guard pins the pool: while it is alive no page can be loaded,
/// evicted or relocated. Do not call back into the cache that issued it
/// from the same thread, and keep it short-lived.
pub struct PageLockGuard {
    _lock: ArcMutexGuard<RawMutex, ()>,
    state: ArcRwLockReadGuard<RawRwLock, PoolState>,
    index: usize,
    vptr: VirtualPointer,
}

impl PageLockGuard {
    pub fn vptr(&self) -> VirtualPointer {
        self.vptr
    }

    pub fn page_id(&self) -> Option<PageId> {
        self.state.frames[self.index].owner.map(|owner| owner.page)
    }

    pub fn page_size(&self) -> usize {
        self.page().size()
    }

    pub fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        self.page().read_unlocked(offset, buf)
    }

    pub fn write(&mut self, offset: usize, data: &[u8]) -> usize {
        self.page().write_unlocked(offset, data)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.page_size()];
        self.read(0, &mut bytes);
        bytes
    }

    fn page(&self) -> &Page {
        &self.state.frames[self.index].page
    }
}

impl std::fmt::Debug for PageLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageLockGuard")
            .field("vptr", &self.vptr)
            .field("frame", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;

    use super::*;
    use crate::alloc::{BudgetAllocator, SystemAllocator};

    fn pool(config: FurrConfig) -> PagePool {
        PagePool::new(&config, Arc::new(SystemAllocator::new())).unwrap()
    }

    fn small_config() -> FurrConfig {
        FurrConfig::default()
            .with_page_size(64)
            .with_initial_page_count(2)
            .with_capacity_limit(64 * 8)
            .with_resize_threshold(2)
    }

    fn load(pool: &PagePool, page: PageId, data: &[u8]) -> VirtualPointer {
        let vptr = pool.register_detached();
        assert!(pool.attach(vptr, page, data));
        vptr
    }

    #[test]
    fn new_pool_carves_initial_frames() {
        let pool = pool(small_config());
        assert_eq!(pool.page_count(), 2);
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.preallocated_bytes(), 128);
        assert_eq!(pool.max_pages(), 8);
        assert_eq!(pool.phase(), PoolPhase::Serving);
    }

    #[test]
    fn new_pool_clamps_to_available_memory() {
        let config = small_config().with_initial_page_count(8);
        let pool = PagePool::new(&config, Arc::new(BudgetAllocator::new(64 * 3))).unwrap();
        assert_eq!(pool.page_count(), 3);
    }

    #[test]
    fn new_pool_fails_without_memory_for_one_page() {
        let err = PagePool::new(&small_config(), Arc::new(BudgetAllocator::new(10))).unwrap_err();
        assert!(matches!(
            err,
            SetupError::InsufficientMemory {
                page_size: 64,
                available: 10
            }
        ));
    }

    #[test]
    fn attach_read_write_detach() {
        let pool = pool(small_config());
        let vptr = load(&pool, 0x40, b"hello");
        assert_eq!(pool.resident_count(), 1);

        let mut buf = [0u8; 8];
        assert_eq!(pool.read(vptr, 0, &mut buf), Some(8));
        assert_eq!(&buf, b"hello\0\0\0");
        assert_eq!(pool.write(vptr, 60, b"abcdef"), Some(4));

        let evicted = pool.detach(vptr).unwrap();
        assert_eq!(evicted.page, 0x40);
        assert!(!evicted.accessed);
        let dirty = evicted.dirty.unwrap();
        assert_eq!(&dirty[..5], b"hello");
        assert_eq!(&dirty[60..], b"abcd");

        assert!(!pool.is_resident(vptr));
        assert!(pool.is_known(vptr));
        assert_eq!(pool.read(vptr, 0, &mut buf), None);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn clean_pages_detach_without_data() {
        let pool = pool(small_config());
        let vptr = load(&pool, 0, b"x");
        pool.mark_accessed(vptr);
        let evicted = pool.detach(vptr).unwrap();
        assert!(evicted.dirty.is_none());
        assert!(evicted.accessed);
        assert!(pool.detach(vptr).is_none());
    }

    #[test]
    fn attach_fails_when_no_frame_is_free() {
        let pool = pool(small_config());
        load(&pool, 0, b"a");
        load(&pool, 64, b"b");
        let vptr = pool.register_detached();
        assert!(!pool.attach(vptr, 128, b"c"));
        assert!(!pool.attach(VirtualPointer::NULL, 128, b"c"));
    }

    #[test]
    fn external_data_is_shared_and_read_only() {
        let pool = pool(small_config());
        let data: Arc<[u8]> = Arc::from(vec![7u8; 200]);
        let vptr = pool.register_external(Arc::clone(&data));
        assert_eq!(Arc::strong_count(&data), 2);
        assert_eq!(pool.external_bytes(), 200);

        let mut buf = [0u8; 16];
        assert_eq!(pool.read(vptr, 190, &mut buf), Some(10));
        assert_eq!(pool.read(vptr, 500, &mut buf), Some(0));
        assert_eq!(pool.write(vptr, 0, b"no"), None);

        assert!(pool.release_external(vptr));
        assert_eq!(pool.external_bytes(), 0);
        assert_eq!(Arc::strong_count(&data), 1);
        assert!(!pool.release_external(vptr));
    }

    #[test]
    fn take_dirty_pages_clears_flags() {
        let pool = pool(small_config());
        let a = load(&pool, 0, b"a");
        load(&pool, 64, b"b");
        pool.write(a, 1, b"z");

        let dirty = pool.take_dirty_pages();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].0, 0);
        assert_eq!(&dirty[0].1[..2], b"az");
        assert!(pool.take_dirty_pages().is_empty());
    }

    #[test]
    fn hot_evictions_expand_pool() {
        let pool = pool(small_config());
        assert_eq!(pool.record_hot_eviction(), 0);
        assert_eq!(pool.record_hot_eviction(), 1);
        assert_eq!(pool.page_count(), 3);
        assert_eq!(pool.slab_count(), 2);
        assert_eq!(pool.amp().expansion_events, 1);

        pool.record_hot_eviction();
        assert_eq!(pool.record_hot_eviction(), 1);
        let amp = pool.amp();
        assert_eq!(amp.expansion_multiplier, 2);
        assert_eq!(amp.expansion_events, 0);

        pool.record_hot_eviction();
        assert_eq!(pool.record_hot_eviction(), 2);
        assert_eq!(pool.page_count(), 6);
    }

    #[test]
    fn expansion_stops_at_capacity_limit() {
        let pool = pool(small_config());
        assert_eq!(pool.expand(4), 4);
        assert_eq!(pool.expand(4), 2);
        assert_eq!(pool.expand(1), 0);
        assert_eq!(pool.page_count(), 8);
    }

    #[test]
    fn failed_expansion_is_skipped() {
        let config = small_config();
        let pool = PagePool::new(&config, Arc::new(BudgetAllocator::new(64 * 2))).unwrap();
        assert_eq!(pool.expand(2), 0);
        assert_eq!(pool.page_count(), 2);
    }

    #[test]
    fn defragment_packs_resident_pages_and_keeps_handles() {
        let pool = pool(small_config());
        pool.expand(2);
        let handles: Vec<_> = (0..4u64)
            .map(|i| load(&pool, i * 64, &[i as u8 + 1; 64]))
            .collect();
        // Frames are handed out 2, 3, 0, 1.
        assert_eq!(pool.frame_index(handles[0]), Some(2));
        pool.write(handles[1], 0, b"dirty");
        pool.detach(handles[2]);
        pool.detach(handles[3]);

        assert_eq!(pool.defragment(), 2);
        assert_eq!(pool.frame_index(handles[0]), Some(0));
        assert_eq!(pool.frame_index(handles[1]), Some(1));
        assert_eq!(pool.slab_count(), 1);
        assert_eq!(pool.page_count(), 4);
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.phase(), PoolPhase::Serving);

        let mut buf = [0u8; 64];
        pool.read(handles[0], 0, &mut buf);
        assert_eq!(buf, [1u8; 64]);
        pool.read(handles[1], 0, &mut buf);
        assert_eq!(&buf[..5], b"dirty");
        assert_eq!(buf[5], 2);
        assert_eq!(pool.take_dirty_pages().len(), 1);

        assert!(pool.attach(handles[2], 128, b"back"));
        assert_eq!(pool.frame_index(handles[2]), Some(2));
        assert_eq!(pool.defragment(), 0);
    }

    #[test]
    fn release_external_refuses_page_handles() {
        let pool = pool(small_config());
        let resident = load(&pool, 0, b"keep");
        let detached = pool.register_detached();
        assert!(!pool.release_external(resident));
        assert!(!pool.release_external(detached));
        assert!(!pool.release_external(VirtualPointer::NULL));

        assert_eq!(pool.resident_pages(), vec![0]);
        let mut buf = [0u8; 4];
        assert_eq!(pool.read(resident, 0, &mut buf), Some(4));
        assert_eq!(&buf, b"keep");
        assert!(pool.is_known(detached));
    }

    /// Parks the first armed allocation until the test resumes it.
    struct ParkingAllocator {
        inner: SystemAllocator,
        armed: AtomicBool,
        parked: mpsc::SyncSender<()>,
        resume: Mutex<mpsc::Receiver<()>>,
    }

    impl PageAllocator for ParkingAllocator {
        fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.parked.send(()).ok()?;
                self.resume.lock().recv().ok()?;
            }
            self.inner.allocate(size)
        }

        unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
            unsafe { self.inner.free(ptr, size) }
        }

        fn available_memory(&self) -> usize {
            self.inner.available_memory()
        }
    }

    #[test]
    fn phase_is_compacting_while_defragment_runs() {
        let (parked_tx, parked_rx) = mpsc::sync_channel(1);
        let (resume_tx, resume_rx) = mpsc::channel();
        let allocator = Arc::new(ParkingAllocator {
            inner: SystemAllocator::new(),
            armed: AtomicBool::new(false),
            parked: parked_tx,
            resume: Mutex::new(resume_rx),
        });
        let shared: Arc<dyn PageAllocator> = allocator.clone();
        let pool = PagePool::new(&small_config(), shared).unwrap();
        let vptr = load(&pool, 0, b"moved");

        allocator.armed.store(true, Ordering::SeqCst);
        thread::scope(|scope| {
            let compacting = scope.spawn(|| pool.defragment());
            parked_rx.recv().unwrap();
            assert_eq!(pool.phase(), PoolPhase::Compacting);
            resume_tx.send(()).unwrap();
            compacting.join().unwrap();
        });

        assert_eq!(pool.phase(), PoolPhase::Serving);
        assert_eq!(pool.slab_count(), 1);
        let mut buf = [0u8; 5];
        pool.read(vptr, 0, &mut buf);
        assert_eq!(&buf, b"moved");
    }

    #[test]
    fn lock_frame_uses_frame_mutex_or_gate() {
        let lockable = pool(small_config().with_lockable_pages(true));
        let vptr = load(&lockable, 0, b"");
        assert!(vptr.is_lock_hinted());
        {
            let mut guard = lockable.lock_frame(vptr, None).unwrap();
            assert_eq!(guard.write(0, b"locked"), 6);
            assert_eq!(guard.page_id(), Some(0));
        }
        let mut buf = [0u8; 6];
        lockable.read(vptr, 0, &mut buf);
        assert_eq!(&buf, b"locked");

        let plain = pool(small_config());
        let vptr = load(&plain, 0, b"plain");
        assert!(plain.lock_frame(vptr, None).is_none());
        let gate = Arc::new(Mutex::new(()));
        let guard = plain.lock_frame(vptr, Some(gate.lock_arc())).unwrap();
        assert!(gate.try_lock().is_none());
        assert_eq!(&guard.to_vec()[..5], b"plain");
        drop(guard);
        assert!(gate.try_lock().is_some());
    }
}
