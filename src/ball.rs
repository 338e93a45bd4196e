//! The cache facade.
//!
//! A [`FurrBall`] binds an eviction policy to a [`PagePool`] and a
//! [`BackingStore`]. Callers address bytes; the cache floors every address to
//! its page, keeps a working set of pages resident, and writes modified pages
//! back when the policy evicts them.
//!
//! ## Request flow
//!
//! ```text
//!   get(address)
//!     │  page = address & !(page_size - 1)
//!     ▼
//!   policy ── hit ──► touch, mark accessed ──► PagePtr
//!     │
//!    miss
//!     │  in range? (stored, or within contingency of a known page)
//!     ├── no ──► None
//!     ▼
//!   fetch from store ──► policy.get / policy.add ──► pool.attach ──► PagePtr
//!                              │
//!                              └── eviction callback:
//!                                    pool.detach ─► hot? ─► AMP growth
//!                                                └► dirty? ─► write back
//! ```
//!
//! ## Handles
//!
//! Every page the cache has seen keeps one [`VirtualPointer`] for the life of
//! the cache. Eviction detaches it, a reload re-attaches it, and
//! defragmentation moves the frame behind it; the value itself never
//! changes. [`read`](FurrBall::read) and [`write`](FurrBall::write) reload an
//! evicted page transparently.
//!
//! ## Locking
//!
//! Locks are always taken in the order policy → gate → pool → frame. The
//! gate serializes byte access to plain pages; lockable pages use their own
//! frame mutex instead.
//!
//! ## Example
//!
//! ```
//! use furrballs::prelude::*;
//!
//! let config = FurrConfig::default()
//!     .with_page_size(4096)
//!     .with_initial_page_count(4);
//! let cache: FurrBall = FurrBall::create("scratch", config, true).unwrap();
//!
//! let ptr = cache.put(0x1010, b"hello").unwrap();
//! assert_eq!(ptr.page(), 0x1000);
//!
//! let ptr = cache.get(0x1010).unwrap();
//! let mut buf = [0u8; 5];
//! assert_eq!(cache.read(ptr, &mut buf), Some(5));
//! assert_eq!(&buf, b"hello");
//!
//! // Nothing is known near this address.
//! assert!(cache.get(0x9000_0000).is_none());
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use crate::alloc::{PageAllocator, SystemAllocator};
use crate::builder::{BoxedPolicy, PolicyBuilder};
use crate::config::FurrConfig;
use crate::error::{InvariantError, SetupError, StoreError};
use crate::metrics::{MetricsSnapshotProvider, Statistics, StatsSnapshot};
use crate::pool::{AmpState, PageLockGuard, PagePool, VirtualPointer};
use crate::store::{BackingStore, MemoryStore, PageId};
use crate::traits::EvictionPolicy;
use crate::worker::{Worker, WorkerHandle};

macro_rules! trace_op {
    ($config:expr, $($arg:tt)+) => {
        if $config.enable_logging {
            debug!($($arg)+);
        }
    };
}

/// Handle to a position inside a cached page.
///
/// Cheap to copy and valid for the life of the cache that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PagePtr {
    vptr: VirtualPointer,
    page: PageId,
    offset: usize,
}

impl PagePtr {
    pub fn vptr(&self) -> VirtualPointer {
        self.vptr
    }

    /// Id (first address) of the page.
    pub fn page(&self) -> PageId {
        self.page
    }

    /// Byte offset of the pointed-to address within the page.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The same page at a different offset.
    pub fn with_offset(self, offset: usize) -> Self {
        Self { offset, ..self }
    }
}

/// Caller hook run for every evicted page.
///
/// Receives the page id and, if the page was modified while resident, the
/// frame contents it left with.
pub type EvictionHook = Box<dyn FnMut(PageId, Option<&[u8]>) + Send>;

/// State reachable from the eviction callback and background jobs.
struct Shared<S> {
    config: FurrConfig,
    store: S,
    pool: PagePool,
    stats: Statistics,
    writer: Option<WorkerHandle>,
    pending_growth: AtomicUsize,
    pending_writes: Mutex<FxHashMap<PageId, Arc<[u8]>>>,
    on_evict: Mutex<Option<EvictionHook>>,
}

impl<S: BackingStore + 'static> Shared<S> {
    /// Eviction callback body: reclaim the frame, feed AMP, write back.
    fn evicted(self: &Arc<Self>, page: PageId, vptr: VirtualPointer) {
        Statistics::incr(&self.stats.evictions);
        let Some(detached) = self.pool.detach(vptr) else {
            return;
        };
        trace_op!(self.config, page, dirty = detached.dirty.is_some(), "page evicted");

        if detached.accessed {
            Statistics::incr(&self.stats.hot_evictions);
            let start = Instant::now();
            let added = self.pool.record_hot_eviction();
            if added > 0 {
                self.stats.page_expansion.record(start.elapsed());
                Statistics::incr(&self.stats.expansions);
                self.pending_growth.fetch_add(added, Ordering::AcqRel);
            }
        }

        if let Some(hook) = self.on_evict.lock().as_mut() {
            hook(page, detached.dirty.as_deref());
        }
        if self.config.is_volatile {
            return;
        }
        if let Some(data) = detached.dirty {
            self.write_back(page, data);
        }
    }

    /// Writes a page to the store, through the worker in burst mode.
    fn write_back(self: &Arc<Self>, page: PageId, data: Vec<u8>) {
        let Some(writer) = &self.writer else {
            self.put_page(page, &data);
            return;
        };
        let data: Arc<[u8]> = data.into();
        self.pending_writes.lock().insert(page, Arc::clone(&data));
        let shared = Arc::clone(self);
        let job = Box::new(move || shared.complete_write(page, data));
        if let Err(job) = writer.submit(job) {
            job();
        }
    }

    fn complete_write(&self, page: PageId, data: Arc<[u8]>) {
        self.put_page(page, &data);
        let mut pending = self.pending_writes.lock();
        if pending.get(&page).is_some_and(|queued| Arc::ptr_eq(queued, &data)) {
            pending.remove(&page);
        }
    }

    fn put_page(&self, page: PageId, data: &[u8]) -> bool {
        let start = Instant::now();
        let result = self.store.put(page, data);
        let elapsed = start.elapsed();
        self.stats.write.record(elapsed);
        self.stats.io.record(elapsed);
        match result {
            Ok(()) => {
                self.stats.record_flush(page, data.len());
                true
            }
            Err(err) => {
                Statistics::incr(&self.stats.write_back_failures);
                warn!(page, %err, "write-back failed");
                false
            }
        }
    }

    /// Current contents of `page`: a queued write-back wins over the store.
    fn fetch(&self, page: PageId) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(data) = self.pending_writes.lock().get(&page) {
            return Ok(Some(data.to_vec()));
        }
        let start = Instant::now();
        let result = self.store.get(page);
        let elapsed = start.elapsed();
        self.stats.fetch.record(elapsed);
        self.stats.io.record(elapsed);
        result
    }

    fn is_stored(&self, page: PageId) -> bool {
        self.pending_writes.lock().contains_key(&page) || self.store.contains(page)
    }
}

/// Adaptive paged memory cache over a backing store.
pub struct FurrBall<S: BackingStore + 'static = MemoryStore> {
    shared: Arc<Shared<S>>,
    policy: Mutex<BoxedPolicy<PageId, VirtualPointer>>,
    directory: RwLock<BTreeMap<PageId, VirtualPointer>>,
    gate: Arc<Mutex<()>>,
    worker: Option<Worker>,
    path: PathBuf,
}

impl<S: BackingStore + 'static> FurrBall<S> {
    /// Opens the store at `path` and builds a cache in front of it.
    ///
    /// Any setup failure is logged and yields `None`.
    pub fn create(path: impl AsRef<Path>, config: FurrConfig, overwrite: bool) -> Option<Self> {
        Self::try_create(path, config, overwrite).ok()
    }

    /// [`create`](Self::create), reporting why setup failed.
    pub fn try_create(
        path: impl AsRef<Path>,
        config: FurrConfig,
        overwrite: bool,
    ) -> Result<Self, SetupError> {
        Self::try_create_with_allocator(path, config, overwrite, Arc::new(SystemAllocator::new()))
    }

    pub fn try_create_with_allocator(
        path: impl AsRef<Path>,
        config: FurrConfig,
        overwrite: bool,
        allocator: Arc<dyn PageAllocator>,
    ) -> Result<Self, SetupError> {
        let path = path.as_ref();
        validate(&config)?;
        let store = S::open(path, overwrite).map_err(|err| {
            error!(path = %path.display(), %err, "failed to open backing store");
            SetupError::StoreOpen(err)
        })?;
        let mut ball = Self::with_parts(store, config, allocator)?;
        ball.path = path.to_path_buf();
        Ok(ball)
    }

    /// Builds a cache around an already open store.
    pub fn with_parts(
        store: S,
        config: FurrConfig,
        allocator: Arc<dyn PageAllocator>,
    ) -> Result<Self, SetupError> {
        validate(&config)?;
        let config = config.resolved();
        let pool = PagePool::new(&config, allocator)?;
        let worker = if config.enable_burst_mode {
            let worker = Worker::spawn("furrballs-writer").map_err(|err| {
                error!(%err, "failed to start write-back worker");
                SetupError::Worker(err)
            })?;
            Some(worker)
        } else {
            None
        };

        let capacity = pool.page_count();
        let kind = config.policy;
        let shared = Arc::new(Shared {
            config,
            store,
            pool,
            stats: Statistics::new(),
            writer: worker.as_ref().map(Worker::handle),
            pending_growth: AtomicUsize::new(0),
            pending_writes: Mutex::new(FxHashMap::default()),
            on_evict: Mutex::new(None),
        });
        let evicting = Arc::clone(&shared);
        let policy = PolicyBuilder::new(capacity).build_with_callback(
            kind,
            Box::new(move |page: &PageId, vptr: &mut VirtualPointer| {
                evicting.evicted(*page, *vptr)
            }),
        );
        trace_op!(shared.config, capacity, policy = %kind, "cache created");

        Ok(Self {
            shared,
            policy: Mutex::new(policy),
            directory: RwLock::new(BTreeMap::new()),
            gate: Arc::new(Mutex::new(())),
            worker,
            path: PathBuf::new(),
        })
    }

    /// Page containing `address`.
    pub fn page_of(&self, address: u64) -> PageId {
        address & !(self.shared.config.page_size as u64 - 1)
    }

    fn ptr_for(&self, vptr: VirtualPointer, address: u64) -> PagePtr {
        let page = self.page_of(address);
        PagePtr {
            vptr,
            page,
            offset: (address - page) as usize,
        }
    }

    /// Resolves the page containing `address`, loading it on a miss.
    ///
    /// Returns `None` when the miss is out of range (nothing stored there and
    /// no known page within `contingency_pages`) or the reload fails. An
    /// out-of-range miss leaves the cache unchanged.
    pub fn get(&self, address: u64) -> Option<PagePtr> {
        let page = self.page_of(address);
        let mut policy = self.policy.lock();
        let vptr = self.resolve(&mut policy, page, true)?;
        Some(self.ptr_for(vptr, address))
    }

    /// Writes `data` at `address`, loading or creating the page as needed.
    ///
    /// This is how new pages enter the cache: no range check applies. The
    /// write is clamped to the end of the page.
    pub fn put(&self, address: u64, data: &[u8]) -> Option<PagePtr> {
        let page = self.page_of(address);
        let mut policy = self.policy.lock();
        let vptr = self.resolve(&mut policy, page, false)?;
        let ptr = self.ptr_for(vptr, address);
        self.write_resident(ptr.vptr, ptr.offset, data)?;
        Some(ptr)
    }

    fn resolve(
        &self,
        policy: &mut BoxedPolicy<PageId, VirtualPointer>,
        page: PageId,
        check_range: bool,
    ) -> Option<VirtualPointer> {
        if policy.contains(&page) {
            policy.touch(&page);
            let vptr = policy.peek(&page).copied()?;
            self.shared.pool.mark_accessed(vptr);
            Statistics::incr(&self.shared.stats.hits);
            trace_op!(self.shared.config, page, "cache hit");
            return Some(vptr);
        }

        let known = self.directory.read().get(&page).copied();
        if check_range && known.is_none() && !self.in_range(page) {
            trace_op!(self.shared.config, page, "miss out of range");
            return None;
        }

        Statistics::incr(&self.shared.stats.misses);
        let start = Instant::now();
        let data = match self.shared.fetch(page) {
            Ok(data) => data.unwrap_or_default(),
            Err(err) => {
                warn!(page, %err, "failed to load page");
                return None;
            }
        };

        let vptr = match known {
            Some(vptr) => vptr,
            None => {
                let vptr = self.shared.pool.register_detached();
                self.directory.write().insert(page, vptr);
                vptr
            }
        };
        if policy.get(&page).is_none() {
            policy.add(page, vptr);
        }
        let grown = self.shared.pending_growth.swap(0, Ordering::AcqRel);
        if grown > 0 {
            policy.grow(grown);
        }

        if !self.shared.pool.attach(vptr, page, &data) {
            policy.remove(&page);
            warn!(page, "no free frame for reloaded page");
            return None;
        }
        self.shared.stats.reload.record(start.elapsed());
        trace_op!(self.shared.config, page, bytes = data.len(), "page loaded");
        Some(vptr)
    }

    fn in_range(&self, page: PageId) -> bool {
        if self.shared.is_stored(page) {
            return true;
        }
        let config = &self.shared.config;
        let window = (config.contingency_pages as u64).saturating_mul(config.page_size as u64);
        self.directory
            .read()
            .range(page.saturating_sub(window)..=page.saturating_add(window))
            .next()
            .is_some()
    }

    fn plain_gate(&self) -> Option<parking_lot::MutexGuard<'_, ()>> {
        (!self.shared.config.lockable_pages).then(|| self.gate.lock())
    }

    fn read_resident(&self, vptr: VirtualPointer, offset: usize, buf: &mut [u8]) -> Option<usize> {
        let _gate = self.plain_gate();
        self.shared.pool.read(vptr, offset, buf)
    }

    fn write_resident(&self, vptr: VirtualPointer, offset: usize, data: &[u8]) -> Option<usize> {
        let _gate = self.plain_gate();
        self.shared.pool.write(vptr, offset, data)
    }

    /// Copies bytes from `ptr` into `buf`, clamped to the end of the page.
    ///
    /// A page evicted since `ptr` was issued is reloaded first.
    pub fn read(&self, ptr: PagePtr, buf: &mut [u8]) -> Option<usize> {
        if let Some(len) = self.read_resident(ptr.vptr, ptr.offset, buf) {
            return Some(len);
        }
        self.reload(ptr)?;
        self.read_resident(ptr.vptr, ptr.offset, buf)
    }

    /// Copies `data` to `ptr` and marks the page dirty.
    ///
    /// A page evicted since `ptr` was issued is reloaded first.
    pub fn write(&self, ptr: PagePtr, data: &[u8]) -> Option<usize> {
        if let Some(len) = self.write_resident(ptr.vptr, ptr.offset, data) {
            return Some(len);
        }
        self.reload(ptr)?;
        self.write_resident(ptr.vptr, ptr.offset, data)
    }

    fn reload(&self, ptr: PagePtr) -> Option<()> {
        if !self.shared.pool.is_known(ptr.vptr) {
            return None;
        }
        let vptr = self.resolve(&mut self.policy.lock(), ptr.page, true)?;
        (vptr == ptr.vptr).then_some(())
    }

    /// Reads through a handle returned by
    /// [`store_large_data`](Self::store_large_data) or [`PagePtr::vptr`].
    pub fn read_at(&self, vptr: VirtualPointer, offset: usize, buf: &mut [u8]) -> Option<usize> {
        self.read_resident(vptr, offset, buf)
    }

    /// Registers caller memory behind a handle without copying it.
    ///
    /// The data is read-only through the cache and never evicted; release it
    /// with [`release_large_data`](Self::release_large_data).
    pub fn store_large_data(&self, data: Arc<[u8]>) -> VirtualPointer {
        trace_op!(self.shared.config, bytes = data.len(), "large data registered");
        self.shared.pool.register_external(data)
    }

    /// Drops the cache's reference to data registered with
    /// [`store_large_data`](Self::store_large_data).
    ///
    /// Page handles are owned by the cache; passing one returns `false` and
    /// leaves the page alone.
    pub fn release_large_data(&self, vptr: VirtualPointer) -> bool {
        let released = self.shared.pool.release_external(vptr);
        trace_op!(self.shared.config, released, "large data released");
        released
    }

    /// Installs `hook` to run for every evicted page, replacing any previous
    /// hook. Volatile caches run it too.
    ///
    /// The hook runs while the cache is busy evicting; it must not call back
    /// into this cache.
    pub fn set_eviction_callback(
        &self,
        hook: impl FnMut(PageId, Option<&[u8]>) + Send + 'static,
    ) {
        *self.shared.on_evict.lock() = Some(Box::new(hook));
    }

    /// Removes the hook installed by
    /// [`set_eviction_callback`](Self::set_eviction_callback).
    pub fn clear_eviction_callback(&self) -> bool {
        self.shared.on_evict.lock().take().is_some()
    }

    /// Locks the page containing `address` for exclusive access, loading it
    /// if needed.
    ///
    /// See [`PageLockGuard`] for what must not be done while it is held.
    pub fn lock_page(&self, address: u64) -> Option<PageLockGuard> {
        let page = self.page_of(address);
        let mut policy = self.policy.lock();
        let vptr = self.resolve(&mut policy, page, true)?;
        let gate = (!self.shared.config.lockable_pages).then(|| self.gate.lock_arc());
        self.shared.pool.lock_frame(vptr, gate)
    }

    /// Writes back every dirty resident page and flushes the store.
    ///
    /// Returns `false` if any write failed.
    pub fn flush(&self) -> bool {
        let failures_before = self.shared.stats.snapshot().write_back_failures;
        {
            // Evictions wait until these write-backs are submitted, so a
            // newer copy written back on eviction always lands last.
            let _policy = self.policy.lock();
            let dirty = {
                let _gate = self.gate.lock();
                self.shared.pool.take_dirty_pages()
            };
            trace_op!(self.shared.config, pages = dirty.len(), "flushing dirty pages");
            for (page, data) in dirty {
                self.shared.write_back(page, data);
            }
        }
        if let Some(writer) = &self.shared.writer {
            writer.wait_idle();
        }
        let mut ok = self.shared.stats.snapshot().write_back_failures == failures_before;
        if let Err(err) = self.shared.store.flush() {
            warn!(%err, "store flush failed");
            ok = false;
        }
        ok
    }

    /// Compacts the pool's frames into one slab. Returns the number of pages
    /// that moved; handles are unaffected.
    pub fn defragment(&self) -> usize {
        let _policy = self.policy.lock();
        let relocated = self.shared.stats.pointer_redirect.time(|| self.shared.pool.defragment());
        Statistics::add(&self.shared.stats.relocations, relocated as u64);
        relocated
    }

    /// Frames carved so far.
    pub fn page_count(&self) -> usize {
        self.shared.pool.page_count()
    }

    /// Ids of resident pages, ascending.
    pub fn resident_pages(&self) -> Vec<PageId> {
        self.shared.pool.resident_pages()
    }

    /// Entries resident in the eviction policy.
    pub fn backing_policy_len(&self) -> usize {
        self.policy.lock().len()
    }

    /// Runs `f` against the eviction policy.
    pub fn with_policy<R>(
        &self,
        f: impl FnOnce(&dyn EvictionPolicy<PageId, VirtualPointer>) -> R,
    ) -> R {
        let policy = self.policy.lock();
        f(&**policy)
    }

    /// Pages the cache has ever handed out a handle for.
    pub fn known_pages(&self) -> usize {
        self.directory.read().len()
    }

    /// The resolved configuration.
    pub fn config(&self) -> &FurrConfig {
        &self.shared.config
    }

    pub fn amp_state(&self) -> AmpState {
        self.shared.pool.amp()
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }

    /// Where the store was opened, empty for [`with_parts`](Self::with_parts).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Page addresses most recently written back, newest first.
    pub fn flushed_pages(&self) -> Vec<PageId> {
        self.shared.stats.flushed_pages()
    }

    /// Cross-checks the eviction policy against the pool.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let policy = self.policy.lock();
        if policy.len() > policy.capacity() {
            return Err(InvariantError::new(format!(
                "policy holds {} pages but its capacity is {}",
                policy.len(),
                policy.capacity()
            )));
        }
        if policy.capacity() > self.shared.pool.page_count() {
            return Err(InvariantError::new(format!(
                "policy capacity {} exceeds carved frames {}",
                policy.capacity(),
                self.shared.pool.page_count()
            )));
        }
        let resident = self.shared.pool.resident_pages();
        if resident.len() != policy.len() {
            return Err(InvariantError::new(format!(
                "{} frames in use but the policy holds {} pages",
                resident.len(),
                policy.len()
            )));
        }
        if let Some(page) = resident.iter().find(|page| !policy.contains(page)) {
            return Err(InvariantError::new(format!(
                "page {page:#x} is resident but unknown to the policy"
            )));
        }
        Ok(())
    }

    pub fn stats(&self) -> StatsSnapshot {
        let pool = &self.shared.pool;
        let resident = pool.resident_count();
        StatsSnapshot {
            used_memory: resident * pool.page_size() + pool.external_bytes(),
            preallocated_bytes: pool.preallocated_bytes(),
            page_count: pool.page_count(),
            resident_pages: resident,
            ..self.shared.stats.snapshot()
        }
    }
}

fn validate(config: &FurrConfig) -> Result<(), SetupError> {
    config.validate().map_err(|err| {
        warn!(%err, "invalid cache configuration");
        SetupError::Config(err)
    })
}

impl<S: BackingStore + 'static> MetricsSnapshotProvider<StatsSnapshot> for FurrBall<S> {
    fn snapshot(&self) -> StatsSnapshot {
        self.stats()
    }
}

impl<S: BackingStore + 'static> std::fmt::Debug for FurrBall<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FurrBall")
            .field("path", &self.path)
            .field("policy", &self.shared.config.policy)
            .field("pool", &self.shared.pool)
            .finish_non_exhaustive()
    }
}

impl<S: BackingStore + 'static> Drop for FurrBall<S> {
    fn drop(&mut self) {
        if !self.shared.config.is_volatile {
            self.flush();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
        if let Err(err) = self.shared.store.flush() {
            warn!(%err, "store flush on close failed");
        }
    }
}
