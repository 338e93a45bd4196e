//! Live counters.
//!
//! Every field is an atomic so recording never takes a lock; the flushed
//! address history is the one exception and sits behind a short mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ds::PageHistory;
use crate::metrics::snapshot::{StatsSnapshot, TimingSnapshot};
use crate::store::PageId;

/// Flushed page addresses remembered for inspection.
pub const FLUSH_HISTORY: usize = 1024;

/// Accumulated duration of one kind of operation.
#[derive(Debug, Default)]
pub struct TimingStat {
    count: AtomicU64,
    total_nanos: AtomicU64,
}

impl TimingStat {
    pub fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Runs `f` and records how long it took.
    pub fn time<R>(&self, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.record(start.elapsed());
        result
    }

    pub fn snapshot(&self) -> TimingSnapshot {
        TimingSnapshot {
            count: self.count.load(Ordering::Relaxed),
            total_nanos: self.total_nanos.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct FlushLog(Mutex<PageHistory>);

impl Default for FlushLog {
    fn default() -> Self {
        Self(Mutex::new(PageHistory::new(FLUSH_HISTORY)))
    }
}

/// Counters shared by a cache and its eviction path.
#[derive(Debug, Default)]
pub struct Statistics {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) hot_evictions: AtomicU64,
    pub(crate) write_backs: AtomicU64,
    pub(crate) write_back_failures: AtomicU64,
    pub(crate) flushed_bytes: AtomicU64,
    pub(crate) expansions: AtomicU64,
    pub(crate) relocations: AtomicU64,
    pub(crate) io: TimingStat,
    pub(crate) fetch: TimingStat,
    pub(crate) write: TimingStat,
    pub(crate) reload: TimingStat,
    pub(crate) pointer_redirect: TimingStat,
    pub(crate) page_expansion: TimingStat,
    flushed_pages: FlushLog,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    /// Records a completed write-back of `bytes` bytes for `page`.
    pub(crate) fn record_flush(&self, page: PageId, bytes: usize) {
        Self::incr(&self.write_backs);
        Self::add(&self.flushed_bytes, bytes as u64);
        self.flushed_pages.0.lock().record(page);
    }

    /// Most recently flushed page addresses, newest first.
    pub fn flushed_pages(&self) -> Vec<PageId> {
        self.flushed_pages.0.lock().newest_first()
    }

    /// Copies the counters. Pool gauges are left at zero for the caller to
    /// fill in.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            hits: load(&self.hits),
            misses: load(&self.misses),
            evictions: load(&self.evictions),
            hot_evictions: load(&self.hot_evictions),
            write_backs: load(&self.write_backs),
            write_back_failures: load(&self.write_back_failures),
            flushed_bytes: load(&self.flushed_bytes),
            expansions: load(&self.expansions),
            relocations: load(&self.relocations),
            io: self.io.snapshot(),
            fetch: self.fetch.snapshot(),
            write: self.write.snapshot(),
            reload: self.reload.snapshot(),
            pointer_redirect: self.pointer_redirect.snapshot(),
            page_expansion: self.page_expansion.snapshot(),
            ..StatsSnapshot::default()
        }
    }
}
