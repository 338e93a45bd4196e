use std::fmt;
use std::time::Duration;

/// Count and total duration of one kind of operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimingSnapshot {
    pub count: u64,
    pub total_nanos: u64,
}

impl TimingSnapshot {
    pub fn average(&self) -> Duration {
        match self.count {
            0 => Duration::ZERO,
            count => Duration::from_nanos(self.total_nanos / count),
        }
    }
}

/// Point-in-time copy of a cache's statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hot_evictions: u64, // evicted pages that were hit while resident
    pub write_backs: u64,
    pub write_back_failures: u64,
    pub flushed_bytes: u64,
    pub expansions: u64,
    pub relocations: u64,

    pub io: TimingSnapshot,
    pub fetch: TimingSnapshot,
    pub write: TimingSnapshot,
    pub reload: TimingSnapshot,
    pub pointer_redirect: TimingSnapshot,
    pub page_expansion: TimingSnapshot,

    // gauges captured at snapshot time
    pub used_memory: usize,
    pub preallocated_bytes: usize,
    pub page_count: usize,
    pub resident_pages: usize,
}

impl StatsSnapshot {
    /// Fraction of lookups served without a reload.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "hits: {}  misses: {}  hit rate: {:.1}%",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0
        )?;
        writeln!(
            f,
            "evictions: {} ({} hot)  write-backs: {} ({} bytes, {} failed)",
            self.evictions,
            self.hot_evictions,
            self.write_backs,
            self.flushed_bytes,
            self.write_back_failures
        )?;
        writeln!(
            f,
            "pages: {} resident / {} carved  used: {} bytes  preallocated: {} bytes",
            self.resident_pages, self.page_count, self.used_memory, self.preallocated_bytes
        )?;
        writeln!(
            f,
            "expansions: {}  relocations: {}",
            self.expansions, self.relocations
        )?;
        write!(
            f,
            "avg io: {:?}  fetch: {:?}  write: {:?}  reload: {:?}  redirect: {:?}  expansion: {:?}",
            self.io.average(),
            self.fetch.average(),
            self.write.average(),
            self.reload.average(),
            self.pointer_redirect.average(),
            self.page_expansion.average()
        )
    }
}
