use std::io::Write;

use parking_lot::Mutex;

use crate::metrics::snapshot::{StatsSnapshot, TimingSnapshot};
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for cache statistics.
///
/// This exporter writes in the Prometheus text exposition format so it can be
/// scraped by Prometheus or forwarded to an OpenTelemetry collector.
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write + Send> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_metric(&self, kind: &str, name: &str, value: u64) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "# TYPE {} {}", name, kind);
        let _ = writeln!(writer, "{} {}", name, value);
    }

    fn write_counter(&self, suffix: &str, value: u64) {
        self.write_metric("counter", &self.metric_name(suffix), value);
    }

    fn write_gauge(&self, suffix: &str, value: usize) {
        self.write_metric("gauge", &self.metric_name(suffix), value as u64);
    }

    fn write_timing(&self, suffix: &str, timing: &TimingSnapshot) {
        self.write_counter(&format!("{suffix}_total"), timing.count);
        self.write_counter(&format!("{suffix}_nanoseconds_total"), timing.total_nanos);
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }
}

impl<W: Write + Send> MetricsExporter<StatsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &StatsSnapshot) {
        self.write_counter("hits_total", snapshot.hits);
        self.write_counter("misses_total", snapshot.misses);
        self.write_counter("evictions_total", snapshot.evictions);
        self.write_counter("hot_evictions_total", snapshot.hot_evictions);
        self.write_counter("write_backs_total", snapshot.write_backs);
        self.write_counter("write_back_failures_total", snapshot.write_back_failures);
        self.write_counter("flushed_bytes_total", snapshot.flushed_bytes);
        self.write_counter("expansions_total", snapshot.expansions);
        self.write_counter("relocations_total", snapshot.relocations);

        self.write_timing("io", &snapshot.io);
        self.write_timing("fetch", &snapshot.fetch);
        self.write_timing("write", &snapshot.write);
        self.write_timing("reload", &snapshot.reload);
        self.write_timing("pointer_redirect", &snapshot.pointer_redirect);
        self.write_timing("page_expansion", &snapshot.page_expansion);

        self.write_gauge("used_memory_bytes", snapshot.used_memory);
        self.write_gauge("preallocated_bytes", snapshot.preallocated_bytes);
        self.write_gauge("pages", snapshot.page_count);
        self.write_gauge("resident_pages", snapshot.resident_pages);
    }
}
