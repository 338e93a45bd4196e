//! # Statistics consumption
//!
//! Recording lives in [`Statistics`](crate::metrics::Statistics); consumers
//! only ever see copies.
//!
//! ```text
//!   FurrBall ──records──► Statistics ──snapshot()──► StatsSnapshot
//!                                                        │
//!                            ┌───────────────────────────┴──────────┐
//!                            ▼                                      ▼
//!                  MetricsSnapshotProvider<S>              MetricsExporter<S>
//!                  (tests, benches)                        (monitoring)
//! ```

/// Anything that can hand out a snapshot of its statistics.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Publishes snapshots to a monitoring system.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}
