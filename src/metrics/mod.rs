//! Cache statistics: recording, snapshots and export.

pub mod exporter;
pub mod snapshot;
pub mod stats;
pub mod traits;

pub use exporter::PrometheusTextExporter;
pub use snapshot::{StatsSnapshot, TimingSnapshot};
pub use stats::{FLUSH_HISTORY, Statistics, TimingStat};
pub use traits::{MetricsExporter, MetricsSnapshotProvider};
