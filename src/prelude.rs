pub use crate::alloc::{BudgetAllocator, PageAllocator, SystemAllocator};
pub use crate::ball::{FurrBall, PagePtr};
pub use crate::builder::{PolicyBuilder, PolicyKind};
pub use crate::config::FurrConfig;
pub use crate::error::{ConfigError, SetupError, StoreError};
pub use crate::metrics::StatsSnapshot;
pub use crate::policy::{ArcPolicy, LfuPolicy, LruPolicy, S3FifoPolicy};
pub use crate::pool::{PageLockGuard, VirtualPointer};
pub use crate::registry::Registry;
pub use crate::store::{BackingStore, DirStore, MemoryStore, PageId};
pub use crate::traits::{EvictionPolicy, ReadOnlyCache};
