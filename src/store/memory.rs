//! In-process backing store.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::StoreError;
use crate::store::traits::{BackingStore, PageId};

/// Pages held in a map; nothing survives the process.
///
/// Counts reads and writes so callers can observe write-back traffic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pages: RwLock<FxHashMap<PageId, Vec<u8>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store.
    pub fn with_pages(pages: impl IntoIterator<Item = (PageId, Vec<u8>)>) -> Self {
        let store = Self::new();
        store.pages.write().extend(pages);
        store
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Stored page ids, ascending.
    pub fn page_ids(&self) -> Vec<PageId> {
        let mut ids: Vec<_> = self.pages.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl BackingStore for MemoryStore {
    fn open(_path: &Path, _overwrite: bool) -> Result<Self, StoreError> {
        Ok(Self::new())
    }

    fn get(&self, page: PageId) -> Result<Option<Vec<u8>>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.pages.read().get(&page).cloned())
    }

    fn put(&self, page: PageId, data: &[u8]) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.pages.write().insert(page, data.to_vec());
        Ok(())
    }

    fn contains(&self, page: PageId) -> bool {
        self.pages.read().contains_key(&page)
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.pages.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_put_get() {
        let store = MemoryStore::open(Path::new("unused"), true).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.get(0).unwrap(), None);

        store.put(0x1000, b"page").unwrap();
        store.put(0x1000, b"again").unwrap();
        assert!(store.contains(0x1000));
        assert_eq!(store.get(0x1000).unwrap(), Some(b"again".to_vec()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.writes(), 2);
        assert_eq!(store.reads(), 2);
    }

    #[test]
    fn with_pages_prepopulates() {
        let store = MemoryStore::with_pages([(4096, vec![1]), (0, vec![2])]);
        assert_eq!(store.page_ids(), vec![0, 4096]);
        assert_eq!(store.writes(), 0);
    }
}
