//! One file per page under a directory.
//!
//! Page `0x2000` lives in `0000000000002000.page`. Writes go to a temporary
//! file that is renamed into place, so a torn write never replaces a good
//! page. [`flush`](BackingStore::flush) syncs every file written since the
//! previous flush.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::error::StoreError;
use crate::store::traits::{BackingStore, Codec, PageId, Passthrough};

const PAGE_EXT: &str = "page";

/// Directory-backed page store.
#[derive(Debug)]
pub struct DirStore<C = Passthrough> {
    root: PathBuf,
    codec: C,
    unsynced: Mutex<FxHashSet<PageId>>,
}

impl<C: Codec> DirStore<C> {
    /// Open `root` with an explicit codec.
    pub fn with_codec(root: &Path, overwrite: bool, codec: C) -> Result<Self, StoreError> {
        if root.exists() && !root.is_dir() {
            return Err(StoreError::Unavailable {
                path: root.to_path_buf(),
                reason: "not a directory".into(),
            });
        }
        fs::create_dir_all(root)?;
        if overwrite {
            for entry in fs::read_dir(root)? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == PAGE_EXT) {
                    fs::remove_file(path)?;
                }
            }
        }
        Ok(Self {
            root: root.to_path_buf(),
            codec,
            unsynced: Mutex::new(FxHashSet::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn page_path(&self, page: PageId) -> PathBuf {
        self.root.join(format!("{page:016x}.{PAGE_EXT}"))
    }
}

impl<C: Codec + Default> BackingStore for DirStore<C> {
    fn open(path: &Path, overwrite: bool) -> Result<Self, StoreError> {
        Self::with_codec(path, overwrite, C::default())
    }

    fn get(&self, page: PageId) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.page_path(page)) {
            Ok(bytes) => self.codec.decode(page, &bytes).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, page: PageId, data: &[u8]) -> Result<(), StoreError> {
        let path = self.page_path(page);
        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&self.codec.encode(data))?;
        drop(file);
        fs::rename(&tmp, &path)?;
        self.unsynced.lock().insert(page);
        Ok(())
    }

    fn contains(&self, page: PageId) -> bool {
        self.page_path(page).is_file()
    }

    fn flush(&self) -> Result<(), StoreError> {
        let pending: Vec<_> = self.unsynced.lock().drain().collect();
        for page in pending {
            match File::open(self.page_path(page)) {
                Ok(file) => file.sync_all()?,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|entry| entry.path().extension().is_some_and(|ext| ext == PAGE_EXT))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RunLength;

    #[test]
    fn dir_store_round_trips_pages() {
        let dir = tempfile::tempdir().unwrap();
        let store: DirStore = DirStore::open(dir.path(), false).unwrap();
        assert_eq!(store.get(0x2000).unwrap(), None);

        store.put(0x2000, b"contents").unwrap();
        assert!(store.contains(0x2000));
        assert!(dir.path().join("0000000000002000.page").is_file());
        assert_eq!(store.get(0x2000).unwrap(), Some(b"contents".to_vec()));
        store.flush().unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reopen_keeps_or_discards_pages() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store: DirStore = DirStore::open(dir.path(), false).unwrap();
            store.put(1, b"a").unwrap();
            store.flush().unwrap();
        }
        let store: DirStore = DirStore::open(dir.path(), false).unwrap();
        assert!(store.contains(1));

        let store: DirStore = DirStore::open(dir.path(), true).unwrap();
        assert!(!store.contains(1));
        assert!(store.is_empty());
    }

    #[test]
    fn codec_is_applied_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::with_codec(dir.path(), false, RunLength).unwrap();
        store.put(0, &[0u8; 4096]).unwrap();
        let on_disk = fs::read(dir.path().join("0000000000000000.page")).unwrap();
        assert_eq!(on_disk.len(), 34);
        assert_eq!(store.get(0).unwrap(), Some(vec![0u8; 4096]));

        fs::write(dir.path().join("0000000000000000.page"), [1u8]).unwrap();
        assert!(matches!(store.get(0), Err(StoreError::Codec { page: 0, .. })));
    }

    #[test]
    fn open_rejects_a_file_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = DirStore::<Passthrough>::open(file.path(), false).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }
}
