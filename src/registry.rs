//! Open caches keyed by store path.
//!
//! A [`Registry`] is an explicit owner of [`FurrBall`] instances: opening a
//! path that is already open hands back the existing cache instead of
//! building a second one over the same store.
//!
//! ```
//! use furrballs::config::FurrConfig;
//! use furrballs::registry::Registry;
//! use std::sync::Arc;
//!
//! let registry: Registry = Registry::new();
//! let a = registry.open("world", FurrConfig::default(), true).unwrap();
//! let b = registry.open("world", FurrConfig::default(), false).unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! assert!(registry.close("world"));
//! assert!(registry.is_empty());
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ball::FurrBall;
use crate::config::FurrConfig;
use crate::store::{BackingStore, MemoryStore};

/// Owner of open caches.
pub struct Registry<S: BackingStore + 'static = MemoryStore> {
    open: Mutex<FxHashMap<PathBuf, Arc<FurrBall<S>>>>,
}

impl<S: BackingStore + 'static> Registry<S> {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(FxHashMap::default()),
        }
    }

    /// Returns the cache open at `path`, creating it if needed.
    ///
    /// `config` and `overwrite` only apply when a new cache is created.
    pub fn open(
        &self,
        path: impl AsRef<Path>,
        config: FurrConfig,
        overwrite: bool,
    ) -> Option<Arc<FurrBall<S>>> {
        let path = path.as_ref();
        let mut open = self.open.lock();
        if let Some(ball) = open.get(path) {
            debug!(path = %path.display(), "cache already open");
            return Some(Arc::clone(ball));
        }
        let ball = Arc::new(FurrBall::create(path, config, overwrite)?);
        open.insert(path.to_path_buf(), Arc::clone(&ball));
        Some(ball)
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<FurrBall<S>>> {
        self.open.lock().get(path.as_ref()).cloned()
    }

    /// Forgets the cache at `path`. It shuts down once the last outstanding
    /// `Arc` is dropped.
    pub fn close(&self, path: impl AsRef<Path>) -> bool {
        self.open.lock().remove(path.as_ref()).is_some()
    }

    /// Flushes every open cache; `false` if any flush failed.
    pub fn flush_all(&self) -> bool {
        let balls: Vec<_> = self.open.lock().values().cloned().collect();
        balls.iter().fold(true, |ok, ball| ball.flush() && ok)
    }

    pub fn close_all(&self) {
        let balls: Vec<_> = self.open.lock().drain().collect();
        drop(balls);
    }

    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }

    /// Paths of open caches, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.open.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl<S: BackingStore + 'static> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: BackingStore + 'static> std::fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("paths", &self.paths())
            .finish()
    }
}
