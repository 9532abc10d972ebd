//! Stat and directory-listing cache
//!
//! Glob expansion and `Project`-mode lookups stat the same directories over
//! and over; this layer memoizes `metadata`, `read_dir` and `canonicalize`
//! (negative results included) until a write or an explicit `invalidate`.

use super::{Middleware, Next, Stage};
use crate::r#trait::{DirEntry, FileStat};
use crate::VfsResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Caches {
    stats: HashMap<PathBuf, Option<FileStat>>,
    listings: HashMap<PathBuf, Vec<DirEntry>>,
    canonical: HashMap<PathBuf, Option<PathBuf>>,
}

/// Middleware that caches stat results and directory listings
#[derive(Default)]
pub struct CachedLayer {
    caches: RwLock<Caches>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn forget(&self, path: &Path) {
        let mut caches = self.caches.write();
        caches.stats.remove(path);
        caches.listings.remove(path);
        caches.canonical.remove(path);
        if let Some(parent) = path.parent() {
            caches.listings.remove(parent);
        }
        // Anything that may have resolved through this path
        caches.stats.retain(|key, _| !key.starts_with(path));
        caches.canonical.retain(|key, _| !key.starts_with(path));
    }

    fn clear(&self) {
        *self.caches.write() = Caches::default();
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

impl Middleware for CachedLayer {
    fn stage(&self) -> Stage {
        Stage::Caching
    }

    fn write_file(&self, path: &Path, content: &[u8], next: &dyn Next) -> VfsResult<()> {
        let result = next.write_file(path, content);
        self.forget(path);
        result
    }

    fn create_dir_all(&self, path: &Path, next: &dyn Next) -> VfsResult<()> {
        let result = next.create_dir_all(path);
        // Every missing ancestor may have been created
        let mut current = Some(path);
        while let Some(dir) = current {
            self.forget(dir);
            current = dir.parent();
        }
        result
    }

    fn metadata(&self, path: &Path, next: &dyn Next) -> Option<FileStat> {
        if let Some(cached) = self.caches.read().stats.get(path) {
            self.hit();
            return *cached;
        }
        self.miss();
        let stat = next.metadata(path);
        self.caches.write().stats.insert(path.to_path_buf(), stat);
        stat
    }

    fn read_dir(&self, path: &Path, next: &dyn Next) -> VfsResult<Vec<DirEntry>> {
        if let Some(cached) = self.caches.read().listings.get(path) {
            self.hit();
            return Ok(cached.clone());
        }
        self.miss();
        // Errors are not cached; a missing directory may appear later
        let entries = next.read_dir(path)?;
        self.caches
            .write()
            .listings
            .insert(path.to_path_buf(), entries.clone());
        Ok(entries)
    }

    fn canonicalize(&self, path: &Path, next: &dyn Next) -> Option<PathBuf> {
        if let Some(cached) = self.caches.read().canonical.get(path) {
            self.hit();
            return cached.clone();
        }
        self.miss();
        let canonical = next.canonicalize(path);
        self.caches
            .write()
            .canonical
            .insert(path.to_path_buf(), canonical.clone());
        canonical
    }

    fn invalidate(&self, path: Option<&Path>, next: &dyn Next) {
        match path {
            Some(path) => self.forget(path),
            None => self.clear(),
        }
        next.invalidate(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::VfsBuilder;
    use crate::{MemoryFileSystem, VirtualFileSystem};
    use std::sync::Arc;

    fn layered(backend: &MemoryFileSystem) -> (crate::middleware::LayeredVFS, Arc<CachedLayer>) {
        let cache = Arc::new(CachedLayer::new());
        let vfs = VfsBuilder::new(backend.clone())
            .with(SharedCache(Arc::clone(&cache)))
            .build();
        (vfs, cache)
    }

    /// Lets the test keep a handle on the cache counters
    struct SharedCache(Arc<CachedLayer>);

    impl Middleware for SharedCache {
        fn stage(&self) -> Stage {
            self.0.stage()
        }
        fn write_file(&self, path: &Path, content: &[u8], next: &dyn Next) -> VfsResult<()> {
            self.0.write_file(path, content, next)
        }
        fn metadata(&self, path: &Path, next: &dyn Next) -> Option<FileStat> {
            self.0.metadata(path, next)
        }
        fn read_dir(&self, path: &Path, next: &dyn Next) -> VfsResult<Vec<DirEntry>> {
            self.0.read_dir(path, next)
        }
        fn invalidate(&self, path: Option<&Path>, next: &dyn Next) {
            self.0.invalidate(path, next)
        }
    }

    #[test]
    fn test_metadata_is_cached_including_misses() {
        let backend = MemoryFileSystem::new();
        let (vfs, cache) = layered(&backend);

        assert!(!vfs.exists(Path::new("/a")));
        assert!(!vfs.exists(Path::new("/a")));
        assert_eq!(cache.stats(), (1, 1));

        // A write behind the cache's back stays invisible until invalidated
        backend.write_file(Path::new("/a"), b"").unwrap();
        assert!(!vfs.exists(Path::new("/a")));
        vfs.invalidate(Some(Path::new("/a")));
        assert!(vfs.exists(Path::new("/a")));
    }

    #[test]
    fn test_write_through_cache_invalidates() {
        let backend = MemoryFileSystem::new();
        let (vfs, cache) = layered(&backend);

        assert!(vfs.files(Path::new("/")).is_empty());
        vfs.write_file(Path::new("/new.txt"), b"x").unwrap();
        assert_eq!(vfs.files(Path::new("/")), vec!["new.txt".to_string()]);
        assert!(vfs.is_file(Path::new("/new.txt")));

        vfs.invalidate(None);
        assert!(vfs.is_file(Path::new("/new.txt")));
        let (hits, misses) = cache.stats();
        assert!(misses >= 3);
        assert_eq!(hits, 0);
    }
}
