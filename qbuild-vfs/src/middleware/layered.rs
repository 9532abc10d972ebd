//! Layered VFS that executes middleware chain

use super::{Middleware, Next};
use crate::r#trait::{DirEntry, FileStat};
use crate::{VfsResult, VirtualFileSystem};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// VFS implementation that executes a middleware chain
pub struct LayeredVFS {
    backend: Arc<dyn VirtualFileSystem>,
    middlewares: Vec<Box<dyn Middleware>>,
}

impl LayeredVFS {
    pub(crate) fn new(
        backend: Arc<dyn VirtualFileSystem>,
        middlewares: Vec<Box<dyn Middleware>>,
    ) -> Self {
        Self {
            backend,
            middlewares,
        }
    }

    /// Number of installed middlewares
    pub fn depth(&self) -> usize {
        self.middlewares.len()
    }

    fn executor(&self) -> ChainExecutor<'_> {
        ChainExecutor {
            backend: &*self.backend,
            middlewares: &self.middlewares,
        }
    }
}

/// Chain executor positioned at one middleware
struct ChainExecutor<'a> {
    backend: &'a dyn VirtualFileSystem,
    middlewares: &'a [Box<dyn Middleware>],
}

impl<'a> ChainExecutor<'a> {
    /// Current middleware and the executor for the rest of the chain
    fn split(&self) -> Option<(&'a dyn Middleware, ChainExecutor<'a>)> {
        let (first, rest) = self.middlewares.split_first()?;
        Some((
            first.as_ref(),
            ChainExecutor {
                backend: self.backend,
                middlewares: rest,
            },
        ))
    }
}

impl Next for ChainExecutor<'_> {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        match self.split() {
            Some((middleware, next)) => middleware.read_file(path, &next),
            None => self.backend.read_file(path),
        }
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        match self.split() {
            Some((middleware, next)) => middleware.write_file(path, content, &next),
            None => self.backend.write_file(path, content),
        }
    }

    fn create_dir_all(&self, path: &Path) -> VfsResult<()> {
        match self.split() {
            Some((middleware, next)) => middleware.create_dir_all(path, &next),
            None => self.backend.create_dir_all(path),
        }
    }

    fn metadata(&self, path: &Path) -> Option<FileStat> {
        match self.split() {
            Some((middleware, next)) => middleware.metadata(path, &next),
            None => self.backend.metadata(path),
        }
    }

    fn read_dir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        match self.split() {
            Some((middleware, next)) => middleware.read_dir(path, &next),
            None => self.backend.read_dir(path),
        }
    }

    fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        match self.split() {
            Some((middleware, next)) => middleware.canonicalize(path, &next),
            None => self.backend.canonicalize(path),
        }
    }

    fn invalidate(&self, path: Option<&Path>) {
        match self.split() {
            Some((middleware, next)) => middleware.invalidate(path, &next),
            None => self.backend.invalidate(path),
        }
    }
}

impl VirtualFileSystem for LayeredVFS {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        self.executor().read_file(path)
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        self.executor().write_file(path, content)
    }

    fn create_dir_all(&self, path: &Path) -> VfsResult<()> {
        self.executor().create_dir_all(path)
    }

    fn metadata(&self, path: &Path) -> Option<FileStat> {
        self.executor().metadata(path)
    }

    fn read_dir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        self.executor().read_dir(path)
    }

    fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        self.executor().canonicalize(path)
    }

    fn invalidate(&self, path: Option<&Path>) {
        self.executor().invalidate(path)
    }
}
