//! Logging middleware for VFS operations

use super::{Middleware, Next, Stage};
use crate::r#trait::{DirEntry, FileStat};
use crate::VfsResult;
use qbuild_log::{debug, trace, Logger};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Middleware that traces VFS operations to a [`Logger`]
///
/// Reads and stats go out at trace level, mutations at debug level.
pub struct LoggedLayer {
    logger: Arc<Logger>,
}

impl LoggedLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

impl Middleware for LoggedLayer {
    fn stage(&self) -> Stage {
        Stage::Outer
    }

    fn read_file(&self, path: &Path, next: &dyn Next) -> VfsResult<Vec<u8>> {
        let result = next.read_file(path);
        match &result {
            Ok(content) => trace!(
                self.logger,
                "read_file: {} ({} bytes)",
                path.display(),
                content.len()
            ),
            Err(e) => debug!(self.logger, "read_file: {} failed: {}", path.display(), e),
        }
        result
    }

    fn write_file(&self, path: &Path, content: &[u8], next: &dyn Next) -> VfsResult<()> {
        debug!(
            self.logger,
            "write_file: {} ({} bytes)",
            path.display(),
            content.len()
        );
        next.write_file(path, content)
    }

    fn create_dir_all(&self, path: &Path, next: &dyn Next) -> VfsResult<()> {
        debug!(self.logger, "create_dir_all: {}", path.display());
        next.create_dir_all(path)
    }

    fn metadata(&self, path: &Path, next: &dyn Next) -> Option<FileStat> {
        let stat = next.metadata(path);
        trace!(
            self.logger,
            "stat: {} = {}",
            path.display(),
            match stat {
                Some(stat) if stat.is_dir() => "dir",
                Some(_) => "file",
                None => "missing",
            }
        );
        stat
    }

    fn read_dir(&self, path: &Path, next: &dyn Next) -> VfsResult<Vec<DirEntry>> {
        let result = next.read_dir(path);
        if let Ok(entries) = &result {
            trace!(
                self.logger,
                "read_dir: {} ({} entries)",
                path.display(),
                entries.len()
            );
        }
        result
    }

    fn canonicalize(&self, path: &Path, next: &dyn Next) -> Option<PathBuf> {
        let canonical = next.canonicalize(path);
        if let Some(real) = &canonical {
            if real != path {
                trace!(
                    self.logger,
                    "canonicalize: {} -> {}",
                    path.display(),
                    real.display()
                );
            }
        }
        canonical
    }

    fn invalidate(&self, path: Option<&Path>, next: &dyn Next) {
        match path {
            Some(path) => debug!(self.logger, "invalidate: {}", path.display()),
            None => debug!(self.logger, "invalidate: all"),
        }
        next.invalidate(path)
    }
}
