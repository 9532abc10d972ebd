use super::Stage;
use crate::r#trait::{DirEntry, FileStat};
use crate::VfsResult;
use std::path::{Path, PathBuf};

/// A layer between the build and the backing store.
///
/// Every method receives the rest of the chain as `next` and passes the call
/// through unless overridden. A layer answers from its own state by not
/// calling `next` at all.
pub trait Middleware: Send + Sync {
    fn stage(&self) -> Stage;

    fn read_file(&self, path: &Path, next: &dyn Next) -> VfsResult<Vec<u8>> {
        next.read_file(path)
    }

    fn write_file(&self, path: &Path, content: &[u8], next: &dyn Next) -> VfsResult<()> {
        next.write_file(path, content)
    }

    fn create_dir_all(&self, path: &Path, next: &dyn Next) -> VfsResult<()> {
        next.create_dir_all(path)
    }

    fn metadata(&self, path: &Path, next: &dyn Next) -> Option<FileStat> {
        next.metadata(path)
    }

    fn read_dir(&self, path: &Path, next: &dyn Next) -> VfsResult<Vec<DirEntry>> {
        next.read_dir(path)
    }

    fn canonicalize(&self, path: &Path, next: &dyn Next) -> Option<PathBuf> {
        next.canonicalize(path)
    }

    /// Forget cached state for `path`, or for everything when `None`.
    /// The engine calls this after a rule rewrites its outputs.
    fn invalidate(&self, path: Option<&Path>, next: &dyn Next) {
        next.invalidate(path)
    }
}

/// The remainder of the chain, ending at the backend.
pub trait Next {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>>;
    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()>;
    fn create_dir_all(&self, path: &Path) -> VfsResult<()>;
    fn metadata(&self, path: &Path) -> Option<FileStat>;
    fn read_dir(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;
    fn canonicalize(&self, path: &Path) -> Option<PathBuf>;
    fn invalidate(&self, path: Option<&Path>);
}
