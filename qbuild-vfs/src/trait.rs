//! VirtualFileSystem trait definition

use crate::error::VfsResult;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryKind {
    File,
    Dir,
}

/// Result of a stat call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: EntryKind,
    /// Last modification time, if the backend tracks one
    pub modified: Option<SystemTime>,
}

impl FileStat {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// A single directory listing entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Virtual File System trait
///
/// Provides a unified interface for file operations, decoupling the solution
/// layer, the evaluator and the rule engine from a specific file system.
///
/// # Implementations
/// - `MemoryFileSystem`: In-memory file system with a logical clock
/// - `NativeFileSystem`: Native OS file system
/// - `LayeredVFS`: A backend wrapped in a middleware chain
pub trait VirtualFileSystem: Send + Sync {
    /// Read file contents
    ///
    /// # Arguments
    /// * `path` - File path
    ///
    /// # Returns
    /// File contents as bytes, or VfsError
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>>;

    /// Write file contents
    ///
    /// Creates the file if it doesn't exist, truncates it if it does.
    ///
    /// # Arguments
    /// * `path` - File path
    /// * `content` - Content to write
    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()>;

    /// Create a directory and all missing parents
    fn create_dir_all(&self, path: &Path) -> VfsResult<()>;

    /// Stat a path, following symlinks
    ///
    /// # Returns
    /// `None` if nothing exists at `path`
    fn metadata(&self, path: &Path) -> Option<FileStat>;

    /// List the entries of a directory (unsorted, without `.` and `..`)
    fn read_dir(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Resolve symlinks and relative components
    ///
    /// # Returns
    /// The canonical path, or `None` if `path` does not exist
    fn canonicalize(&self, path: &Path) -> Option<PathBuf>;

    /// Drop any cached state for `path`, or for everything when `None`.
    #[allow(unused_variables)]
    fn invalidate(&self, path: Option<&Path>) {}

    /// Check if path exists
    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_some()
    }

    /// Check if path exists and is a file
    fn is_file(&self, path: &Path) -> bool {
        self.metadata(path).is_some_and(|stat| stat.is_file())
    }

    /// Check if path exists and is a directory
    fn is_dir(&self, path: &Path) -> bool {
        self.metadata(path).is_some_and(|stat| stat.is_dir())
    }

    /// Modification time of an existing path
    fn modified(&self, path: &Path) -> Option<SystemTime> {
        self.metadata(path).and_then(|stat| stat.modified)
    }

    /// Names of the sub-directories of `path`; empty if it is not a directory
    fn dirs(&self, path: &Path) -> Vec<String> {
        list_kind(self, path, EntryKind::Dir)
    }

    /// Names of the files in `path`; empty if it is not a directory
    fn files(&self, path: &Path) -> Vec<String> {
        list_kind(self, path, EntryKind::File)
    }
}

fn list_kind<F: VirtualFileSystem + ?Sized>(fs: &F, path: &Path, kind: EntryKind) -> Vec<String> {
    let mut names: Vec<String> = fs
        .read_dir(path)
        .map(|entries| {
            entries
                .into_iter()
                .filter(|entry| entry.kind == kind)
                .map(|entry| entry.name)
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_entries_sort_by_name_then_kind() {
        let entry = |name: &str, kind| DirEntry {
            name: name.into(),
            kind,
        };
        let mut entries = vec![
            entry("sub", EntryKind::Dir),
            entry("a.c", EntryKind::File),
            entry("sub", EntryKind::File),
        ];
        entries.sort();
        assert_eq!(
            entries,
            vec![
                entry("a.c", EntryKind::File),
                entry("sub", EntryKind::File),
                entry("sub", EntryKind::Dir),
            ]
        );
        assert!(EntryKind::File < EntryKind::Dir);
    }
}
