//! Errors raised by the backing store.

use std::io;
use std::path::Path;
use thiserror::Error;

pub type VfsResult<T> = Result<T, VfsError>;

/// Lookup misses in the solution layer are never errors; these come only
/// from operations that must touch the backing store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VfsError {
    #[error("Path not found: {path}")]
    NotFound { path: String },

    #[error("Permission denied: {path}")]
    PermissionDenied { path: String },

    /// Reading a directory as a file, or listing a file.
    #[error("Path '{path}' is not a {expected}")]
    WrongKind { path: String, expected: &'static str },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl VfsError {
    /// Map an `io::Error` raised for `path`.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        let path = path.display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound { path },
            io::ErrorKind::PermissionDenied => VfsError::PermissionDenied { path },
            _ => VfsError::Io {
                message: format!("{path}: {err}"),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound { .. })
    }
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        VfsError::Io {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_keeps_not_found() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let vfs = VfsError::from_io(err, Path::new("/a/b"));
        assert!(vfs.is_not_found());
        assert_eq!(vfs.to_string(), "Path not found: /a/b");
    }

    #[test]
    fn test_from_io_other_kinds() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        assert_eq!(
            VfsError::from_io(denied, Path::new("/etc")),
            VfsError::PermissionDenied {
                path: "/etc".into()
            }
        );

        let other = io::Error::new(io::ErrorKind::Other, "disk on fire");
        let err = VfsError::from_io(other, Path::new("/x"));
        assert_eq!(err.to_string(), "IO error: /x: disk on fire");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_display() {
        let err = VfsError::WrongKind {
            path: "/src".into(),
            expected: "file",
        };
        assert_eq!(err.to_string(), "Path '/src' is not a file");
    }
}
