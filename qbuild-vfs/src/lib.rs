//! File system access for QBuild.
//!
//! Everything the build reads or writes goes through [`VirtualFileSystem`]:
//! the real disk ([`NativeFileSystem`]) in production, [`MemoryFileSystem`]
//! in tests. The [`solution`] module maps the logical request paths used in
//! project files (`/src/app/main.cpp`) onto those backends, and
//! [`middleware`] adds stat caching and access logging on top.
//!
//! ```
//! use qbuild_vfs::{MemoryFileSystem, VirtualFileSystem};
//! use std::path::Path;
//!
//! let fs = MemoryFileSystem::new();
//! fs.write_file(Path::new("/src/qbuild.pro"), b"default.TYPE = RULE").unwrap();
//! assert!(fs.is_file(Path::new("/src/qbuild.pro")));
//! assert!(fs.is_dir(Path::new("/src")));
//! ```

mod error;
mod memory;
mod native;
mod r#trait;

pub mod middleware;
pub mod path;
pub mod solution;

pub use error::{VfsError, VfsResult};
pub use memory::MemoryFileSystem;
pub use native::NativeFileSystem;
pub use r#trait::{DirEntry, EntryKind, FileStat, VirtualFileSystem};
