//! In-memory file system implementation

use crate::error::{VfsError, VfsResult};
use crate::path::{clean_path, dir_name, file_name};
use crate::r#trait::{DirEntry, EntryKind, FileStat};
use crate::VirtualFileSystem;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Symlink resolution gives up after this many hops.
const MAX_LINK_DEPTH: usize = 16;

#[derive(Debug, Clone)]
enum Node {
    File {
        content: Vec<u8>,
        modified: SystemTime,
    },
    Dir,
    Link(String),
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<String, Node>,
}

/// An in-memory file system implementation.
///
/// Directories are created implicitly by writes. Modification times come from
/// a logical clock that advances one second per write, so freshness checks in
/// tests are deterministic.
///
/// # Example
/// ```
/// use qbuild_vfs::{MemoryFileSystem, VirtualFileSystem};
/// use std::path::Path;
///
/// let fs = MemoryFileSystem::new();
/// fs.write_file(Path::new("/src/main.c"), b"int main;").unwrap();
/// assert!(fs.is_dir(Path::new("/src")));
/// assert_eq!(fs.read_file(Path::new("/src/main.c")).unwrap(), b"int main;");
/// ```
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    inner: Arc<RwLock<Inner>>,
    clock: Arc<AtomicU64>,
}

impl MemoryFileSystem {
    /// Create a new file system containing only `/`.
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.nodes.insert("/".to_string(), Node::Dir);
        Self {
            inner: Arc::new(RwLock::new(inner)),
            clock: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Create a new memory file system pre-populated with files.
    ///
    /// # Arguments
    /// * `files` - Iterator of (path, content) tuples
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: AsRef<str>,
    {
        let fs = Self::new();
        for (path, content) in files {
            // Writes into a fresh tree cannot hit a file-as-parent conflict
            // unless the caller lists one, which is a test bug.
            fs.write_file(Path::new(path.as_ref()), &content).ok();
        }
        fs
    }

    /// Create a symlink at `link` pointing to the absolute path `target`.
    pub fn symlink(&self, link: &str, target: &str) -> VfsResult<()> {
        let link = normalize(Path::new(link))?;
        let mut inner = self.inner.write();
        ensure_parents(&mut inner, &link)?;
        inner.nodes.insert(link, Node::Link(clean_path(target)));
        Ok(())
    }

    /// Bump the modification time of an existing file, creating it empty if needed.
    pub fn touch(&self, path: &Path) -> VfsResult<()> {
        let key = self.resolve(&normalize(path)?);
        let now = self.tick();
        let mut inner = self.inner.write();
        match inner.nodes.get_mut(&key) {
            Some(Node::File { modified, .. }) => {
                *modified = now;
                Ok(())
            }
            Some(_) => Err(VfsError::WrongKind {
                path: key,
                expected: "file",
            }),
            None => {
                ensure_parents(&mut inner, &key)?;
                inner.nodes.insert(
                    key,
                    Node::File {
                        content: Vec::new(),
                        modified: now,
                    },
                );
                Ok(())
            }
        }
    }

    /// Force a file's modification time (seconds on the logical clock).
    pub fn set_modified(&self, path: &Path, seconds: u64) -> VfsResult<()> {
        let key = self.resolve(&normalize(path)?);
        let mut inner = self.inner.write();
        match inner.nodes.get_mut(&key) {
            Some(Node::File { modified, .. }) => {
                *modified = UNIX_EPOCH + Duration::from_secs(seconds);
                Ok(())
            }
            _ => Err(VfsError::NotFound { path: key }),
        }
    }

    /// Remove a file or an empty directory.
    pub fn remove(&self, path: &Path) -> VfsResult<()> {
        let key = normalize(path)?;
        let mut inner = self.inner.write();
        let prefix = format!("{key}/");
        if inner.nodes.keys().any(|k| k.starts_with(&prefix)) {
            return Err(VfsError::InvalidPath {
                path: key,
                reason: "directory not empty".into(),
            });
        }
        inner
            .nodes
            .remove(&key)
            .map(drop)
            .ok_or(VfsError::NotFound { path: key })
    }

    fn tick(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.clock.fetch_add(1, Ordering::Relaxed))
    }

    /// Follow symlinks in every prefix of `key`.
    fn resolve(&self, key: &str) -> String {
        let inner = self.inner.read();
        resolve_in(&inner, key)
    }
}

fn resolve_in(inner: &Inner, key: &str) -> String {
    let mut current = key.to_string();
    for _ in 0..MAX_LINK_DEPTH {
        let mut rewritten = None;
        let mut prefix = String::new();
        for part in current.split('/').filter(|p| !p.is_empty()) {
            prefix.push('/');
            prefix.push_str(part);
            if let Some(Node::Link(target)) = inner.nodes.get(&prefix) {
                let rest = &current[prefix.len()..];
                rewritten = Some(clean_path(&format!("{target}{rest}")));
                break;
            }
        }
        match rewritten {
            Some(next) => current = next,
            None => return current,
        }
    }
    current
}

fn normalize(path: &Path) -> VfsResult<String> {
    let text = path.to_string_lossy().replace('\\', "/");
    if !text.starts_with('/') {
        return Err(VfsError::InvalidPath {
            path: text,
            reason: "memory file system paths must be absolute".into(),
        });
    }
    Ok(clean_path(&text))
}

fn ensure_parents(inner: &mut Inner, key: &str) -> VfsResult<()> {
    let mut dir = dir_name(key);
    let mut missing = Vec::new();
    loop {
        match inner.nodes.get(&dir) {
            Some(Node::Dir) | Some(Node::Link(_)) => break,
            Some(Node::File { .. }) => {
                return Err(VfsError::WrongKind {
                    path: dir,
                    expected: "directory",
                })
            }
            None => {
                missing.push(dir.clone());
                dir = dir_name(&dir);
            }
        }
    }
    for dir in missing {
        inner.nodes.insert(dir, Node::Dir);
    }
    Ok(())
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFileSystem for MemoryFileSystem {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let key = self.resolve(&normalize(path)?);
        let inner = self.inner.read();
        match inner.nodes.get(&key) {
            Some(Node::File { content, .. }) => Ok(content.clone()),
            Some(_) => Err(VfsError::WrongKind {
                path: key,
                expected: "file",
            }),
            None => Err(VfsError::NotFound { path: key }),
        }
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        let key = self.resolve(&normalize(path)?);
        let modified = self.tick();
        let mut inner = self.inner.write();
        if matches!(inner.nodes.get(&key), Some(Node::Dir)) {
            return Err(VfsError::WrongKind {
                path: key,
                expected: "file",
            });
        }
        ensure_parents(&mut inner, &key)?;
        inner.nodes.insert(
            key,
            Node::File {
                content: content.to_vec(),
                modified,
            },
        );
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> VfsResult<()> {
        let key = self.resolve(&normalize(path)?);
        let mut inner = self.inner.write();
        match inner.nodes.get(&key) {
            Some(Node::Dir) => Ok(()),
            Some(_) => Err(VfsError::WrongKind {
                path: key,
                expected: "directory",
            }),
            None => {
                ensure_parents(&mut inner, &key)?;
                inner.nodes.insert(key, Node::Dir);
                Ok(())
            }
        }
    }

    fn metadata(&self, path: &Path) -> Option<FileStat> {
        let key = self.resolve(&normalize(path).ok()?);
        let inner = self.inner.read();
        match inner.nodes.get(&key)? {
            Node::File { modified, .. } => Some(FileStat {
                kind: EntryKind::File,
                modified: Some(*modified),
            }),
            Node::Dir => Some(FileStat {
                kind: EntryKind::Dir,
                modified: None,
            }),
            // Dangling link
            Node::Link(_) => None,
        }
    }

    fn read_dir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let key = self.resolve(&normalize(path)?);
        let inner = self.inner.read();
        match inner.nodes.get(&key) {
            Some(Node::Dir) => {}
            Some(_) => {
                return Err(VfsError::WrongKind {
                    path: key,
                    expected: "directory",
                })
            }
            None => return Err(VfsError::NotFound { path: key }),
        }
        let prefix = if key == "/" { key.clone() } else { format!("{key}/") };
        let mut entries = Vec::new();
        for (child, node) in inner.nodes.range(prefix.clone()..) {
            if !child.starts_with(&prefix) {
                break;
            }
            let rest = &child[prefix.len()..];
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
            let kind = match node {
                Node::File { .. } => EntryKind::File,
                Node::Dir => EntryKind::Dir,
                Node::Link(_) => match inner.nodes.get(&resolve_in(&inner, child)) {
                    Some(Node::File { .. }) => EntryKind::File,
                    Some(Node::Dir) => EntryKind::Dir,
                    _ => continue,
                },
            };
            entries.push(DirEntry {
                name: file_name(child).to_string(),
                kind,
            });
        }
        Ok(entries)
    }

    fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        let key = self.resolve(&normalize(path).ok()?);
        let inner = self.inner.read();
        match inner.nodes.get(&key)? {
            Node::Link(_) => None,
            _ => Some(PathBuf::from(key)),
        }
    }
}
