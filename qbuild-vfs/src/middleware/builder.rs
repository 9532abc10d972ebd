use super::{LayeredVFS, Middleware};
use crate::VirtualFileSystem;
use std::sync::Arc;

/// Assembles a [`LayeredVFS`] over one backend.
///
/// Layers may be added in any order; `build` sorts them by [`super::Stage`]
/// and keeps insertion order within a stage.
///
/// ```
/// use qbuild_vfs::middleware::{CachedLayer, VfsBuilder};
/// use qbuild_vfs::{MemoryFileSystem, VirtualFileSystem};
/// use std::path::Path;
///
/// let vfs = VfsBuilder::new(MemoryFileSystem::new())
///     .with(CachedLayer::new())
///     .build();
/// assert!(vfs.is_dir(Path::new("/")));
/// ```
pub struct VfsBuilder {
    backend: Arc<dyn VirtualFileSystem>,
    layers: Vec<Box<dyn Middleware>>,
}

impl VfsBuilder {
    pub fn new(backend: impl VirtualFileSystem + 'static) -> Self {
        VfsBuilder {
            backend: Arc::new(backend),
            layers: Vec::new(),
        }
    }

    pub fn with(mut self, layer: impl Middleware + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn build(mut self) -> LayeredVFS {
        self.layers.sort_by_key(|layer| layer.stage());
        LayeredVFS::new(self.backend, self.layers)
    }
}
