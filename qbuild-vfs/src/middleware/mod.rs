//! Layers stacked on a file system backend.
//!
//! Production builds run [`LoggedLayer`] over [`CachedLayer`] over the native
//! backend, assembled with [`VfsBuilder`].

mod builder;
mod layered;
mod middleware;
mod stage;

pub mod cached;
pub mod logged;

pub use builder::VfsBuilder;
pub use cached::CachedLayer;
pub use layered::LayeredVFS;
pub use logged::LoggedLayer;
pub use middleware::{Middleware, Next};
pub use stage::Stage;
