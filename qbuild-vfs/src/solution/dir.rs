//! A single (logical prefix, real directory) mapping entry

use crate::path::clean_path;

/// Maps the logical subtree under `location` onto the real directory `path`.
///
/// An empty location matches every request; the build entry of a solution
/// always has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionDir {
    location: String,
    path: String,
}

impl SolutionDir {
    pub fn new(location: impl Into<String>, path: impl Into<String>) -> Self {
        let mut location = location.into();
        if !location.is_empty() && !location.starts_with('/') {
            location.insert(0, '/');
        }
        Self {
            location,
            path: path.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Real path for the logical request `req`, if this entry covers it.
    pub fn mapped_path(&self, req: &str) -> Option<String> {
        if self.location.is_empty() {
            return Some(clean_path(&format!("{}/{}", self.path, req)));
        }
        let rest = req.strip_prefix(self.location.as_str())?;
        if !rest.starts_with('/') {
            return None;
        }
        Some(clean_path(&format!("{}/{}", self.path, rest)))
    }
}
