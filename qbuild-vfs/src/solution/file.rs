//! Resolved files in the solution namespace

use crate::path::{dir_name, file_name};

/// Where a resolved file lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// A real path outside the mapping table (`!`-prefixed request)
    Absolute,
    /// Found in a source mapping entry
    Project,
    /// Bound to the build tree
    Build,
    /// The build tree is also the only source tree
    ProjectBuild,
}

impl FileKind {
    pub fn is_project(self) -> bool {
        matches!(self, FileKind::Project | FileKind::ProjectBuild)
    }

    pub fn is_build(self) -> bool {
        matches!(self, FileKind::Build | FileKind::ProjectBuild)
    }
}

/// A file or directory resolved through a [`super::Solution`]
///
/// Carries both the logical request path and the real path it mapped to.
/// Lookups that find nothing return `None` instead of an invalid file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionFile {
    pub(crate) kind: FileKind,
    pub(crate) solution: String,
    pub(crate) request: String,
    pub(crate) fs_path: String,
    pub(crate) is_dir: bool,
}

impl SolutionFile {
    pub(crate) fn new(
        kind: FileKind,
        solution: &str,
        request: impl Into<String>,
        fs_path: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            solution: solution.to_string(),
            request: request.into(),
            fs_path: fs_path.into(),
            is_dir: false,
        }
    }

    pub(crate) fn dir(mut self) -> Self {
        self.is_dir = true;
        self
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Name of the owning solution
    pub fn solution(&self) -> &str {
        &self.solution
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Last component of the logical path
    pub fn name(&self) -> &str {
        file_name(&self.request)
    }

    /// Logical path, `!`-prefixed for absolute files
    pub fn solution_path(&self) -> &str {
        &self.request
    }

    /// Logical directory containing this file (the path itself for directories)
    pub fn solution_dir(&self) -> String {
        if self.is_dir {
            return self.request.clone();
        }
        match self.request.rfind('/') {
            Some(idx) => self.request[..idx].to_string(),
            None => self.request.clone(),
        }
    }

    /// Real path
    pub fn fs_path(&self) -> &str {
        &self.fs_path
    }

    /// Real directory containing this file (the path itself for directories)
    pub fn fs_dir(&self) -> String {
        if self.is_dir {
            return self.fs_path.clone();
        }
        match dir_name(&self.fs_path) {
            dir if dir.is_empty() => self.fs_path.clone(),
            dir => dir,
        }
    }
}

impl std::fmt::Display for SolutionFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}(Type: {:?}, Path: {}, Fs Path: {})",
            if self.is_dir { "Directory" } else { "File" },
            self.kind,
            self.request,
            self.fs_path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_accessors() {
        let file = SolutionFile::new(FileKind::Project, "default", "/src/app/main.c", "/real/src/app/main.c");
        assert_eq!(file.name(), "main.c");
        assert_eq!(file.solution_dir(), "/src/app");
        assert_eq!(file.fs_dir(), "/real/src/app");
        assert!(file.kind().is_project());
        assert!(!file.kind().is_build());
    }

    #[test]
    fn test_dir_accessors() {
        let dir = SolutionFile::new(FileKind::Build, "default", "/src", "/build/src").dir();
        assert_eq!(dir.solution_dir(), "/src");
        assert_eq!(dir.fs_dir(), "/build/src");
        assert!(dir.to_string().starts_with("Directory(Type: Build"));
    }
}
