//! Project node resolution
//!
//! A project node is a logical directory path ending in `/`, optionally with
//! a `{file}` suffix selecting file mode:
//!
//! ```text
//! /hello/world.pri{file}/   file mode on an include file
//! /hello/world.pri/         a project file other than the marker
//! /hello/world/             the marker file inside /hello/world
//! ```

use super::{split_solution, FileMode, Solution, SolutionFile, SolutionRegistry};
use crate::path::clean_path;
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;

const FILE_SUFFIX: &str = "{file}";

/// A project identified by its node within a solution
#[derive(Clone)]
pub struct SolutionProject {
    solution: Arc<Solution>,
    node: String,
    node_path: String,
    file_name: String,
    file_mode: bool,
    file: Option<SolutionFile>,
    sub_projects: Arc<OnceCell<Vec<String>>>,
}

impl std::fmt::Debug for SolutionProject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolutionProject")
            .field("solution", &self.solution.name())
            .field("node", &self.node)
            .field("file", &self.file)
            .finish()
    }
}

impl PartialEq for SolutionProject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.solution, &other.solution) && self.node == other.node
    }
}

impl SolutionProject {
    /// Resolve `node` in `solution`.
    pub fn new(solution: Arc<Solution>, node: &str) -> Self {
        let mut project = Self {
            solution,
            node: String::new(),
            node_path: simplify_node_name(node),
            file_name: String::new(),
            file_mode: false,
            file: None,
            sub_projects: Arc::new(OnceCell::new()),
        };
        project.resolve(false);
        project
    }

    /// Parse `[solution:]path`; `current` or no prefix means `fallback`, and
    /// with no fallback the registry's default.
    pub fn from_node(
        registry: &SolutionRegistry,
        node: &str,
        fallback: Option<&Arc<Solution>>,
    ) -> Option<Self> {
        let (name, path) = split_node_name(node);
        let solution = match name {
            Some(name) if name != "current" => registry.get(name)?,
            _ => match fallback {
                Some(solution) => Arc::clone(solution),
                None => registry.default_solution()?,
            },
        };
        Some(Self::new(solution, path))
    }

    /// Like [`SolutionProject::from_node`], but a relative path is taken
    /// relative to `project`.
    pub fn from_node_relative(registry: &SolutionRegistry, node: &str, project: &SolutionProject) -> Option<Self> {
        let (name, path) = split_node_name(node);
        let solution = match name {
            Some(name) if name != "current" => registry.get(name)?,
            _ => Arc::clone(&project.solution),
        };
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", project.node_path(), path)
        };
        Some(Self::new(solution, &path))
    }

    fn resolve(&mut self, looped: bool) {
        let marker = self.solution.project_marker().to_string();
        let mut prime = self.node_path.clone();
        let mut direct = true;
        if prime.len() > 1 {
            prime.pop();
        } else {
            direct = false;
        }

        self.file_mode = false;
        if let Some(stripped) = prime.strip_suffix(FILE_SUFFIX) {
            self.file_mode = true;
            prime = stripped.to_string();
        }
        if let Some(stripped) = prime.strip_suffix('/') {
            direct = false;
            prime = stripped.to_string();
        }

        let fs = self.solution.fs();
        let direct_file = if direct {
            self.solution
                .find_file(&prime, FileMode::Existing, None)
                .filter(|file| fs.is_file(Path::new(file.fs_path())))
        } else {
            None
        };

        let suffix = if self.file_mode { "{file}/" } else { "" };
        match direct_file {
            Some(file) => {
                let idx = prime.rfind('/').map_or(0, |idx| idx + 1);
                let name = prime[idx..].to_string();
                self.node_path = prime[..idx].to_string();
                self.node = if name == marker {
                    format!("{}{}", self.node_path, suffix)
                } else if self.file_mode {
                    format!("{}{}{}", self.node_path, name, suffix)
                } else {
                    format!("{}{}/", self.node_path, name)
                };
                self.file_name = name;
                self.file = Some(file);
            }
            None => {
                self.file = self
                    .solution
                    .find_file(&format!("{prime}/{marker}"), FileMode::Existing, None);
                self.node = format!("{prime}/{suffix}");
                self.file_name = marker;
            }
        }

        // A project reached through a symlink is renamed after its real
        // location so both spellings share one cache entry.
        if looped {
            return;
        }
        let Some(file) = &self.file else {
            return;
        };
        let canonical = self.solution.canonical_path(file);
        if canonical.fs_path() != file.fs_path() {
            let request = canonical.solution_path();
            let request = request.strip_prefix('!').unwrap_or(request);
            let mut node_path = simplify_node_name(request);
            if self.file_mode {
                node_path = format!("{}{}/", node_path.trim_end_matches('/'), FILE_SUFFIX);
            }
            self.node_path = node_path;
            self.resolve(true);
        }
    }

    pub fn solution(&self) -> &Arc<Solution> {
        &self.solution
    }

    /// Unique node name, used as the project cache key
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Logical directory of the project, ending in `/`
    pub fn node_path(&self) -> &str {
        &self.node_path
    }

    /// Project file name within [`SolutionProject::node_path`]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_mode(&self) -> bool {
        self.file_mode
    }

    /// The project file, if one exists
    pub fn project_file(&self) -> Option<&SolutionFile> {
        self.file.as_ref()
    }

    /// This project switched into or out of file mode.
    pub fn with_file_mode(&self, file_mode: bool) -> Self {
        let mut project = self.clone();
        if project.file_mode == file_mode {
            return project;
        }
        project.file_mode = file_mode;
        project.sub_projects = Arc::new(OnceCell::new());
        if file_mode {
            if project.file_name == self.solution.project_marker() {
                project.node.push_str("{file}/");
            } else {
                project.node.pop();
                project.node.push_str("{file}/");
            }
        } else {
            let keep = project.node.len().saturating_sub(FILE_SUFFIX.len() + 1);
            project.node.truncate(keep);
            if !project.node.ends_with('/') {
                project.node.push('/');
            }
        }
        project
    }

    /// Same solution and nested under this project's directory
    pub fn is_subproject(&self, other: &SolutionProject) -> bool {
        Arc::ptr_eq(&self.solution, &other.solution) && other.node_path().starts_with(self.node_path())
    }

    /// Relative paths of the directories below this node that contain a
    /// project file somewhere underneath.
    pub fn sub_projects(&self) -> &[String] {
        self.sub_projects.get_or_init(|| {
            self.solution
                .child_dirs(&self.node)
                .into_iter()
                .filter(|dir| self.search(dir))
                .collect()
        })
    }

    pub fn sub_project(&self, name: &str) -> Self {
        Self::new(Arc::clone(&self.solution), &format!("{}/{}", self.node, name))
    }

    fn search(&self, project: &str) -> bool {
        let path = format!("{}{}", self.node, project);
        let marker = format!("{}/{}", path, self.solution.project_marker());
        if self
            .solution
            .find_file(&marker, FileMode::Existing, None)
            .is_some()
        {
            return true;
        }
        self.solution
            .child_dirs(&path)
            .iter()
            .any(|sub| self.search(&format!("{project}/{sub}")))
    }
}

/// Normalise a node name: leading and trailing `/`, no empty, `.` or `..`
/// components.
pub fn simplify_node_name(node: &str) -> String {
    let cleaned = clean_path(&format!("/{node}"));
    if cleaned == "/" {
        cleaned
    } else {
        format!("{cleaned}/")
    }
}

/// Split `[solution:]path`.
pub fn split_node_name(node: &str) -> (Option<&str>, &str) {
    match split_solution(node) {
        Some((solution, path)) => (Some(solution), path),
        None => (None, node),
    }
}
