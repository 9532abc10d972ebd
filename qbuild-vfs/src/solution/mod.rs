//! Solution filesystem
//!
//! A solution maps an ordered list of (logical prefix, real directory)
//! entries into one logical namespace. The first entry is always the build
//! tree and has an empty prefix, so it covers every logical path.
//!
//! Requests may name another solution with a `name:` prefix (`current:`
//! means this one) and may escape to a real path with a leading `!`.
//! Lookups that find nothing return `None`; a missing file is an expected
//! outcome, not an error.

mod cursor;
mod descriptor;
mod dir;
mod file;
pub mod glob;
mod project;
mod registry;

pub use descriptor::SolutionDescriptor;
pub use dir::SolutionDir;
pub use file::{FileKind, SolutionFile};
pub use project::SolutionProject;
pub use registry::SolutionRegistry;

use crate::path::{clean_path, dir_name, file_name, is_relative};
use crate::VirtualFileSystem;
use cursor::Cursor;
use glob::{PathGlob, SimpleWildCard};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Weak};

/// How [`Solution::find_file`] binds a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Existing candidates, disambiguated by the deepest project marker
    Project,
    /// Always the build tree, existing or not
    Generated,
    /// First existing candidate, then an existing real path
    Existing,
}

bitflags::bitflags! {
    /// Which namespaces a glob lookup searches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Lookup: u8 {
        const PROJECT  = 1 << 0;
        const ABSOLUTE = 1 << 1;
        const WILDCARD = 1 << 2;
        const ALL = Self::PROJECT.bits() | Self::ABSOLUTE.bits() | Self::WILDCARD.bits();
    }
}

/// Extension includes discovered on the extension paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Includes {
    /// `common.pri` / `common_*.pri`, applied to every project
    pub common: Vec<SolutionFile>,
    /// `blank*.pri`, for directories without a project file
    pub blank: Vec<SolutionFile>,
    /// `disabled*.pri`, for disabled projects
    pub disabled: Vec<SolutionFile>,
    /// `default*.pri`, before a regular project file
    pub default: Vec<SolutionFile>,
}

/// A named logical namespace over real directories
pub struct Solution {
    name: String,
    dirs: RwLock<Arc<Vec<SolutionDir>>>,
    fs: Arc<dyn VirtualFileSystem>,
    marker: String,
    registry: Weak<SolutionRegistry>,
    includes: OnceCell<Includes>,
}

impl std::fmt::Debug for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solution")
            .field("name", &self.name)
            .field("dirs", &self.mappings())
            .finish()
    }
}

impl Solution {
    pub(crate) fn new(
        name: &str,
        dirs: Vec<SolutionDir>,
        fs: Arc<dyn VirtualFileSystem>,
        marker: &str,
        registry: Weak<SolutionRegistry>,
    ) -> Self {
        Self {
            name: name.to_string(),
            dirs: RwLock::new(Arc::new(dirs)),
            fs,
            marker: marker.to_string(),
            registry,
            includes: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fs(&self) -> &dyn VirtualFileSystem {
        &*self.fs
    }

    /// File name marking a project directory
    pub fn project_marker(&self) -> &str {
        &self.marker
    }

    /// Snapshot of the mapping table, build entry first
    pub fn mappings(&self) -> Arc<Vec<SolutionDir>> {
        Arc::clone(&self.dirs.read())
    }

    /// Append a mapping entry. Only valid during startup, before any project
    /// is evaluated.
    pub fn add_path(&self, location: &str, path: &str) {
        let mut dirs = self.dirs.write();
        let mut next = Vec::clone(&dirs);
        next.push(SolutionDir::new(location, path));
        *dirs = Arc::new(next);
    }

    /// Human-readable mapping table
    pub fn dump(&self) -> String {
        self.mappings()
            .iter()
            .map(|dir| format!("    {:?} -> {:?}\n", dir.location(), dir.path()))
            .collect()
    }

    fn sibling(&self, name: &str) -> Option<Arc<Solution>> {
        self.registry.upgrade()?.get(name)
    }

    fn build_root(&self) -> Option<String> {
        self.mappings().first().map(|dir| dir.path().to_string())
    }

    /// Resolve `id` to a file in this solution.
    ///
    /// Relative ids resolve against `relative`'s logical directory; with no
    /// `relative` they are taken from the root.
    pub fn find_file(
        &self,
        id: &str,
        mode: FileMode,
        relative: Option<&SolutionFile>,
    ) -> Option<SolutionFile> {
        if let Some(rel) = relative {
            if rel.solution != self.name {
                return self.sibling(&rel.solution)?.find_file(id, mode, relative);
            }
        }

        let original = id.trim();
        if original.starts_with('!') {
            return self.find_abs_file(original, relative, mode == FileMode::Existing);
        }

        let mut request = original.to_string();
        if let Some((solution, path)) = split_solution(original) {
            if solution != "current" {
                return self.sibling(solution)?.find_file(path, mode, None);
            }
            request = path.to_string();
        }

        request = if is_relative(&request) {
            match relative {
                Some(rel) => {
                    let base = match rel.request.rfind('/') {
                        Some(idx) => &rel.request[..=idx],
                        None => "/",
                    };
                    clean_request(&format!("{base}/{request}"))
                }
                None => clean_path(&format!("/{request}")),
            }
        } else {
            clean_path(&request)
        };

        if request.starts_with('!') {
            return self.find_abs_file(&request, relative, mode == FileMode::Existing);
        }

        let dirs = self.mappings();
        let count = dirs.len();
        // Source entries first, the build entry last
        let rotated = (0..count).map(|ii| (ii + 1) % count);

        match mode {
            FileMode::Project => {
                let mut best: Option<(usize, SolutionFile)> = None;
                for index in rotated {
                    let Some(mapped) = dirs[index].mapped_path(&request) else {
                        continue;
                    };
                    if !self.fs.exists(Path::new(&mapped)) {
                        continue;
                    }
                    let Some(depth) = self.marker_depth(&mapped) else {
                        continue;
                    };
                    if best.as_ref().map_or(true, |(longest, _)| depth > *longest) {
                        let file = self.mapped_file(index, count, &request, mapped);
                        best = Some((depth, file));
                    }
                }
                best.map(|(_, file)| file)
            }
            FileMode::Existing => {
                for index in rotated {
                    if let Some(mapped) = dirs[index].mapped_path(&request) {
                        if self.fs.exists(Path::new(&mapped)) {
                            return Some(self.mapped_file(index, count, &request, mapped));
                        }
                    }
                }
                self.find_abs_file(original, relative, true)
            }
            FileMode::Generated => {
                let mapped = clean_path(&format!("{}/{}", dirs.first()?.path(), request));
                Some(SolutionFile::new(FileKind::Build, &self.name, request, mapped))
            }
        }
    }

    fn mapped_file(&self, index: usize, count: usize, request: &str, mapped: String) -> SolutionFile {
        let kind = match (index, count) {
            (0, 1) => FileKind::ProjectBuild,
            (0, _) => FileKind::Build,
            _ => FileKind::Project,
        };
        SolutionFile::new(kind, &self.name, request, mapped)
    }

    /// Length of the deepest ancestor of `real` containing the project
    /// marker, checked from the closest ancestor outwards.
    fn marker_depth(&self, real: &str) -> Option<usize> {
        let mut dir = if self.fs.is_dir(Path::new(real)) {
            real.to_string()
        } else {
            dir_name(real)
        };
        while !dir.is_empty() {
            let marker = crate::path::join(&dir, &self.marker);
            if self.fs.is_file(Path::new(&marker)) {
                return Some(dir.len());
            }
            if dir == "/" {
                break;
            }
            dir = dir_name(&dir);
        }
        None
    }

    /// Resolve `req` (with or without the leading `!`) as a real path.
    ///
    /// Relative paths resolve against `relative`'s real directory.
    pub fn find_abs_file(
        &self,
        req: &str,
        relative: Option<&SolutionFile>,
        must_exist: bool,
    ) -> Option<SolutionFile> {
        let request = req.strip_prefix('!').unwrap_or(req);
        let real = if is_relative(request) {
            match relative {
                Some(rel) => {
                    let base = match rel.fs_path.rfind('/') {
                        Some(idx) => &rel.fs_path[..=idx],
                        None => "/",
                    };
                    clean_path(&format!("{base}/{request}"))
                }
                None => clean_path(&format!("/{request}")),
            }
        } else {
            clean_path(request)
        };

        if must_exist && !self.fs.exists(Path::new(&real)) {
            return None;
        }
        Some(SolutionFile::new(
            FileKind::Absolute,
            &self.name,
            format!("!{real}"),
            real,
        ))
    }

    /// Logical absolute path for `name`, resolving relative names against
    /// `relative`. `None` for a relative name without context.
    fn absolute_request(&self, name: &str, relative: Option<&SolutionFile>) -> Option<String> {
        if is_relative(name) {
            let rel = relative?;
            Some(clean_path(&format!("{}/{}", rel.solution_dir(), name)))
        } else {
            Some(clean_path(name))
        }
    }

    fn absolute_real(&self, name: &str, relative: Option<&SolutionFile>) -> Option<String> {
        if is_relative(name) {
            let rel = relative?;
            Some(clean_path(&format!("{}/{}", rel.fs_dir(), name)))
        } else {
            Some(clean_path(name))
        }
    }

    /// The build-tree file for `name`; it may not exist.
    pub fn build_file(&self, name: &str, relative: Option<&SolutionFile>) -> Option<SolutionFile> {
        if let Some((solution, path)) = split_solution(name) {
            if solution != "current" {
                return self.sibling(solution)?.build_file(path, None);
            }
            return self.build_file(path, relative);
        }
        let request = self.absolute_request(name, relative)?;
        let real = clean_path(&format!("{}{}", self.build_root()?, request));
        Some(SolutionFile::new(FileKind::Build, &self.name, request, real))
    }

    /// Real build-tree path for `name`; it may not exist.
    pub fn filesystem_build_path(&self, name: &str, relative: Option<&SolutionFile>) -> Option<String> {
        self.build_file(name, relative).map(|file| file.fs_path)
    }

    /// First file matching `name`.
    pub fn file(&self, name: &str, lookup: Lookup, relative: Option<&SolutionFile>) -> Option<SolutionFile> {
        self.files(name, lookup, relative).into_iter().next()
    }

    /// All files matching `name`, deduplicated by real path.
    ///
    /// Without [`Lookup::WILDCARD`] only the last path segment is a pattern.
    pub fn files(&self, name: &str, lookup: Lookup, relative: Option<&SolutionFile>) -> Vec<SolutionFile> {
        let (name, lookup) = match self.dispatch(name, lookup) {
            Dispatch::Local(name, lookup) => (name, lookup),
            Dispatch::Other(solution, name) => return solution.files(&name, lookup, None),
            Dispatch::Missing => return Vec::new(),
        };

        let dirs = self.mappings();
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut collect = |files: Vec<SolutionFile>| {
            for file in files {
                if seen.insert(file.fs_path.clone()) {
                    found.push(file);
                }
            }
        };

        if lookup.contains(Lookup::PROJECT) {
            if let Some(request) = self.absolute_request(&name, relative) {
                let cursor = Cursor::logical(self, &dirs);
                if lookup.contains(Lookup::WILDCARD) {
                    collect(self.files_recur(&cursor, &PathGlob::new(&request), 0));
                } else if let Some(cursor) = cursor.advance(&dir_name(&request)) {
                    collect(cursor.files(Some(file_name(&request))));
                }
            }
        }

        if lookup.contains(Lookup::ABSOLUTE) {
            if let Some(real) = self.absolute_real(&name, relative) {
                if lookup.contains(Lookup::WILDCARD) {
                    if let Some(cursor) = Cursor::real(self, "/") {
                        collect(self.files_recur(&cursor, &PathGlob::new(&real), 0));
                    }
                } else if self.fs.is_file(Path::new(&real)) {
                    collect(vec![SolutionFile::new(
                        FileKind::Absolute,
                        &self.name,
                        format!("!{real}"),
                        real,
                    )]);
                }
            }
        }

        found
    }

    /// Directories matching `name`, one entry per real directory.
    pub fn dirs(&self, name: &str, lookup: Lookup, relative: Option<&SolutionFile>) -> Vec<SolutionFile> {
        let (name, lookup) = match self.dispatch(name, lookup) {
            Dispatch::Local(name, lookup) => (name, lookup),
            Dispatch::Other(solution, name) => return solution.dirs(&name, lookup, None),
            Dispatch::Missing => return Vec::new(),
        };

        let dirs = self.mappings();
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut collect = |files: Vec<SolutionFile>| {
            for file in files {
                if seen.insert(file.fs_path.clone()) {
                    found.push(file);
                }
            }
        };

        if lookup.contains(Lookup::PROJECT) {
            if let Some(request) = self.absolute_request(&name, relative) {
                let cursor = Cursor::logical(self, &dirs);
                if lookup.contains(Lookup::WILDCARD) {
                    collect(self.dirs_recur(&cursor, &PathGlob::new(&request), 0));
                } else if let Some(cursor) = cursor.advance(&request) {
                    let existing = cursor
                        .fs_paths()
                        .into_iter()
                        .filter(|real| self.fs.is_dir(Path::new(real)))
                        .map(|real| {
                            SolutionFile::new(FileKind::Project, &self.name, cursor.path(), real).dir()
                        })
                        .collect();
                    collect(existing);
                }
            }
        }

        if lookup.contains(Lookup::ABSOLUTE) {
            if let Some(real) = self.absolute_real(&name, relative) {
                if lookup.contains(Lookup::WILDCARD) {
                    if let Some(cursor) = Cursor::real(self, "/") {
                        collect(self.dirs_recur(&cursor, &PathGlob::new(&real), 0));
                    }
                } else if self.fs.is_dir(Path::new(&real)) {
                    collect(vec![SolutionFile::new(
                        FileKind::Absolute,
                        &self.name,
                        format!("!{real}"),
                        real,
                    )
                    .dir()]);
                }
            }
        }

        found
    }

    /// Fully qualified paths matching `name`: logical paths for project
    /// matches, real paths for absolute ones.
    pub fn paths(&self, name: &str, lookup: Lookup, relative: Option<&SolutionFile>) -> Vec<String> {
        let (name, lookup) = match self.dispatch(name, lookup) {
            Dispatch::Local(name, lookup) => (name, lookup),
            Dispatch::Other(solution, name) => return solution.paths(&name, lookup, None),
            Dispatch::Missing => return Vec::new(),
        };

        let mut paths = Vec::new();
        if lookup.contains(Lookup::ABSOLUTE) {
            if let Some(real) = self.absolute_real(&name, relative) {
                if lookup.contains(Lookup::WILDCARD) {
                    if let Some(cursor) = Cursor::real(self, "/") {
                        paths.extend(self.paths_recur(&cursor, &PathGlob::new(&real), 0));
                    }
                } else if self.fs.is_dir(Path::new(&real)) {
                    paths.push(real);
                }
            }
        }

        if lookup.contains(Lookup::PROJECT) {
            if let Some(request) = self.absolute_request(&name, relative) {
                let dirs = self.mappings();
                let cursor = Cursor::logical(self, &dirs);
                if lookup.contains(Lookup::WILDCARD) {
                    paths.extend(self.paths_recur(&cursor, &PathGlob::new(&request), 0));
                } else if let Some(cursor) = cursor.advance(&request) {
                    paths.push(cursor.path());
                }
            }
        }
        paths
    }

    /// Immediate sub-directories of every path matching `name`.
    pub fn sub_paths(&self, name: &str, lookup: Lookup, relative: Option<&SolutionFile>) -> Vec<String> {
        let mut subs = Vec::new();
        if lookup.contains(Lookup::ABSOLUTE) {
            for real in self.paths(name, lookup - Lookup::PROJECT, relative) {
                if let Some(cursor) = Cursor::real(self, &real) {
                    for sub in cursor.paths(None) {
                        if let Some(next) = cursor.advance(&sub) {
                            subs.push(next.path());
                        }
                    }
                }
            }
        }
        if lookup.contains(Lookup::PROJECT) {
            let dirs = self.mappings();
            for logical in self.paths(name, lookup - Lookup::ABSOLUTE, relative) {
                if let Some(cursor) = Cursor::logical(self, &dirs).advance(&logical) {
                    for sub in cursor.paths(None) {
                        if let Some(next) = cursor.advance(&sub) {
                            subs.push(next.path());
                        }
                    }
                }
            }
        }
        subs
    }

    /// Real paths behind every path matching `name`.
    pub fn filesystem_paths(
        &self,
        name: &str,
        lookup: Lookup,
        relative: Option<&SolutionFile>,
    ) -> Vec<String> {
        let (name, lookup) = match name.strip_prefix('!') {
            Some(rest) => (rest, (lookup - Lookup::PROJECT) | Lookup::ABSOLUTE),
            None => (name, lookup),
        };
        let mut real = Vec::new();
        if lookup.contains(Lookup::ABSOLUTE) {
            real.extend(self.paths(name, lookup - Lookup::PROJECT, relative));
        }
        if lookup.contains(Lookup::PROJECT) {
            let dirs = self.mappings();
            for logical in self.paths(name, lookup - Lookup::ABSOLUTE, relative) {
                if let Some(cursor) = Cursor::logical(self, &dirs).advance(&logical) {
                    real.extend(cursor.fs_paths());
                }
            }
        }
        real
    }

    /// Sub-directory names of the logical directory `id`, including mount
    /// points of deeper mapping entries.
    pub fn child_dirs(&self, id: &str) -> Vec<String> {
        let mut path = id.to_string();
        if !path.ends_with('/') {
            path.push('/');
        }
        let dirs = self.mappings();
        let mut names = BTreeSet::new();
        for dir in dirs.iter() {
            if let Some(rest) = dir.location().strip_prefix(path.as_str()) {
                let child = rest.split('/').next().unwrap_or_default();
                if !child.is_empty() {
                    names.insert(child.to_string());
                }
            }
        }
        for dir in dirs.iter() {
            if let Some(mapped) = dir.mapped_path(&path) {
                names.extend(self.fs.dirs(Path::new(&mapped)));
            }
        }
        names.into_iter().collect()
    }

    /// Logical paths of the files matching `id`, where only the last
    /// segment may contain `*`. A leading `!` lists a real directory.
    pub fn list_files(&self, id: &str) -> Vec<String> {
        let (id, absolute) = match id.strip_prefix('!') {
            Some(rest) => (rest, true),
            None => (id, false),
        };
        let id = if id.starts_with('/') {
            id.to_string()
        } else {
            format!("/{id}")
        };
        let (dir, pattern) = match id.rfind('/') {
            Some(idx) => id.split_at(idx + 1),
            None => ("/", id.as_str()),
        };
        let wildcard = SimpleWildCard::new(pattern);
        let accept = |name: &String| pattern.is_empty() || wildcard.matches(name);

        let mut names = BTreeSet::new();
        if absolute {
            names.extend(self.fs.files(Path::new(dir)).into_iter().filter(accept));
        } else {
            for mapping in self.mappings().iter() {
                if let Some(mapped) = mapping.mapped_path(dir) {
                    names.extend(self.fs.files(Path::new(&mapped)).into_iter().filter(accept));
                }
            }
        }
        let prefix = if absolute { "!" } else { "" };
        names
            .into_iter()
            .map(|name| format!("{prefix}{dir}{name}"))
            .collect()
    }

    /// Every real path the logical path `id` maps to, existing or not.
    pub fn path_mappings(&self, id: &str) -> Vec<String> {
        self.mappings()
            .iter()
            .filter_map(|dir| dir.mapped_path(id))
            .collect()
    }

    /// Map a real absolute path into logical space by longest entry prefix,
    /// or to a `!` request when no entry covers it. `None` for relative paths.
    pub fn real_to_solution(&self, real: &str) -> Option<SolutionFile> {
        if is_relative(real) {
            return None;
        }
        let request = match self.longest_prefix(real) {
            Some((location, rest)) => logical_join(&location, &rest),
            None => format!("!{real}"),
        };
        Some(SolutionFile::new(FileKind::Project, &self.name, request, real))
    }

    /// Like [`Solution::real_to_solution`], but a real subtree whose tail
    /// matches the end of some entry's real path maps onto that entry's
    /// location. `<build>/devices/x/src/app` with an entry `/src ->
    /// /opt/devices/x/src` becomes `/src/app`.
    pub fn fuzzy_real_to_solution(&self, real: &str) -> Option<SolutionFile> {
        if is_relative(real) {
            return None;
        }
        let Some((location, tail)) = self.longest_prefix(real) else {
            return Some(SolutionFile::new(
                FileKind::Project,
                &self.name,
                format!("!{real}"),
                real,
            ));
        };

        let dirs = self.mappings();
        let mut request = logical_join(&location, &tail);
        let mut short = tail.as_str();
        'search: loop {
            for dir in dirs.iter() {
                if dir.path().ends_with(short) {
                    request = logical_join(dir.location(), &tail[short.len()..]);
                    break 'search;
                }
            }
            match short.rfind('/') {
                Some(idx) if idx > 0 => short = &short[..idx],
                _ => break,
            }
        }
        Some(SolutionFile::new(FileKind::Project, &self.name, request, real))
    }

    /// Entry location and remaining tail for the longest entry containing `real`.
    fn longest_prefix(&self, real: &str) -> Option<(String, String)> {
        let mut best: Option<(usize, String, String)> = None;
        for dir in self.mappings().iter() {
            let Some(rest) = strip_dir_prefix(real, dir.path()) else {
                continue;
            };
            if best.as_ref().map_or(true, |(len, _, _)| dir.path().len() > *len) {
                best = Some((dir.path().len(), dir.location().to_string(), rest.to_string()));
            }
        }
        best.map(|(_, location, rest)| (location, rest))
    }

    /// `file` with symlinks in its directory resolved, mapped back into
    /// logical space.
    pub fn canonical_path(&self, file: &SolutionFile) -> SolutionFile {
        let mut canonical = file.clone();
        let parent = dir_name(&file.fs_path);
        if parent.is_empty() {
            return canonical;
        }
        if let Some(dir) = self.fs.canonicalize(Path::new(&parent)) {
            let dir = dir.to_string_lossy().into_owned();
            canonical.fs_path = crate::path::join(&dir, file_name(&file.fs_path));
            if let Some(mapped) = self.fuzzy_real_to_solution(&canonical.fs_path) {
                canonical.request = mapped.request;
            }
        }
        canonical
    }

    /// Includes found on `extension_paths`, scanned once per solution.
    pub fn includes(&self, extension_paths: &[String]) -> &Includes {
        self.includes.get_or_init(|| {
            let mut includes = Includes::default();
            for extension in extension_paths {
                for file in self.list_files(&format!("{extension}/*")) {
                    if !file.ends_with(".pri") {
                        continue;
                    }
                    let stem = &file[extension.len()..];
                    let bucket = if stem.starts_with("/common_") || stem == "/common.pri" {
                        &mut includes.common
                    } else if stem.starts_with("/blank_") || stem == "/blank.pri" {
                        &mut includes.blank
                    } else if stem.starts_with("/disabled_") || stem == "/disabled.pri" {
                        &mut includes.disabled
                    } else if stem.starts_with("/default_") || stem == "/default.pri" {
                        &mut includes.default
                    } else {
                        continue;
                    };
                    if let Some(found) = self.find_file(&file, FileMode::Existing, None) {
                        bucket.push(found);
                    }
                }
            }
            includes
        })
    }

    fn dispatch(&self, name: &str, lookup: Lookup) -> Dispatch {
        let mut name = name.to_string();
        if let Some((solution, path)) = split_solution(&name) {
            if solution != "current" {
                return match self.sibling(solution) {
                    Some(other) => Dispatch::Other(other, path.to_string()),
                    None => Dispatch::Missing,
                };
            }
            name = path.to_string();
        }
        match name.strip_prefix('!') {
            Some(rest) => Dispatch::Local(rest.to_string(), (lookup - Lookup::PROJECT) | Lookup::ABSOLUTE),
            None => Dispatch::Local(name, lookup),
        }
    }

    fn files_recur(&self, cursor: &Cursor<'_>, glob: &PathGlob, depth: usize) -> Vec<SolutionFile> {
        if glob.depth() == 0 {
            return Vec::new();
        }
        if depth == glob.depth() - 1 {
            return cursor.files(Some(glob.word(depth)));
        }
        self.descend(cursor, glob, depth)
            .into_iter()
            .flat_map(|next| self.files_recur(&next, glob, depth + 1))
            .collect()
    }

    fn dirs_recur(&self, cursor: &Cursor<'_>, glob: &PathGlob, depth: usize) -> Vec<SolutionFile> {
        if depth == glob.depth() {
            let kind = if cursor.is_logical() {
                FileKind::Project
            } else {
                FileKind::Absolute
            };
            let request = if cursor.is_logical() {
                cursor.path()
            } else {
                format!("!{}", cursor.path())
            };
            return cursor
                .fs_paths()
                .into_iter()
                .map(|real| SolutionFile::new(kind, &self.name, request.clone(), real).dir())
                .collect();
        }
        self.descend(cursor, glob, depth)
            .into_iter()
            .flat_map(|next| self.dirs_recur(&next, glob, depth + 1))
            .collect()
    }

    fn paths_recur(&self, cursor: &Cursor<'_>, glob: &PathGlob, depth: usize) -> Vec<String> {
        if depth == glob.depth() {
            return vec![cursor.path()];
        }
        self.descend(cursor, glob, depth)
            .into_iter()
            .flat_map(|next| self.paths_recur(&next, glob, depth + 1))
            .collect()
    }

    /// Cursors for every directory matching glob word `depth`.
    fn descend<'a>(&self, cursor: &Cursor<'a>, glob: &PathGlob, depth: usize) -> Vec<Cursor<'a>> {
        if glob.is_const(depth) {
            return cursor.advance(&unescape(glob.word(depth))).into_iter().collect();
        }
        cursor
            .paths(Some(glob.word(depth)))
            .iter()
            .filter_map(|name| cursor.advance(name))
            .collect()
    }
}

enum Dispatch {
    Local(String, Lookup),
    Other(Arc<Solution>, String),
    Missing,
}

/// Split `sln:path` when the colon precedes the first separator.
pub fn split_solution(name: &str) -> Option<(&str, &str)> {
    let colon = name.find(':')?;
    match name.find('/') {
        Some(slash) if slash < colon => None,
        _ => Some((&name[..colon], &name[colon + 1..])),
    }
}

/// Remainder of `real` below directory `base` (empty or `/`-prefixed).
fn strip_dir_prefix<'a>(real: &'a str, base: &str) -> Option<&'a str> {
    if base == "/" {
        return Some(real);
    }
    let rest = real.strip_prefix(base)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

fn logical_join(location: &str, tail: &str) -> String {
    let joined = format!("{location}{tail}");
    if joined.is_empty() {
        "/".to_string()
    } else {
        joined
    }
}

/// `clean_path` that keeps a leading `!` marker.
fn clean_request(request: &str) -> String {
    match request.strip_prefix('!') {
        Some(rest) => format!("!{}", clean_path(rest)),
        None => clean_path(request),
    }
}

fn unescape(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut chars = word.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryFileSystem;

    fn fixture() -> Arc<SolutionRegistry> {
        let fs = MemoryFileSystem::with_files([
            ("/real/src/x.h", Vec::new()),
            ("/real/src/app/qbuild.pro", Vec::new()),
            ("/real/src/app/main.c", Vec::new()),
            ("/real/src/app/util.c", Vec::new()),
            ("/build/src/app/moc_main.c", Vec::new()),
            ("/build/src/gen.h", Vec::new()),
        ]);
        let registry = SolutionRegistry::new(Arc::new(fs), "qbuild.pro");
        registry.create(
            "default",
            vec![SolutionDir::new("", "/build"), SolutionDir::new("/src", "/real/src")],
        );
        registry
    }

    #[test]
    fn test_existing_prefers_source_entry() {
        let registry = fixture();
        let sln = registry.default_solution().unwrap();

        let file = sln.find_file("/src/x.h", FileMode::Existing, None).unwrap();
        assert_eq!(file.fs_path(), "/real/src/x.h");
        assert_eq!(file.kind(), FileKind::Project);

        // Only in the build tree: the rotation wraps back to it
        let gen = sln.find_file("/src/gen.h", FileMode::Existing, None).unwrap();
        assert_eq!(gen.fs_path(), "/build/src/gen.h");
        assert_eq!(gen.kind(), FileKind::Build);

        assert!(sln.find_file("/src/missing.h", FileMode::Existing, None).is_none());
    }

    #[test]
    fn test_generated_binds_to_build_tree() {
        let registry = fixture();
        let sln = registry.default_solution().unwrap();
        let file = sln.find_file("/src/x.h", FileMode::Generated, None).unwrap();
        assert_eq!(file.fs_path(), "/build/src/x.h");
        assert_eq!(file.kind(), FileKind::Build);
    }

    #[test]
    fn test_relative_request() {
        let registry = fixture();
        let sln = registry.default_solution().unwrap();
        let pro = sln.find_file("/src/app/qbuild.pro", FileMode::Existing, None).unwrap();

        let main = sln.find_file("main.c", FileMode::Existing, Some(&pro)).unwrap();
        assert_eq!(main.solution_path(), "/src/app/main.c");
        let up = sln.find_file("../x.h", FileMode::Existing, Some(&pro)).unwrap();
        assert_eq!(up.fs_path(), "/real/src/x.h");
        // Without context the request is rooted
        assert!(sln.find_file("main.c", FileMode::Existing, None).is_none());
    }

    #[test]
    fn test_project_mode_picks_deepest_marker() {
        let fs = MemoryFileSystem::with_files([
            ("/a/qbuild.pro", Vec::new()),
            ("/a/lib/f.c", Vec::new()),
            ("/b/lib/qbuild.pro", Vec::new()),
            ("/b/lib/f.c", Vec::new()),
        ]);
        let registry = SolutionRegistry::new(Arc::new(fs), "qbuild.pro");
        let sln = registry.create(
            "default",
            vec![
                SolutionDir::new("", "/out"),
                SolutionDir::new("", "/a"),
                SolutionDir::new("", "/b"),
            ],
        );
        let file = sln.find_file("/lib/f.c", FileMode::Project, None).unwrap();
        assert_eq!(file.fs_path(), "/b/lib/f.c");
        assert!(sln.find_file("/lib/none.c", FileMode::Project, None).is_none());
    }

    #[test]
    fn test_absolute_escape() {
        let registry = fixture();
        let sln = registry.default_solution().unwrap();
        let file = sln.find_file("!/real/src/x.h", FileMode::Existing, None).unwrap();
        assert_eq!(file.kind(), FileKind::Absolute);
        assert_eq!(file.solution_path(), "!/real/src/x.h");
        assert!(sln.find_file("!/nope", FileMode::Existing, None).is_none());
        assert!(sln.find_file("!/nope", FileMode::Generated, None).is_some());
    }

    #[test]
    fn test_files_glob_dedups_and_types() {
        let registry = fixture();
        let sln = registry.default_solution().unwrap();

        let files = sln.files("/src/app/*.c", Lookup::PROJECT | Lookup::WILDCARD, None);
        let names: Vec<&str> = files.iter().map(|f| f.solution_path()).collect();
        assert_eq!(names, vec!["/src/app/moc_main.c", "/src/app/main.c", "/src/app/util.c"]);
        assert_eq!(files[0].kind(), FileKind::Build);
        assert_eq!(files[1].kind(), FileKind::Project);

        let deep = sln.files("/*/app/qbuild.pro", Lookup::PROJECT | Lookup::WILDCARD, None);
        assert_eq!(deep.len(), 1);
        assert_eq!(deep[0].fs_path(), "/real/src/app/qbuild.pro");

        let exact = sln.file("/src/app/main.c", Lookup::PROJECT, None).unwrap();
        assert_eq!(exact.fs_path(), "/real/src/app/main.c");
    }

    #[test]
    fn test_dirs_and_paths() {
        let registry = fixture();
        let sln = registry.default_solution().unwrap();

        let dirs = sln.dirs("/src/app", Lookup::PROJECT, None);
        let real: Vec<&str> = dirs.iter().map(|d| d.fs_path()).collect();
        assert_eq!(real, vec!["/build/src/app", "/real/src/app"]);

        assert_eq!(sln.paths("/s*", Lookup::PROJECT | Lookup::WILDCARD, None), vec!["/src"]);
        assert_eq!(sln.child_dirs("/"), vec!["src".to_string()]);
        assert_eq!(sln.child_dirs("/src"), vec!["app".to_string()]);
        assert_eq!(sln.sub_paths("/src", Lookup::PROJECT, None), vec!["/src/app".to_string()]);
        assert_eq!(
            sln.filesystem_paths("/src/app", Lookup::PROJECT, None),
            vec!["/build/src/app".to_string(), "/real/src/app".to_string()]
        );
    }

    #[test]
    fn test_list_files_simple_wildcard() {
        let registry = fixture();
        let sln = registry.default_solution().unwrap();
        assert_eq!(
            sln.list_files("/src/app/m*"),
            vec!["/src/app/main.c".to_string(), "/src/app/moc_main.c".to_string()]
        );
        assert_eq!(sln.list_files("!/real/src/*.h"), vec!["!/real/src/x.h".to_string()]);
    }

    #[test]
    fn test_build_file() {
        let registry = fixture();
        let sln = registry.default_solution().unwrap();
        let file = sln.build_file("/src/out.o", None).unwrap();
        assert_eq!(file.fs_path(), "/build/src/out.o");
        assert!(sln.build_file("out.o", None).is_none());

        let pro = sln.find_file("/src/app/qbuild.pro", FileMode::Existing, None).unwrap();
        assert_eq!(
            sln.filesystem_build_path("obj/a.o", Some(&pro)).as_deref(),
            Some("/build/src/app/obj/a.o")
        );
    }

    #[test]
    fn test_real_to_solution() {
        let registry = fixture();
        let sln = registry.default_solution().unwrap();
        assert_eq!(sln.real_to_solution("/real/src/app").unwrap().solution_path(), "/src/app");
        assert_eq!(sln.real_to_solution("/build/src").unwrap().solution_path(), "/src");
        assert_eq!(sln.real_to_solution("/build").unwrap().solution_path(), "/");
        assert_eq!(sln.real_to_solution("/etc/passwd").unwrap().solution_path(), "!/etc/passwd");
        assert!(sln.real_to_solution("relative/path").is_none());
        // Prefix matches respect path components
        assert_eq!(sln.real_to_solution("/builder").unwrap().solution_path(), "!/builder");
    }

    #[test]
    fn test_fuzzy_real_to_solution() {
        let fs = MemoryFileSystem::new();
        let registry = SolutionRegistry::new(Arc::new(fs), "qbuild.pro");
        let sln = registry.create(
            "default",
            vec![
                SolutionDir::new("", "/build"),
                SolutionDir::new("/src", "/opt/devices/x/src"),
            ],
        );
        let mapped = sln.fuzzy_real_to_solution("/build/devices/x/src/app").unwrap();
        assert_eq!(mapped.solution_path(), "/src/app");
        let plain = sln.real_to_solution("/build/devices/x/src/app").unwrap();
        assert_eq!(plain.solution_path(), "/devices/x/src/app");
    }

    #[test]
    fn test_canonical_path_through_symlink() {
        let fs = MemoryFileSystem::with_files([("/real/src/app/main.c", Vec::new())]);
        fs.symlink("/real/src/link", "/real/src/app").unwrap();
        let registry = SolutionRegistry::new(Arc::new(fs), "qbuild.pro");
        let sln = registry.create(
            "default",
            vec![SolutionDir::new("", "/build"), SolutionDir::new("/src", "/real/src")],
        );
        let linked = sln.find_file("/src/link/main.c", FileMode::Existing, None).unwrap();
        let canonical = sln.canonical_path(&linked);
        assert_eq!(canonical.fs_path(), "/real/src/app/main.c");
        assert_eq!(canonical.solution_path(), "/src/app/main.c");
    }

    #[test]
    fn test_includes_scan() {
        let fs = MemoryFileSystem::with_files([
            ("/ext/common.pri", Vec::new()),
            ("/ext/common_qt.pri", Vec::new()),
            ("/ext/blank.pri", Vec::new()),
            ("/ext/default_x.pri", Vec::new()),
            ("/ext/other.pri", Vec::new()),
            ("/ext/common.txt", Vec::new()),
        ]);
        let registry = SolutionRegistry::new(Arc::new(fs), "qbuild.pro");
        let sln = registry.create("default", vec![SolutionDir::new("", "/")]);
        let includes = sln.includes(&["/ext".to_string()]);
        let common: Vec<&str> = includes.common.iter().map(|f| f.solution_path()).collect();
        assert_eq!(common, vec!["/ext/common.pri", "/ext/common_qt.pri"]);
        assert_eq!(includes.blank.len(), 1);
        assert_eq!(includes.default.len(), 1);
        assert!(includes.disabled.is_empty());
    }

    #[test]
    fn test_split_solution() {
        assert_eq!(split_solution("other:/src/x"), Some(("other", "/src/x")));
        assert_eq!(split_solution("/src/a:b"), None);
        assert_eq!(split_solution("current:rel"), Some(("current", "rel")));
        assert_eq!(split_solution("plain"), None);
    }

    #[test]
    fn test_cross_solution_dispatch() {
        let fs = MemoryFileSystem::with_files([("/other/x.h", Vec::new())]);
        let registry = SolutionRegistry::new(Arc::new(fs), "qbuild.pro");
        let main = registry.create("default", vec![SolutionDir::new("", "/main")]);
        registry.create("other", vec![SolutionDir::new("", "/other")]);

        let file = main.find_file("other:/x.h", FileMode::Existing, None).unwrap();
        assert_eq!(file.solution(), "other");
        assert_eq!(file.fs_path(), "/other/x.h");
        assert!(main.find_file("nope:/x.h", FileMode::Existing, None).is_none());
    }
}
