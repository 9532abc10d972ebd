//! Directory cursor used by the glob walkers

use super::{FileKind, Solution, SolutionDir, SolutionFile};
use crate::solution::glob::fnmatch;
use std::collections::BTreeSet;
use std::path::Path;

/// A position in either the logical namespace (`dirs` set) or the real
/// filesystem (`dirs` unset). `abs` always ends with `/`.
#[derive(Clone)]
pub(crate) struct Cursor<'a> {
    solution: &'a Solution,
    dirs: Option<&'a [SolutionDir]>,
    abs: String,
}

impl<'a> Cursor<'a> {
    pub(crate) fn logical(solution: &'a Solution, dirs: &'a [SolutionDir]) -> Self {
        Self {
            solution,
            dirs: Some(dirs),
            abs: "/".to_string(),
        }
    }

    /// Cursor at a real directory; `None` if it is not a directory.
    pub(crate) fn real(solution: &'a Solution, abs: &str) -> Option<Self> {
        let mut abs = abs.to_string();
        if !abs.ends_with('/') {
            abs.push('/');
        }
        solution.fs().is_dir(Path::new(&abs)).then_some(Self {
            solution,
            dirs: None,
            abs,
        })
    }

    /// Current path without the trailing separator
    pub(crate) fn path(&self) -> String {
        self.abs[..self.abs.len() - 1].to_string()
    }

    pub(crate) fn is_logical(&self) -> bool {
        self.dirs.is_some()
    }

    /// Real directories behind the current path
    pub(crate) fn fs_paths(&self) -> Vec<String> {
        match self.dirs {
            Some(dirs) => dirs
                .iter()
                .filter_map(|dir| dir.mapped_path(&self.abs))
                .collect(),
            None => vec![self.path()],
        }
    }

    /// Files in the current directory whose names match `pattern`.
    pub(crate) fn files(&self, pattern: Option<&str>) -> Vec<SolutionFile> {
        let fs = self.solution.fs();
        let accept = |name: &str| pattern.map_or(true, |p| fnmatch(p, name));
        let name = self.solution.name();
        match self.dirs {
            Some(dirs) => {
                let mut found = Vec::new();
                for (index, dir) in dirs.iter().enumerate() {
                    let Some(mapped) = dir.mapped_path(&self.abs) else {
                        continue;
                    };
                    let kind = match (index, dirs.len()) {
                        (0, 1) => FileKind::ProjectBuild,
                        (0, _) => FileKind::Build,
                        _ => FileKind::Project,
                    };
                    for file in fs.files(Path::new(&mapped)) {
                        if accept(&file) {
                            found.push(SolutionFile::new(
                                kind,
                                name,
                                format!("{}{}", self.abs, file),
                                format!("{mapped}/{file}"),
                            ));
                        }
                    }
                }
                found
            }
            None => fs
                .files(Path::new(&self.abs))
                .into_iter()
                .filter(|file| accept(file))
                .map(|file| {
                    let real = format!("{}{}", self.abs, file);
                    SolutionFile::new(FileKind::Absolute, name, format!("!{real}"), real)
                })
                .collect(),
        }
    }

    /// Names of the sub-directories matching `pattern`, merged across entries.
    pub(crate) fn paths(&self, pattern: Option<&str>) -> Vec<String> {
        let fs = self.solution.fs();
        let mut names = BTreeSet::new();
        for real in self.fs_paths() {
            for dir in fs.dirs(Path::new(&real)) {
                if pattern.map_or(true, |p| fnmatch(p, &dir)) {
                    names.insert(dir);
                }
            }
        }
        names.into_iter().collect()
    }

    pub(crate) fn advance(&self, sub: &str) -> Option<Cursor<'a>> {
        let sub = sub.strip_prefix('/').unwrap_or(sub);
        let mut abs = format!("{}{}", self.abs, sub);
        if !abs.ends_with('/') {
            abs.push('/');
        }
        match self.dirs {
            Some(dirs) => Some(Self {
                solution: self.solution,
                dirs: Some(dirs),
                abs,
            }),
            None => Self::real(self.solution, &abs),
        }
    }
}
