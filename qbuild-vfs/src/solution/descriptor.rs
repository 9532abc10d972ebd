//! The `qbuild.solution` descriptor file
//!
//! An ini file whose groups are solutions:
//!
//! ```text
//! [Solution]
//! BuildPath=$QPEDIR
//! Default=true
//! [Solution\FilePaths]
//! size=1
//! 1\FilePath=/home/user/src/myproject
//! 1\ProjectLocation=/src
//! ```
//!
//! Relative paths resolve against the directory holding the descriptor. A
//! value starting with `$` names an environment variable.

use super::SolutionDir;
use crate::path::{clean_path, dir_name, is_relative, join};
use crate::VirtualFileSystem;
use std::collections::BTreeMap;
use std::path::Path;

/// Parsed solution descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionDescriptor {
    root: String,
    is_default: bool,
    solutions: BTreeMap<String, Vec<SolutionDir>>,
    default_solution: Option<String>,
}

impl SolutionDescriptor {
    /// Descriptor used when no file exists: one `default` solution whose
    /// build tree and source tree are both `root`.
    pub fn fallback(root: &str) -> Self {
        let mut solutions = BTreeMap::new();
        solutions.insert("default".to_string(), vec![SolutionDir::new("", root)]);
        Self {
            root: root.to_string(),
            is_default: true,
            solutions,
            default_solution: Some("default".to_string()),
        }
    }

    /// Parse descriptor `text` located in directory `root`.
    pub fn parse<F>(root: &str, text: &str, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let entries = parse_ini(text);
        let mut groups: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (key, value) in entries {
            if let Some((group, rest)) = key.split_once('/') {
                groups
                    .entry(group.to_string())
                    .or_default()
                    .insert(rest.to_string(), value);
            }
        }

        let expand = |value: &str| -> String {
            let value = value.trim();
            match value.strip_prefix('$') {
                Some(var) => env(var).unwrap_or_default(),
                None => value.to_string(),
            }
        };

        let mut solutions = BTreeMap::new();
        let mut default_solution = None;
        for (name, keys) in &groups {
            let mut dirs = Vec::new();
            let build = keys.get("BuildPath").map(|v| expand(v)).unwrap_or_default();
            if build.is_empty() {
                dirs.push(SolutionDir::new("", root));
            } else {
                dirs.push(SolutionDir::new("", resolve(root, &build)));
            }

            let count = keys
                .get("FilePaths/size")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            for index in 1..=count {
                let file_path = keys
                    .get(&format!("FilePaths/{index}/FilePath"))
                    .map(|v| expand(v))
                    .unwrap_or_default();
                if file_path.is_empty() {
                    continue;
                }
                let mut location = keys
                    .get(&format!("FilePaths/{index}/ProjectLocation"))
                    .map(|v| v.trim().to_string())
                    .unwrap_or_default();
                if location == "/" {
                    location.clear();
                }
                dirs.push(SolutionDir::new(location, resolve(root, &file_path)));
            }

            if keys.get("Default").is_some_and(|v| parse_bool(v)) {
                default_solution = Some(name.clone());
            }
            solutions.insert(name.clone(), dirs);
        }

        if default_solution.is_none() && solutions.contains_key("default") {
            default_solution = Some("default".to_string());
        }

        Self {
            root: root.to_string(),
            is_default: false,
            solutions,
            default_solution,
        }
    }

    /// Load the descriptor named `file_name` in `root`, or the fallback when
    /// there is none.
    pub fn load(fs: &dyn VirtualFileSystem, root: &str, file_name: &str) -> Self {
        let file = join(root, file_name);
        match fs.read_file(Path::new(&file)) {
            Ok(bytes) => Self::parse(root, &String::from_utf8_lossy(&bytes), |var| {
                std::env::var(var).ok()
            }),
            Err(_) => Self::fallback(root),
        }
    }

    /// Walk up from `start` looking for a directory containing `file_name`.
    pub fn find(fs: &dyn VirtualFileSystem, start: &str, file_name: &str) -> Option<Self> {
        let mut dir = clean_path(start);
        loop {
            if fs.is_file(Path::new(&join(&dir, file_name))) {
                return Some(Self::load(fs, &dir, file_name));
            }
            if dir == "/" || dir.is_empty() {
                return None;
            }
            dir = dir_name(&dir);
        }
    }

    /// True when no descriptor file was found
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn root_path(&self) -> &str {
        &self.root
    }

    /// Solution names in sorted order
    pub fn solutions(&self) -> Vec<String> {
        self.solutions.keys().cloned().collect()
    }

    /// Mapping entries of `solution`, build entry first
    pub fn paths(&self, solution: &str) -> &[SolutionDir] {
        self.solutions
            .get(solution)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Solution flagged `Default=true`, else one named `default`
    pub fn default_solution(&self) -> Option<&str> {
        self.default_solution.as_deref()
    }
}

fn resolve(base: &str, sub: &str) -> String {
    if is_relative(sub) {
        clean_path(&format!("{base}/{sub}"))
    } else {
        clean_path(sub)
    }
}

fn parse_bool(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no"
    )
}

/// Flatten ini text into `group/sub/key = value` pairs.
///
/// Both `\` and `/` separate key components; `[General]` keys sit at the root.
fn parse_ini(text: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut group = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            group = normalize_key(section);
            if group.eq_ignore_ascii_case("general") {
                group.clear();
            }
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = normalize_key(key);
        let full = if group.is_empty() {
            key
        } else {
            format!("{group}/{key}")
        };
        entries.push((full, unquote(value.trim())));
    }
    entries
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .split(['\\', '/'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}
