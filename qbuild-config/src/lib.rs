//! QBuild Config - Pure configuration data structures
//!
//! This crate contains only data structures and their parsing, no global state.
//! It is the shared configuration vocabulary across all QBuild crates.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Upper bound for the worker pool size.
pub const MAX_THREADS: usize = 50;

/// Default project marker file name.
pub const DEFAULT_PROJECT_MARKER: &str = "qbuild.pro";

/// Default solution descriptor file name.
pub const DEFAULT_SOLUTION_DESCRIPTOR: &str = "qbuild.solution";

/// Name of the optional JSON configuration file.
pub const CONFIG_FILE_NAME: &str = "qbuild.json";

/// Errors produced while reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid throttle '{0}': expected <category>:<limit|T> with a non-zero limit")]
    InvalidThrottle(String),
    #[error("invalid thread count {0}: must be between 0 and {MAX_THREADS}")]
    InvalidThreads(usize),
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Diagnostic switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    /// Trace every rule state transition in the engine (`-d`)
    pub rule_exec: bool,
    /// Record per-node operation traces in the object model (`-trace`)
    pub trace: bool,
    /// Log every evaluated block (`-run-trace`)
    pub run_trace: bool,
    /// Print finalize module ordering
    pub finalize: bool,
    /// Collect per-phase timings (`-perf-statistics`)
    pub perf_timing: bool,
}

impl DebugFlags {
    pub fn any(&self) -> bool {
        self.rule_exec || self.trace || self.run_trace || self.finalize || self.perf_timing
    }
}

/// Options controlling one build invocation
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    /// Worker threads; always within `1..=MAX_THREADS`
    pub threads: usize,
    /// Print commands instead of running them (`-n`)
    pub dry_run: bool,
    /// Rebuild the requested target even if fresh
    pub force: bool,
    /// Echo every command, including echo-if-needed ones
    pub verbose: bool,
    /// Suppress "Opening project" chatter
    pub silent: bool,
    pub debug: DebugFlags,
    /// Per-category concurrency ceilings
    pub throttles: BTreeMap<String, usize>,
    pub project_marker: String,
    pub solution_descriptor: String,
    /// Directories searched for `.pri` extensions
    pub extension_paths: Vec<PathBuf>,
}

impl BuildOptions {
    /// Clamp a requested thread count; 0 selects the host's parallelism.
    pub fn resolve_threads(requested: usize) -> usize {
        let threads = if requested == 0 {
            ideal_thread_count()
        } else {
            requested
        };
        threads.clamp(1, MAX_THREADS)
    }

    pub fn with_threads(mut self, requested: usize) -> Self {
        self.threads = Self::resolve_threads(requested);
        self
    }

    pub fn with_throttle(mut self, spec: ThrottleSpec) -> Self {
        self.throttles.insert(spec.category, spec.limit);
        self
    }

    /// Fold a JSON configuration file into these options.
    /// Values already set explicitly are kept by applying the file first.
    pub fn apply_file(&mut self, file: &FileConfig) -> Result<(), ConfigError> {
        if let Some(threads) = file.threads {
            if threads > MAX_THREADS {
                return Err(ConfigError::InvalidThreads(threads));
            }
            self.threads = Self::resolve_threads(threads);
        }
        for spec in &file.throttles {
            let spec = ThrottleSpec::parse(spec)?;
            self.throttles.insert(spec.category, spec.limit);
        }
        self.extension_paths
            .extend(file.extension_paths.iter().map(PathBuf::from));
        if let Some(marker) = &file.project_marker {
            self.project_marker = marker.clone();
        }
        Ok(())
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            threads: Self::resolve_threads(0),
            dry_run: false,
            force: false,
            verbose: false,
            silent: false,
            debug: DebugFlags::default(),
            throttles: BTreeMap::new(),
            project_marker: DEFAULT_PROJECT_MARKER.to_string(),
            solution_descriptor: DEFAULT_SOLUTION_DESCRIPTOR.to_string(),
            extension_paths: Vec::new(),
        }
    }
}

/// Host parallelism, falling back to one thread.
pub fn ideal_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A parsed `-throttle <category>:<limit|T>` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleSpec {
    pub category: String,
    pub limit: usize,
}

impl ThrottleSpec {
    /// Parse `cat:N` or `cat:T`, where `T` means the host's parallelism.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidThrottle(text.to_string());
        let (category, limit) = text.split_once(':').ok_or_else(invalid)?;
        if category.is_empty() {
            return Err(invalid());
        }
        let limit = if limit == "T" {
            ideal_thread_count()
        } else {
            limit.parse::<usize>().map_err(|_| invalid())?
        };
        if limit == 0 {
            return Err(invalid());
        }
        Ok(Self {
            category: category.to_string(),
            limit,
        })
    }
}

/// Optional `qbuild.json` contents
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileConfig {
    pub threads: Option<usize>,
    pub throttles: Vec<String>,
    pub extension_paths: Vec<String>,
    pub project_marker: Option<String>,
    /// Global log level name ("trace" .. "error")
    pub log_level: Option<String>,
    /// Per-phase log level overrides keyed by [`Phase::as_str`]
    pub phase_levels: BTreeMap<String, String>,
}

impl FileConfig {
    pub fn from_json(path: &str, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: path.to_string(),
            source,
        })
    }

    /// Load `qbuild.json` from `dir`; a missing file yields `None`.
    pub fn load_from(dir: &Path) -> Result<Option<Self>, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        let display = path.display().to_string();
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_json(&display, &text).map(Some)
    }
}

/// Execution phase, used to route log output
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Lexer,
    Parser,
    Eval,
    Vfs,
    Engine,
    Cli,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Lexer,
        Phase::Parser,
        Phase::Eval,
        Phase::Vfs,
        Phase::Engine,
        Phase::Cli,
    ];

    /// Get the string name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lexer => "lexer",
            Phase::Parser => "parser",
            Phase::Eval => "eval",
            Phase::Vfs => "vfs",
            Phase::Engine => "engine",
            Phase::Cli => "cli",
        }
    }

    /// Get the log target name for this phase
    pub fn target(&self) -> String {
        format!("qbuild::{}", self.as_str())
    }

    pub fn from_name(name: &str) -> Option<Phase> {
        Phase::ALL.into_iter().find(|p| p.as_str() == name)
    }

    /// Map a Rust module path (as produced by `module_path!()`) onto a phase.
    pub fn from_module_path(path: &str) -> Phase {
        let mut parts = path.split("::");
        let krate = parts.next().unwrap_or_default();
        let module = parts.next().unwrap_or_default();
        match (krate, module) {
            ("qbuild_core", "kit") => Phase::Lexer,
            ("qbuild_core", "parser") => Phase::Parser,
            ("qbuild_core", "engine" | "rules") => Phase::Engine,
            ("qbuild_core", _) => Phase::Eval,
            ("qbuild_vfs", _) => Phase::Vfs,
            _ => Phase::Cli,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_build_options() {
        let opts = BuildOptions::default();
        assert!(opts.threads >= 1 && opts.threads <= MAX_THREADS);
        assert!(!opts.dry_run);
        assert_eq!(opts.project_marker, "qbuild.pro");
        assert_eq!(opts.solution_descriptor, "qbuild.solution");
        assert!(!opts.debug.any());
    }

    #[test]
    fn test_resolve_threads_clamps() {
        assert_eq!(BuildOptions::resolve_threads(3), 3);
        assert_eq!(BuildOptions::resolve_threads(500), MAX_THREADS);
        assert_eq!(BuildOptions::resolve_threads(0), ideal_thread_count().min(50));
    }

    #[test]
    fn test_throttle_parse() {
        let spec = ThrottleSpec::parse("link:2").unwrap();
        assert_eq!(spec.category, "link");
        assert_eq!(spec.limit, 2);

        let ideal = ThrottleSpec::parse("cc:T").unwrap();
        assert_eq!(ideal.limit, ideal_thread_count());
    }

    #[test]
    fn test_throttle_parse_rejects_bad_input() {
        assert!(ThrottleSpec::parse("link").is_err());
        assert!(ThrottleSpec::parse(":2").is_err());
        assert!(ThrottleSpec::parse("link:0").is_err());
        assert!(ThrottleSpec::parse("link:x").is_err());
    }

    #[test]
    fn test_file_config_apply() {
        let file = FileConfig::from_json(
            "qbuild.json",
            r#"{"threads": 4, "throttles": ["link:1"], "extensionPaths": ["/ext"]}"#,
        )
        .unwrap();
        let mut opts = BuildOptions::default();
        opts.apply_file(&file).unwrap();
        assert_eq!(opts.threads, 4);
        assert_eq!(opts.throttles.get("link"), Some(&1));
        assert_eq!(opts.extension_paths, vec![PathBuf::from("/ext")]);
    }

    #[test]
    fn test_file_config_rejects_too_many_threads() {
        let file = FileConfig {
            threads: Some(51),
            ..FileConfig::default()
        };
        assert!(BuildOptions::default().apply_file(&file).is_err());
    }

    #[test]
    fn test_file_config_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileConfig::load_from(dir.path()).unwrap().is_none());
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{ not json").unwrap();
        assert!(FileConfig::load_from(dir.path()).is_err());
    }

    #[test]
    fn test_phase_as_str() {
        assert_eq!(Phase::Lexer.as_str(), "lexer");
        assert_eq!(Phase::Engine.target(), "qbuild::engine");
        assert_eq!(Phase::from_name("vfs"), Some(Phase::Vfs));
    }

    #[test]
    fn test_phase_from_module_path() {
        assert_eq!(
            Phase::from_module_path("qbuild_core::kit::lexer"),
            Phase::Lexer
        );
        assert_eq!(
            Phase::from_module_path("qbuild_core::engine::scheduler"),
            Phase::Engine
        );
        assert_eq!(
            Phase::from_module_path("qbuild_core::project::eval"),
            Phase::Eval
        );
        assert_eq!(
            Phase::from_module_path("qbuild_vfs::solution"),
            Phase::Vfs
        );
        assert_eq!(Phase::from_module_path("qbuild"), Phase::Cli);
    }
}
