//! CLI 配置
//!
//! 各构建阶段的日志级别，来自 `qbuild.json` 和调试开关。

use qbuild_config::{DebugFlags, FileConfig, Phase};
use std::str::FromStr;
use tracing::Level;

/// CLI 日志配置
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub global: Level,
    pub lexer: Option<Level>,
    pub parser: Option<Level>,
    pub eval: Option<Level>,
    pub vfs: Option<Level>,
    pub engine: Option<Level>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: Level::WARN,
            lexer: None,
            parser: None,
            eval: None,
            vfs: None,
            engine: None,
        }
    }
}

impl LogConfig {
    /// 读取 `logLevel` 和 `phaseLevels`
    pub fn from_file(file: &FileConfig) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(level) = &file.log_level {
            config.global = parse_level(level)?;
        }
        for (phase, level) in &file.phase_levels {
            let phase = Phase::from_name(phase).ok_or_else(|| format!("unknown log phase '{phase}'"))?;
            config.set(phase, parse_level(level)?);
        }
        Ok(config)
    }

    /// 调试开关打开相应阶段的日志
    pub fn with_debug(mut self, debug: DebugFlags) -> Self {
        if debug.rule_exec || debug.run_trace {
            self.raise(Phase::Engine, Level::DEBUG);
        }
        if debug.trace || debug.finalize {
            self.raise(Phase::Eval, Level::DEBUG);
        }
        self
    }

    fn slot(&mut self, phase: Phase) -> Option<&mut Option<Level>> {
        match phase {
            Phase::Lexer => Some(&mut self.lexer),
            Phase::Parser => Some(&mut self.parser),
            Phase::Eval => Some(&mut self.eval),
            Phase::Vfs => Some(&mut self.vfs),
            Phase::Engine => Some(&mut self.engine),
            Phase::Cli => None,
        }
    }

    fn set(&mut self, phase: Phase, level: Level) {
        match self.slot(phase) {
            Some(slot) => *slot = Some(level),
            None => self.global = level,
        }
    }

    /// 只放宽，不收紧
    fn raise(&mut self, phase: Phase, level: Level) {
        if self.level_for(&phase.target()) < level {
            self.set(phase, level);
        }
    }

    /// Get log level for a specific target
    pub fn level_for(&self, target: &str) -> Level {
        let phase = Phase::ALL.into_iter().find(|phase| phase.target() == target);
        let level = match phase {
            Some(Phase::Lexer) => self.lexer,
            Some(Phase::Parser) => self.parser,
            Some(Phase::Eval) => self.eval,
            Some(Phase::Vfs) => self.vfs,
            Some(Phase::Engine) => self.engine,
            Some(Phase::Cli) | None => None,
        };
        level.unwrap_or(self.global)
    }

    /// 所有阶段中最详细的级别；日志器按它过滤，其余交给 tracing 的 Targets
    pub fn most_verbose(&self) -> Level {
        [self.lexer, self.parser, self.eval, self.vfs, self.engine]
            .into_iter()
            .flatten()
            .fold(self.global, Level::max)
    }
}

fn parse_level(name: &str) -> Result<Level, String> {
    Level::from_str(name).map_err(|_| format!("unknown log level '{name}'"))
}

/// tracing 级别对应的日志器级别
pub fn log_level(level: Level) -> qbuild_log::Level {
    match level {
        Level::TRACE => qbuild_log::Level::Trace,
        Level::DEBUG => qbuild_log::Level::Debug,
        Level::INFO => qbuild_log::Level::Info,
        Level::WARN => qbuild_log::Level::Warn,
        _ => qbuild_log::Level::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_phase_targets() {
        let config = LogConfig {
            engine: Some(Level::TRACE),
            ..LogConfig::default()
        };
        assert_eq!(config.level_for("qbuild::engine"), Level::TRACE);
        assert_eq!(config.level_for("qbuild::parser"), Level::WARN);
        assert_eq!(config.level_for("somewhere::else"), Level::WARN);
        assert_eq!(config.most_verbose(), Level::TRACE);
    }

    #[test]
    fn test_from_file() {
        let file = FileConfig::from_json(
            "qbuild.json",
            r#"{ "logLevel": "info", "phaseLevels": { "vfs": "debug" } }"#,
        )
        .unwrap();
        let config = LogConfig::from_file(&file).unwrap();
        assert_eq!(config.global, Level::INFO);
        assert_eq!(config.vfs, Some(Level::DEBUG));

        let bad = FileConfig::from_json("qbuild.json", r#"{ "phaseLevels": { "gui": "debug" } }"#)
            .unwrap();
        assert!(LogConfig::from_file(&bad).is_err());
    }

    #[test]
    fn test_debug_flags_raise_levels() {
        let debug = DebugFlags {
            rule_exec: true,
            ..DebugFlags::default()
        };
        let config = LogConfig::default().with_debug(debug);
        assert_eq!(config.engine, Some(Level::DEBUG));
        assert_eq!(config.eval, None);

        let verbose = LogConfig {
            engine: Some(Level::TRACE),
            ..LogConfig::default()
        }
        .with_debug(debug);
        assert_eq!(verbose.engine, Some(Level::TRACE));
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(log_level(Level::TRACE), qbuild_log::Level::Trace);
        assert_eq!(log_level(Level::WARN), qbuild_log::Level::Warn);
        assert_eq!(log_level(Level::ERROR), qbuild_log::Level::Error);
    }
}
