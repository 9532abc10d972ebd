//! API 错误类型
//!
//! 提供统一的错误类型和结构化错误报告。

use serde::Serialize;
use thiserror::Error;

pub use qbuild_config::ConfigError;
pub use qbuild_core::engine::EngineError;
pub use qbuild_core::parser::{ErrorLocation, ParserError};
pub use qbuild_core::project::EvalError;
pub use qbuild_vfs::VfsError;

/// QBuild 错误类型
#[derive(Error, Debug)]
pub enum QBuildError {
    /// 配置错误（线程数、限流参数、配置文件）
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// 语法错误（`-tokenize` / `-parse-tree` 直接解析项目文件时）
    #[error("{0}")]
    Parser(#[from] ParserError),

    /// 求值错误（打开项目失败）
    #[error("{0}")]
    Eval(#[from] EvalError),

    /// 规则引擎错误
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// 文件系统错误
    #[error("{0}")]
    Vfs(#[from] VfsError),

    /// 找不到要构建的项目
    #[error("No project found for {0}")]
    NoProject(String),

    /// 命令行用法错误
    #[error("{0}")]
    Usage(String),
}

impl QBuildError {
    /// 求值错误本身，引擎包装的也算
    fn eval(&self) -> Option<&EvalError> {
        match self {
            QBuildError::Eval(e) | QBuildError::Engine(EngineError::Eval(e)) => Some(e),
            _ => None,
        }
    }

    /// 获取错误行号（如果有）
    pub fn line(&self) -> Option<usize> {
        match self {
            QBuildError::Parser(e) => e.line(),
            _ => self.eval().and_then(EvalError::location).map(|(line, _)| line),
        }
    }

    /// 获取错误列号（如果有）
    pub fn column(&self) -> Option<usize> {
        match self {
            QBuildError::Parser(e) => e.column(),
            _ => self
                .eval()
                .and_then(EvalError::location)
                .map(|(_, column)| column),
        }
    }

    /// 出错的项目文件（仅解析错误）
    pub fn file(&self) -> Option<&str> {
        match self.eval().map(EvalError::root_cause) {
            Some(EvalError::Parse { file, .. }) => Some(file.as_str()),
            _ => None,
        }
    }

    /// 获取错误阶段名称
    pub fn phase(&self) -> &'static str {
        if let Some(e) = self.eval() {
            return match e.root_cause() {
                EvalError::Parse { .. } => "parser",
                EvalError::Vfs(_) => "vfs",
                _ => "eval",
            };
        }
        match self {
            QBuildError::Config(_) => "config",
            QBuildError::Parser(_) => "parser",
            QBuildError::Vfs(_) => "vfs",
            QBuildError::Engine(_) => "engine",
            QBuildError::NoProject(_) => "solution",
            QBuildError::Usage(_) => "usage",
            QBuildError::Eval(_) => "eval",
        }
    }

    /// 用法错误（含非法的线程数和限流参数）以 -1 退出，其余以 1 退出
    pub fn exit_code(&self) -> i32 {
        match self {
            QBuildError::Usage(_)
            | QBuildError::Config(ConfigError::InvalidThreads(_) | ConfigError::InvalidThrottle(_)) => -1,
            _ => 1,
        }
    }

    /// 转换为结构化错误报告
    ///
    /// CLI 直接打印，`-log-format json` 时序列化为 JSON。
    pub fn to_report(&self) -> ErrorReport {
        let details = match self {
            QBuildError::Parser(e) => Some(ErrorDetails::Location {
                location_type: location_type(&e.location),
            }),
            QBuildError::Engine(EngineError::CircularDependency { chain }) => {
                Some(ErrorDetails::Chain {
                    rules: chain.clone(),
                })
            }
            _ => match self.eval() {
                Some(EvalError::ProjectFailed { project, .. }) => Some(ErrorDetails::Project {
                    name: project.clone(),
                }),
                _ => None,
            },
        };

        let message = match self {
            QBuildError::Parser(e) => e.message(),
            _ => self.to_string(),
        };

        ErrorReport {
            phase: self.phase(),
            line: self.line(),
            column: self.column(),
            error_kind: self.kind().to_string(),
            message,
            details,
        }
    }

    /// 错误类型名（可用于程序化处理）
    fn kind(&self) -> &'static str {
        if let Some(e) = self.eval() {
            return eval_kind(e.root_cause());
        }
        match self {
            QBuildError::Config(ConfigError::InvalidThreads(_)) => "InvalidThreads",
            QBuildError::Config(ConfigError::InvalidThrottle(_)) => "InvalidThrottle",
            QBuildError::Config(_) => "ConfigFile",
            QBuildError::Parser(_) => "SyntaxError",
            QBuildError::Engine(EngineError::NoSuchRule(_)) => "NoSuchRule",
            QBuildError::Engine(EngineError::CannotFreshen(_)) => "CannotFreshen",
            QBuildError::Engine(EngineError::CircularDependency { .. }) => "CircularDependency",
            QBuildError::Engine(EngineError::Spawn(_)) => "WorkerSpawn",
            QBuildError::Engine(_) => "WorkerPanic",
            QBuildError::Vfs(_) => "FileSystem",
            QBuildError::NoProject(_) => "NoProject",
            QBuildError::Usage(_) => "Usage",
            QBuildError::Eval(_) => "Eval",
        }
    }
}

fn eval_kind(e: &EvalError) -> &'static str {
    match e {
        EvalError::Parse { .. } => "SyntaxError",
        EvalError::Object(_) => "ReadOnly",
        EvalError::UnknownFunction { .. } => "UnknownFunction",
        EvalError::IncludeMissing(_) | EvalError::IncludeInvalid(_) => "InvalidInclude",
        EvalError::InvalidFor | EvalError::ForWithoutBlock => "InvalidFor",
        EvalError::EmptyIf | EvalError::InvalidIf(_) => "InvalidIf",
        EvalError::RuleForFileArguments | EvalError::PathArguments => "InvalidArguments",
        EvalError::User(_) => "UserError",
        EvalError::DuplicateReset(_) => "DuplicateReset",
        EvalError::DisableInFileMode => "DisableInFileMode",
        EvalError::FinalizeCycle { .. } => "FinalizeCycle",
        EvalError::Finalizer(_) => "Finalizer",
        EvalError::Warnings => "Warnings",
        EvalError::Script(_) => "Script",
        EvalError::NoSuchProject(_) => "NoSuchProject",
        EvalError::Deadlock(_) => "Deadlock",
        EvalError::Rule(_) => "RuleError",
        EvalError::Vfs(_) => "FileSystem",
        EvalError::ProjectFailed { .. } => "ProjectFailed",
    }
}

fn location_type(location: &ErrorLocation) -> &'static str {
    match location {
        ErrorLocation::At(_) => "at",
        ErrorLocation::Eof => "eof",
        ErrorLocation::Unknown => "unknown",
    }
}

/// 结构化错误报告
///
/// CLI 可以直接打印，也可以序列化为 JSON。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    /// 错误阶段: config, parser, eval, engine, vfs, solution, usage
    pub phase: &'static str,
    /// 错误行号（1-based，如果有）
    pub line: Option<usize>,
    /// 错误列号（1-based，如果有）
    pub column: Option<usize>,
    /// 错误类型（可用于程序化处理）
    pub error_kind: String,
    /// 人类可读的错误消息
    pub message: String,
    /// 额外详情
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// 错误额外详情
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorDetails {
    /// 位置相关信息
    Location { location_type: &'static str },
    /// 出错的项目
    Project { name: String },
    /// 环形依赖经过的规则
    Chain { rules: Vec<String> },
}

impl std::fmt::Display for ErrorReport {
    /// 默认的 CLI 友好格式
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => {
                write!(f, "[{}:{}] {} error: {}", line, col, self.phase, self.message)
            }
            _ => write!(f, "[{}] {} error: {}", self.phase, self.phase, self.message),
        }
    }
}

impl ErrorReport {
    /// 转换为 JSON 格式
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// 简洁格式（适合终端）
    pub fn to_short(&self) -> String {
        format!("{}: {}", self.phase, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbuild_core::parser::ParserErrorKind;
    use std::sync::Arc;

    fn parse_failure() -> EvalError {
        EvalError::Parse {
            file: "/src/qbuild.pro".to_string(),
            line: 4,
            column: 2,
            message: "Unexpected token '}'".to_string(),
        }
        .in_project("/src/")
    }

    #[test]
    fn test_parser_error_line_column() {
        let err = QBuildError::Parser(ParserError::at(ParserErrorKind::MissingRightCurly, 3, 7));

        assert_eq!(err.line(), Some(3));
        assert_eq!(err.column(), Some(7));
        assert_eq!(err.phase(), "parser");
    }

    #[test]
    fn test_wrapped_parse_failure() {
        let err = QBuildError::Eval(parse_failure());

        assert_eq!(err.phase(), "parser");
        assert_eq!(err.file(), Some("/src/qbuild.pro"));
        assert_eq!(err.line(), Some(4));
        assert_eq!(err.column(), Some(2));

        let report = err.to_report();
        assert_eq!(report.error_kind, "SyntaxError");
        assert_eq!(
            report.details,
            Some(ErrorDetails::Project {
                name: "/src/".to_string()
            })
        );
        assert!(report.message.starts_with("Project (/src) ERROR:"));
    }

    #[test]
    fn test_engine_wraps_eval() {
        let err = QBuildError::Engine(EngineError::Eval(EvalError::Warnings.in_project("/p/")));
        assert_eq!(err.phase(), "eval");
        assert_eq!(err.to_report().error_kind, "Warnings");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_cycle_report() {
        let err = QBuildError::Engine(EngineError::CircularDependency {
            chain: vec!["/p/A".into(), "/p/B".into(), "/p/A".into()],
        });
        let report = err.to_report();

        assert_eq!(report.phase, "engine");
        assert_eq!(report.error_kind, "CircularDependency");
        assert_eq!(report.line, None);
        assert!(report.message.contains("/p/A -> /p/B -> /p/A"));
        match report.details {
            Some(ErrorDetails::Chain { rules }) => assert_eq!(rules.len(), 3),
            other => panic!("Expected chain details, got {other:?}"),
        }
    }

    #[test]
    fn test_usage_exit_code() {
        assert_eq!(QBuildError::Usage("bad".into()).exit_code(), -1);
        assert_eq!(QBuildError::Config(ConfigError::InvalidThreads(99)).exit_code(), -1);
        assert_eq!(QBuildError::NoProject("/x/".into()).exit_code(), 1);
    }

    #[test]
    fn test_error_report_display() {
        let with_location = QBuildError::Eval(parse_failure()).to_report();
        assert!(with_location.to_string().starts_with("[4:2] parser error: "));

        let without = QBuildError::NoProject("/nowhere/".into()).to_report();
        assert_eq!(
            without.to_string(),
            "[solution] solution error: No project found for /nowhere/"
        );
        assert_eq!(without.to_short(), "solution: No project found for /nowhere/");
    }

    #[test]
    fn test_error_report_to_json() {
        let report = QBuildError::Parser(ParserError::at(ParserErrorKind::UnterminatedString, 1, 5))
            .to_report();
        let json = report.to_json().unwrap();

        assert!(json.contains("\"phase\":\"parser\""));
        assert!(json.contains("\"line\":1"));
        assert!(json.contains("\"column\":5"));
        assert!(json.contains("\"message\":\"Unterminated string\""));
        assert!(json.contains("\"location_type\":\"at\""));
    }

    #[test]
    fn test_error_report_to_json_null_values() {
        let report = QBuildError::Vfs(VfsError::NotFound {
            path: "/x".into(),
        })
        .to_report();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["line"], serde_json::Value::Null);
        assert_eq!(value["column"], serde_json::Value::Null);
        assert!(value.get("details").is_none());
    }

    #[test]
    fn test_project_failed_source_shared() {
        let inner = Arc::new(EvalError::User("stop".into()));
        let err = QBuildError::Eval(EvalError::ProjectFailed {
            project: "/a/".into(),
            source: inner,
        });
        assert_eq!(err.to_report().error_kind, "UserError");
    }
}
