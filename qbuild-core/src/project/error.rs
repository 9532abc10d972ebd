use crate::console::display_name;
use crate::object::ObjectError;
use crate::rules::RuleError;
use qbuild_vfs::VfsError;
use std::sync::Arc;

pub type EvalResult<T> = Result<T, EvalError>;

/// 求值过程中的致命错误
///
/// 这些错误都会终止当前项目的打开；外层把它们包成
/// [`EvalError::ProjectFailed`]，带上项目名。
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Error parsing file {file} at line {line} - {message}")]
    Parse {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error("Unable to resolve function {name} ({file}@{line})")]
    UnknownFunction {
        name: String,
        file: String,
        line: usize,
    },

    #[error("Unable to include missing file: \"{0}\"")]
    IncludeMissing(String),

    #[error("Unable to include invalid file: \"{0}\"")]
    IncludeInvalid(String),

    #[error("Unable to parse invalid for() statement.")]
    InvalidFor,

    #[error("for() must be followed by {{}}")]
    ForWithoutBlock,

    #[error("Unable to parse empty if() statement.")]
    EmptyIf,

    #[error("Unable to parse if() statement: \"{0}\"")]
    InvalidIf(String),

    #[error("rule_for_file() takes 1 argument.")]
    RuleForFileArguments,

    #[error("path() takes 2 arguments.")]
    PathArguments,

    /// `error()` 内建函数
    #[error("{0}")]
    User(String),

    #[error("Projects cannot be reset due to the same reason more than once. The reason passed is {0}")]
    DuplicateReset(String),

    #[error("Projects opened in file mode cannot be disabled")]
    DisableInFileMode,

    #[error("Unable to determine finalization order for module {module}: circular dependency detected between {first} and {second}")]
    FinalizeCycle {
        module: String,
        first: String,
        second: String,
    },

    #[error("Unable to run finalizer {0}")]
    Finalizer(String),

    #[error("Terminated due to warnings")]
    Warnings,

    #[error("No function provider accepts script blocks ({0})")]
    Script(String),

    #[error("No such project {0}")]
    NoSuchProject(String),

    #[error("Fatal project deadlock detected\n{0}")]
    Deadlock(String),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error("Project ({}) ERROR: {source}", display_name(project))]
    ProjectFailed {
        project: String,
        #[source]
        source: Arc<EvalError>,
    },
}

impl EvalError {
    /// 把错误归到 `project` 名下；已经归属某个项目的错误保持不变
    pub fn in_project(self, project: &str) -> Self {
        match self {
            EvalError::ProjectFailed { .. } | EvalError::Deadlock(_) => self,
            other => EvalError::ProjectFailed {
                project: project.to_string(),
                source: Arc::new(other),
            },
        }
    }

    /// 去掉项目包装后的根本错误
    pub fn root_cause(&self) -> &EvalError {
        match self {
            EvalError::ProjectFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// 解析错误的行列
    pub fn location(&self) -> Option<(usize, usize)> {
        match self.root_cause() {
            EvalError::Parse { line, column, .. } if *line > 0 => Some((*line, *column)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_wrapping() {
        let err = EvalError::User("boom".into()).in_project("/hello/");
        assert_eq!(err.to_string(), "Project (/hello) ERROR: boom");
        let again = err.in_project("/other/");
        assert_eq!(again.to_string(), "Project (/hello) ERROR: boom");
        assert!(matches!(again.root_cause(), EvalError::User(_)));
    }

    #[test]
    fn test_parse_location() {
        let err = EvalError::Parse {
            file: "/src/qbuild.pro".into(),
            line: 3,
            column: 7,
            message: "Unexpected token".into(),
        }
        .in_project("/");
        assert_eq!(err.location(), Some((3, 7)));
        assert!(err.to_string().contains("at line 3 - Unexpected token"));
    }
}
