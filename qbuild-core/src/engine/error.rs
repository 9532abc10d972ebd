use crate::project::EvalError;

pub type EngineResult<T> = Result<T, EngineError>;

/// 规则引擎错误
///
/// 单条规则失败不是错误，而是 [`EngineOutcome::Failed`](super::EngineOutcome)；
/// 这里只有让整次执行无法得出结果的情况。
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No such rule {0}")]
    NoSuchRule(String),

    #[error("Cannot freshen file {0}")]
    CannotFreshen(String),

    #[error("Circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("Rule engine worker panicked")]
    WorkerPanic,

    #[error("Cannot start rule engine worker: {0}")]
    Spawn(#[from] std::io::Error),
}
