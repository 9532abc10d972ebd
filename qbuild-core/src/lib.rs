//! QBuild Core - 构建语言与规则引擎
//!
//! 包含词法分析、预处理、解析、对象模型、项目求值和多线程规则引擎。
//! 文件访问只经过 `qbuild-vfs`，终端输出只经过 [`console::Console`]。
//!
//! 配置通过 [`BuildContext`] 显式传递，没有全局状态。

pub mod console;
pub mod context;
pub mod engine;
pub mod kit;
pub mod object;
pub mod parser;
pub mod project;
pub mod rules;

// 常用类型
pub use console::{Console, MemoryConsole, MessageLevel, StdConsole};
pub use context::{BuildContext, BuildContextBuilder, TypeHook};
pub use engine::{EngineError, EngineOutcome, RuleEngine, ShellExecutor, ShellOutput, SystemShell};
pub use parser::{parse, ParserError};
pub use project::{EvalError, EvalResult, FunctionProvider, NativeFunctions, Project};
pub use rules::{Rule, Rules};

// 来自 qbuild-config 的配置类型
pub use qbuild_config::{BuildOptions, DebugFlags, Phase};
