//! 规则模型
//!
//! - [`Rule`]：一条规则（输入、输出、前置动作、命令、测试）
//! - [`Rules`]：项目的规则组，维护输出文件索引
//! - [`CommandFlags`]：字符串上的 `#(...)` 标记
//! - [`RuleVariables`]：规则求值时的 `$$[INPUT]` 等变量

mod flags;
mod group;
mod rule;
mod variables;

pub use flags::{parse_flags, CommandFlags, RuleFlags};
pub use group::Rules;
pub use rule::Rule;
pub use variables::{absolute_file, RuleVariables};

/// 规则模型错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// 同一个输出文件被两条规则声明
    #[error("Output file {file} of rule {rule} is already claimed by rule {owner}")]
    DuplicateOutput {
        file: String,
        rule: String,
        owner: String,
    },
    #[error("No such rule {0}")]
    UnknownRule(String),
}
