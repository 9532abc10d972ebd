//! API 类型定义
//!
//! 构建请求和执行结果。

use qbuild_core::EngineOutcome;

/// 要执行的目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// 规则名；空字符串表示 `default`
    Rule(String),
    /// 刷新单个文件（`-freshen`）
    Freshen(String),
}

impl Default for Target {
    fn default() -> Self {
        Target::Rule(String::new())
    }
}

/// 执行输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOutput {
    /// 项目名（`/node/` 形式）
    pub project: String,
    pub target: Target,
    pub outcome: EngineOutcome,
}

impl ExecuteOutput {
    /// 进程退出码：失败为 1，成功和无事可做为 0
    pub fn exit_code(&self) -> i32 {
        if self.outcome.is_failure() {
            1
        } else {
            0
        }
    }
}

/// 一条带帮助文本的规则（`-actions`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub help: String,
}

/// `-actions` 的输出
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionList(pub Vec<Action>);

impl std::fmt::Display for ActionList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No actions are available.");
        }
        for action in &self.0 {
            writeln!(f, "{}", action.name)?;
            for line in action.help.lines() {
                writeln!(f, "   {line}")?;
            }
        }
        Ok(())
    }
}
