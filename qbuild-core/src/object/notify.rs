use super::NodeId;
use std::fmt;

/// 修改发生的源码位置
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceContext {
    pub file: String,
    pub line: usize,
}

impl TraceContext {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// 节点修改记录（`-trace`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub operation: &'static str,
    pub values: Vec<String>,
    pub context: TraceContext,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.values.iter().map(|v| format!("{v:?}")).collect();
        write!(
            f,
            "{}({})@{}",
            self.operation,
            values.join(", "),
            self.context
        )
    }
}

/// 修改通知，由求值器取出后分派
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// 被订阅节点的值变化
    Changed {
        node: NodeId,
        subscription: String,
        added: Vec<String>,
        removed: Vec<String>,
    },
    /// 类型节点新增了一个类型值
    NewType { path: String, type_name: String },
    /// 类型节点去掉了一个类型值
    DelType { path: String, type_name: String },
    /// 节点上 `watch` 的函数需要运行
    Watch { node: NodeId, functions: Vec<String> },
}
