//! 对象模型
//!
//! 项目的变量组织成一棵树：每个节点有一个字符串列表值、按插入顺序排列的
//! 命名属性，以及按值下标寻址的 `~N` 子节点。节点保存在 [`ObjectTree`]
//! 的 arena 中，通过带代数的 [`NodeId`] 引用，节点被删除后旧的 id 自动失效。
//!
//! 修改操作不直接回调，而是把 [`Notification`] 放入队列，由求值器在
//! 修改完成后统一取出处理。

mod notify;
mod tree;

pub use notify::{Notification, TraceContext, TraceEntry};
pub use tree::{NodeId, ObjectTree};

/// 对象模型错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObjectError {
    /// 修改只读节点
    #[error("Cannot {operation} read-only variable {path}")]
    ReadOnly { path: String, operation: &'static str },
    /// 节点已被删除
    #[error("Variable no longer exists")]
    Stale,
}
