//! Span 跟踪
//!
//! span 标出一段工作属于谁：规则引擎按规则进入 `rule`，打开项目时进入 `project`。
//! 记录上带的是当前线程整条 span 栈的标签，例如 `project /src/app > rule link`。

use std::fmt;
use std::thread::ThreadId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpanId(pub u64);

#[derive(Clone, Debug, PartialEq)]
pub struct Span {
    pub id: SpanId,
    /// 工作种类，如 `rule`、`project`
    pub kind: &'static str,
    /// 规则名或项目名；可以为空
    pub subject: String,
    pub thread: ThreadId,
}

impl Span {
    /// 在当前线程上创建
    pub fn new(id: SpanId, kind: &'static str, subject: impl Into<String>) -> Self {
        Span {
            id,
            kind,
            subject: subject.into(),
            thread: std::thread::current().id(),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subject.is_empty() {
            f.write_str(self.kind)
        } else {
            write!(f, "{} {}", self.kind, self.subject)
        }
    }
}

/// 从外到内用 ` > ` 连接
pub(crate) fn stack_label(stack: &[Span]) -> Option<String> {
    if stack.is_empty() {
        return None;
    }
    let parts: Vec<String> = stack.iter().map(Span::to_string).collect();
    Some(parts.join(" > "))
}
