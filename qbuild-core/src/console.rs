//! 面向用户的输出
//!
//! 诊断日志走 `qbuild-log`；这里是构建过程本身要打印给用户的文字：
//! 项目消息、回显的命令、命令输出和错误链。测试里换成 [`MemoryConsole`]
//! 即可断言输出。

use parking_lot::Mutex;

/// 项目消息级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Error,
    Warning,
    Information,
    Message,
}

impl MessageLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageLevel::Error => "ERROR",
            MessageLevel::Warning => "WARNING",
            MessageLevel::Information => "INFORMATION",
            MessageLevel::Message => "MESSAGE",
        }
    }
}

/// 输出目标，多个工作线程会同时写入
pub trait Console: Send + Sync {
    /// 输出一行（不含换行符）
    fn print(&self, line: &str);
}

/// 标准输出
#[derive(Debug, Default, Clone, Copy)]
pub struct StdConsole;

impl Console for StdConsole {
    fn print(&self, line: &str) {
        println!("{line}");
    }
}

/// 保存在内存中的输出
#[derive(Debug, Default)]
pub struct MemoryConsole {
    lines: Mutex<Vec<String>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// 是否有某一行包含 `text`
    pub fn contains(&self, text: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(text))
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Console for MemoryConsole {
    fn print(&self, line: &str) {
        let mut lines = self.lines.lock();
        // 多行输出按行保存，便于逐行断言
        lines.extend(line.lines().map(str::to_string));
        if line.is_empty() {
            lines.push(String::new());
        }
    }
}

/// 项目名去掉末尾的 `/`，根节点保持 `/`
pub fn display_name(name: &str) -> &str {
    match name.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => name,
    }
}

/// `Project (/name) LEVEL: message`
pub fn project_message(name: &str, level: MessageLevel, message: &str) -> String {
    format!(
        "Project ({}) {}: {}",
        display_name(name),
        level.as_str(),
        message
    )
}
