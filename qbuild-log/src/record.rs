//! 日志记录定义

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// 日志级别
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// 最详细的跟踪信息
    Trace,
    /// 调试信息
    Debug,
    /// 一般信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl Level {
    /// 将级别转换为字符串
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            _ => Err(crate::Error::UnknownLevel(s.to_string())),
        }
    }
}

/// 一条日志
///
/// 文本形式为 `[时:分:秒.毫秒] 级别 模块 <线程> [span]: 消息`，
/// 终端、文件和崩溃转储都用这一种格式。
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub timestamp_ms: u64,
    pub level: Level,
    /// 调用处的 `module_path!()`
    pub target: &'static str,
    pub message: String,
    /// 产生记录时所在的 span 栈，见 [`crate::Span`]
    pub span: Option<String>,
    /// 产生记录的线程名；规则引擎的工作线程名为 `qbuild-worker-N`
    pub thread: Option<String>,
}

impl Record {
    /// 创建新记录，记下当前线程名
    pub fn new(level: Level, target: &'static str, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: current_timestamp_ms(),
            level,
            target,
            message: message.into(),
            span: None,
            thread: std::thread::current().name().map(str::to_string),
        }
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", format_timestamp(self.timestamp_ms), self.level, self.target)?;
        if let Some(thread) = &self.thread {
            write!(f, " <{thread}>")?;
        }
        if let Some(span) = &self.span {
            write!(f, " [{span}]")?;
        }
        write!(f, ": {}", self.message)
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// UTC 时分秒
fn format_timestamp(timestamp_ms: u64) -> String {
    let secs = timestamp_ms / 1000;
    let millis = timestamp_ms % 1000;

    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;

    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}
