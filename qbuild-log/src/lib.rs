//! qbuild-log - 构建引擎的结构化日志系统
//!
//! 特点：
//! - **显式传递**：没有全局 logger，`Arc<Logger>` 通过构建上下文传入各层
//! - **多线程友好**：span 栈按线程分开记录，工作线程之间互不干扰
//! - **崩溃恢复**：环形缓冲区保留最后 N 条日志
//! - **阶段计时**：[`Timings`] 汇总各阶段耗时，供 `-perf-statistics` 输出
//!
//! # 快速开始
//!
//! ```
//! use qbuild_log::{LogConfig, debug};
//!
//! let handle = LogConfig::test().with_level(qbuild_log::Level::Debug).with_ring_buffer(16).init();
//! debug!(handle.logger, "项目已打开");
//! assert!(handle.crash_dump().unwrap().ends_with("项目已打开"));
//! ```
//!
//! # 命名规范
//!
//! 代码中禁止使用 `_` 开头的变量名。需要丢弃的值请显式 `drop()`。

mod config;
mod logger;
mod macros;
mod record;
mod ring_buffer;
mod span;
mod timing;

pub use config::{LogConfig, LogHandle, OutputConfig};
pub use logger::{ConsoleSink, FileSink, LogSink, Logger, SpanGuard, Stream};
pub use record::{Level, Record};
pub use ring_buffer::{LogRingBuffer, RingSnapshot};
pub use span::{Span, SpanId};
pub use timing::{TimingGuard, TimingRow, Timings};

// 宏通过 #[macro_export] 自动导出到 crate 根：
// trace!, debug!, info!, warn!, error!, log!

/// 日志结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// 日志系统错误类型
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 无法识别的日志级别名称
    #[error("Unknown log level: {0}")]
    UnknownLevel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Error > Level::Warn);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", Error::UnknownLevel("loud".into())),
            "Unknown log level: loud"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }
}
