//! 日志配置
//!
//! 一次构建的日志器由 [`LogConfig`] 描述，[`LogConfig::init`] 得到 [`LogHandle`]。
//! 配了环形缓冲区时，构建以致命错误结束后可以从句柄取出最后若干条记录。

use crate::logger::{ConsoleSink, FileSink, Stream};
use crate::{Level, LogRingBuffer, LogSink, Logger};
use std::sync::Arc;

/// 日志输出目标
#[derive(Clone, Debug, PartialEq)]
pub enum OutputConfig {
    Stdout,
    /// 构建命令的输出走 stdout，诊断默认走这里
    Stderr,
    /// 追加写入的文件
    File(String),
    /// 内存中的最后 N 条
    RingBuffer(usize),
}

/// 日志配置
///
/// ```
/// use qbuild_log::{LogConfig, Level};
///
/// let handle = LogConfig::new(Level::Debug).with_ring_buffer(10000).init();
/// assert_eq!(handle.logger.level(), Level::Debug);
/// assert!(handle.ring.is_some());
/// ```
#[derive(Clone, Debug)]
pub struct LogConfig {
    pub level: Level,
    pub outputs: Vec<OutputConfig>,
}

/// 初始化后的日志器，以及可选的环形缓冲区
pub struct LogHandle {
    pub logger: Arc<Logger>,
    pub ring: Option<Arc<LogRingBuffer>>,
}

impl LogHandle {
    /// 最近的日志记录，每行一条；没有环形缓冲区或缓冲区为空时为 `None`
    pub fn crash_dump(&self) -> Option<String> {
        let snapshot = self.ring.as_ref()?.snapshot();
        if snapshot.records.is_empty() {
            return None;
        }
        Some(snapshot.render())
    }

    /// 再挂一个输出目标（例如 CLI 的 tracing 桥接）
    pub fn with_sink<S: LogSink + 'static>(self, sink: S) -> Self {
        self.logger.add_sink(sink);
        self
    }
}

impl LogConfig {
    pub fn new(level: Level) -> Self {
        LogConfig {
            level,
            outputs: Vec::new(),
        }
    }

    /// 调试构建脚本：Debug 级别，写 stderr，保留 10000 条
    pub fn dev() -> Self {
        LogConfig {
            level: Level::Debug,
            outputs: vec![OutputConfig::Stderr, OutputConfig::RingBuffer(10000)],
        }
    }

    /// 日常构建：只有警告和错误写 stderr，保留 1000 条供失败后查看
    pub fn production() -> Self {
        LogConfig {
            level: Level::Warn,
            outputs: vec![OutputConfig::Stderr, OutputConfig::RingBuffer(1000)],
        }
    }

    /// 测试环境配置（静默）
    pub fn test() -> Self {
        LogConfig::new(Level::Error)
    }

    pub fn with_stdout(self) -> Self {
        self.with_output(OutputConfig::Stdout)
    }

    pub fn with_stderr(self) -> Self {
        self.with_output(OutputConfig::Stderr)
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.outputs.push(OutputConfig::File(path.into()));
        self
    }

    /// 设置环形缓冲区容量；只保留一个缓冲区
    pub fn with_ring_buffer(mut self, capacity: usize) -> Self {
        self.outputs
            .retain(|output| !matches!(output, OutputConfig::RingBuffer(_)));
        self.outputs.push(OutputConfig::RingBuffer(capacity));
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    fn with_output(mut self, output: OutputConfig) -> Self {
        if !self.outputs.contains(&output) {
            self.outputs.push(output);
        }
        self
    }

    /// 建立日志器
    ///
    /// 文件打不开时跳过该输出，不影响其他输出。
    pub fn init(self) -> LogHandle {
        let logger = Logger::new(self.level);
        let mut ring = None;

        for output in self.outputs {
            match output {
                OutputConfig::Stdout => logger.add_sink(ConsoleSink::new(Stream::Stdout)),
                OutputConfig::Stderr => logger.add_sink(ConsoleSink::new(Stream::Stderr)),
                OutputConfig::File(path) => {
                    if let Ok(sink) = FileSink::new(&path) {
                        logger.add_sink(sink);
                    }
                }
                OutputConfig::RingBuffer(capacity) => {
                    let buffer = LogRingBuffer::new(capacity);
                    logger.add_sink(Arc::clone(&buffer));
                    ring = Some(buffer);
                }
            }
        }

        LogHandle { logger, ring }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig::new(Level::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::dev().level, Level::Debug);
        assert_eq!(LogConfig::production().level, Level::Warn);
        assert!(LogConfig::production()
            .outputs
            .contains(&OutputConfig::RingBuffer(1000)));
        assert_eq!(LogConfig::test().level, Level::Error);
        assert!(LogConfig::test().outputs.is_empty());
        assert!(LogConfig::default().outputs.is_empty());
    }

    #[test]
    fn test_outputs_dedup() {
        let config = LogConfig::new(Level::Info)
            .with_stderr()
            .with_stderr()
            .with_ring_buffer(4)
            .with_ring_buffer(8);
        assert_eq!(
            config.outputs,
            vec![OutputConfig::Stderr, OutputConfig::RingBuffer(8)]
        );
    }

    #[test]
    fn test_crash_dump() {
        let handle = LogConfig::new(Level::Debug).with_ring_buffer(2).init();
        assert_eq!(handle.crash_dump(), None);

        for rule in ["compile", "link", "install"] {
            handle.logger.log(Level::Info, "qbuild_core::engine", format!("run {rule}"));
        }
        let dump = handle.crash_dump().unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "... 1 earlier records dropped");
        assert!(lines[1].ends_with("run link"));
        assert!(lines[2].ends_with("run install"));
    }

    #[test]
    fn test_crash_dump_without_ring() {
        let handle = LogConfig::test().init();
        handle.logger.log(Level::Error, "cfg", "lost");
        assert_eq!(handle.crash_dump(), None);
        assert_eq!(handle.logger.level(), Level::Error);
    }

    #[test]
    fn test_extra_sink() {
        let extra = LogRingBuffer::new(4);
        let handle = LogConfig::new(Level::Info)
            .with_ring_buffer(4)
            .init()
            .with_sink(Arc::clone(&extra));
        handle.logger.log(Level::Info, "cfg", "both");
        assert_eq!(extra.len(), 1);
        assert_eq!(handle.ring.as_ref().map(|ring| ring.len()), Some(1));
    }

    #[test]
    fn test_init_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let handle = LogConfig::new(Level::Info)
            .with_file(path.to_string_lossy())
            .init();
        assert!(handle.ring.is_none());
        handle.logger.log(Level::Warn, "cfg", "to file");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("WARN cfg"));
        assert!(content.contains("to file"));
    }
}
