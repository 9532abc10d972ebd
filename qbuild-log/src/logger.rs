//! 日志器与输出目标

use crate::record::{Level, Record};
use crate::span::{stack_label, Span, SpanId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

/// 记录的去处
pub trait LogSink: Send + Sync {
    fn write(&self, record: &Record);
}

/// 一次构建共用的日志器
///
/// 规则引擎的工作线程共享同一个日志器，span 栈按线程分开，
/// 所以并发执行的规则不会互相串标签。级别在建立时确定。
pub struct Logger {
    level: Level,
    sinks: Mutex<Vec<Box<dyn LogSink>>>,
    spans: Mutex<HashMap<ThreadId, Vec<Span>>>,
    next_span: AtomicU64,
}

impl Logger {
    pub fn new(level: Level) -> Arc<Self> {
        Arc::new(Logger {
            level,
            sinks: Mutex::new(Vec::new()),
            spans: Mutex::new(HashMap::new()),
            next_span: AtomicU64::new(1),
        })
    }

    /// 只输出错误且没有任何 sink；lexer、parser 单独使用时的默认值
    pub fn noop() -> Arc<Self> {
        Self::new(Level::Error)
    }

    pub fn with_sink<S: LogSink + 'static>(self: Arc<Self>, sink: S) -> Arc<Self> {
        self.add_sink(sink);
        self
    }

    pub fn add_sink<S: LogSink + 'static>(&self, sink: S) {
        self.sinks.lock().push(Box::new(sink));
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    /// 一般通过 [`crate::debug!`] 等宏调用
    #[inline(never)]
    pub fn log(&self, level: Level, target: &'static str, message: impl Into<String>) {
        if !self.is_enabled(level) {
            return;
        }
        let mut record = Record::new(level, target, message);
        if let Some(label) = self.span_label() {
            record = record.with_span(label);
        }
        for sink in self.sinks.lock().iter() {
            sink.write(&record);
        }
    }

    /// 当前线程最内层的 span
    pub fn current_span(&self) -> Option<SpanId> {
        self.spans
            .lock()
            .get(&std::thread::current().id())
            .and_then(|stack| stack.last())
            .map(|span| span.id)
    }

    /// 当前线程整条 span 栈的标签，例如 `project /src/app > rule link`
    pub fn span_label(&self) -> Option<String> {
        self.spans
            .lock()
            .get(&std::thread::current().id())
            .and_then(|stack| stack_label(stack))
    }

    /// 进入 span，守卫析构时退出
    pub fn enter_span(self: &Arc<Self>, kind: &'static str, subject: impl Into<String>) -> SpanGuard {
        let id = SpanId(self.next_span.fetch_add(1, Ordering::Relaxed));
        let span = Span::new(id, kind, subject);
        let thread = span.thread;
        self.spans.lock().entry(thread).or_default().push(span);
        SpanGuard {
            logger: Arc::clone(self),
            thread,
            id,
        }
    }
}

/// 析构时把自己的 span 弹出；栈空了就删掉这个线程的条目
pub struct SpanGuard {
    logger: Arc<Logger>,
    thread: ThreadId,
    id: SpanId,
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        let mut spans = self.logger.spans.lock();
        if let Some(stack) = spans.get_mut(&self.thread) {
            if let Some(pos) = stack.iter().rposition(|span| span.id == self.id) {
                stack.truncate(pos);
            }
            if stack.is_empty() {
                spans.remove(&self.thread);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// 写终端，一条记录一行
pub struct ConsoleSink {
    stream: Stream,
}

impl ConsoleSink {
    pub fn new(stream: Stream) -> Self {
        ConsoleSink { stream }
    }
}

impl LogSink for ConsoleSink {
    fn write(&self, record: &Record) {
        match self.stream {
            Stream::Stdout => println!("{record}"),
            Stream::Stderr => eprintln!("{record}"),
        }
    }
}

/// 追加写入文件
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> crate::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileSink {
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileSink {
    fn write(&self, record: &Record) {
        // 日志写失败时无处可报
        writeln!(self.file.lock(), "{record}").ok();
    }
}
