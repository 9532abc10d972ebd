//! CLI 日志系统初始化
//!
//! 基于 `tracing-subscriber` 实现分阶段日志控制。库层的 `qbuild-log` 记录
//! 通过 [`TracingSink`] 转成 tracing 事件，按阶段 target 过滤。

use crate::config::{log_level, LogConfig};
use clap::ValueEnum;
use qbuild_config::Phase;
use qbuild_log::{LogHandle, LogSink, Record};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{
    filter::Targets, fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, Layer,
    Registry,
};

/// 日志输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// 彩色格式化（开发使用）
    Pretty,
    /// 紧凑格式
    Compact,
    /// JSON 格式（工具集成）
    Json,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 使用指定格式和日志配置初始化日志系统
///
/// 日志写到 stderr，控制台输出留给构建本身；给出 `file` 时另外追加到文件。
pub fn init_with_file(log_config: &LogConfig, format: LogFormat, file: Option<&Path>) -> io::Result<()> {
    let mut targets = Targets::new().with_default(log_config.global);
    for phase in Phase::ALL {
        let target = phase.target();
        let level = log_config.level_for(&target);
        targets = targets.with_target(target, level);
    }

    let mut layers: Vec<BoxedLayer> =
        vec![create_format_layer(format, io::stderr, true).with_filter(targets.clone()).boxed()];

    if let Some(path) = file {
        let file_handle = OpenOptions::new().create(true).append(true).open(path)?;
        layers.push(
            create_format_layer(format, Mutex::new(file_handle), false)
                .with_filter(targets)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(io::Error::other)
}

/// Create formatter layer based on format
fn create_format_layer<W>(format: LogFormat, make_writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_ansi(ansi)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_ansi(ansi)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
    }
}

/// 致命错误时转储的最近记录条数
const CRASH_DUMP_RECORDS: usize = 200;

/// 构建 CLI 使用的日志器：级别取各阶段中最详细的一个
pub fn build_logger(log_config: &LogConfig) -> LogHandle {
    qbuild_log::LogConfig::new(log_level(log_config.most_verbose()))
        .with_ring_buffer(CRASH_DUMP_RECORDS)
        .init()
        .with_sink(TracingSink)
}

/// 把 `qbuild-log` 记录转成 tracing 事件
///
/// tracing 的 target 必须是常量，这里按模块路径归到固定的阶段 target 上，
/// 原始模块路径放在 `module` 字段里。
pub struct TracingSink;

macro_rules! emit {
    ($target:literal, $record:expr) => {{
        let record = $record;
        match record.level {
            qbuild_log::Level::Trace => {
                tracing::trace!(target: $target, module = record.target, scope = record.span.as_deref(), "{}", record.message)
            }
            qbuild_log::Level::Debug => {
                tracing::debug!(target: $target, module = record.target, scope = record.span.as_deref(), "{}", record.message)
            }
            qbuild_log::Level::Info => {
                tracing::info!(target: $target, module = record.target, scope = record.span.as_deref(), "{}", record.message)
            }
            qbuild_log::Level::Warn => {
                tracing::warn!(target: $target, module = record.target, scope = record.span.as_deref(), "{}", record.message)
            }
            qbuild_log::Level::Error => {
                tracing::error!(target: $target, module = record.target, scope = record.span.as_deref(), "{}", record.message)
            }
        }
    }};
}

impl LogSink for TracingSink {
    fn write(&self, record: &Record) {
        match Phase::from_module_path(record.target) {
            Phase::Lexer => emit!("qbuild::lexer", record),
            Phase::Parser => emit!("qbuild::parser", record),
            Phase::Eval => emit!("qbuild::eval", record),
            Phase::Vfs => emit!("qbuild::vfs", record),
            Phase::Engine => emit!("qbuild::engine", record),
            Phase::Cli => emit!("qbuild::cli", record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbuild_log::Level;

    #[test]
    fn test_tracing_sink_accepts_every_phase() {
        // 没有安装 subscriber 时事件被丢弃，不应 panic
        let sink = TracingSink;
        for target in [
            "qbuild_core::kit::lexer",
            "qbuild_core::parser::cache",
            "qbuild_core::project",
            "qbuild_vfs::middleware::logged",
            "qbuild_core::engine::worker",
            "qbuild_api",
        ] {
            sink.write(&Record::new(Level::Info, target, "message"));
        }
        sink.write(&Record::new(Level::Warn, "qbuild_core::engine", "slow").with_span("rule link"));
    }

    #[test]
    fn test_build_logger_level() {
        let config = LogConfig {
            parser: Some(tracing::Level::DEBUG),
            ..LogConfig::default()
        };
        let handle = build_logger(&config);
        assert_eq!(handle.logger.level(), Level::Debug);
        assert!(handle.logger.is_enabled(Level::Debug));
        assert!(!handle.logger.is_enabled(Level::Trace));

        handle.logger.log(Level::Debug, "qbuild_core::parser", "parsed");
        assert!(handle.crash_dump().unwrap().ends_with("parsed"));
    }
}
