//! API 层配置
//!
//! RunConfig 汇总一次构建需要的选项和可替换的外部能力（日志、控制台、shell、函数提供者）。
//! 配置随 [`QBuild`](crate::QBuild) 显式传递，没有全局单例。

use qbuild_config::{BuildOptions, ConfigError, FileConfig};
use qbuild_core::{Console, FunctionProvider, ShellExecutor};
use qbuild_log::{Logger, Timings};
use std::sync::Arc;

/// Execution configuration
#[derive(Clone)]
pub struct RunConfig {
    /// Build options
    pub options: BuildOptions,
    /// Logger
    pub logger: Arc<Logger>,
    /// Phase timings (None: created from `options.debug`)
    pub timings: Option<Arc<Timings>>,
    /// Console (None: stdout)
    pub console: Option<Arc<dyn Console>>,
    /// Shell (None: `/bin/sh -c`)
    pub shell: Option<Arc<dyn ShellExecutor>>,
    /// Extra function providers
    pub providers: Vec<Arc<dyn FunctionProvider>>,
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("options", &self.options)
            .field("logger", &self.logger.level())
            .field("console", &self.console.is_some())
            .field("shell", &self.shell.is_some())
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            options: BuildOptions::default(),
            logger: Logger::noop(),
            timings: None,
            console: None,
            shell: None,
            providers: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_timings(mut self, timings: Arc<Timings>) -> Self {
        self.timings = Some(timings);
        self
    }

    pub fn with_console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn with_shell(mut self, shell: Arc<dyn ShellExecutor>) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn FunctionProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// 合并 `qbuild.json` 中的值；要让命令行参数优先，先调用这里再改 `options`
    pub fn with_file_config(mut self, file: &FileConfig) -> Result<Self, ConfigError> {
        self.options.apply_file(file)?;
        Ok(self)
    }
}
