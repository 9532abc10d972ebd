//! QBuild API - 构建编排层
//!
//! 提供统一的构建入口，包括：
//! - 构建流程编排：建立 solution、检测项目节点、打开项目、运行规则引擎
//! - 配置抽象（RunConfig）
//! - 统一错误处理（QBuildError / ErrorReport）
//!
//! 所有状态都挂在 [`QBuild`] 持有的构建上下文上，没有全局单例。

use qbuild_core::kit::{format_tokens, Preprocessor};
use qbuild_core::parser::dump;
use qbuild_core::{BuildContext, Project, RuleEngine};
use qbuild_log::{debug, info, Logger, TimingRow};
use qbuild_vfs::middleware::{CachedLayer, LoggedLayer, VfsBuilder};
use qbuild_vfs::solution::{SolutionDir, SolutionFile, SolutionProject, SolutionRegistry};
use qbuild_vfs::{NativeFileSystem, VirtualFileSystem};
use std::path::Path;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod types;

pub use config::RunConfig;
pub use error::{ErrorDetails, ErrorReport, QBuildError};
pub use types::{Action, ActionList, ExecuteOutput, Target};

// 常用的下层类型
pub use qbuild_config;
pub use qbuild_config::{BuildOptions, DebugFlags, FileConfig, Phase, ThrottleSpec};
pub use qbuild_core::{Console, EngineOutcome, MemoryConsole, StdConsole};

pub type Result<T> = std::result::Result<T, QBuildError>;

/// 本机文件系统，带 stat 缓存和访问日志
pub fn native_fs(logger: &Arc<Logger>) -> Arc<dyn VirtualFileSystem> {
    Arc::new(
        VfsBuilder::new(NativeFileSystem::new())
            .with(CachedLayer::new())
            .with(LoggedLayer::new(Arc::clone(logger)))
            .build(),
    )
}

/// 在 `cwd` 中按配置构建一次 `target`
///
/// `node` 为 `None` 时根据 `cwd` 检测项目节点。
pub fn run(cwd: &str, node: Option<&str>, target: &Target, config: RunConfig) -> Result<ExecuteOutput> {
    let fs = native_fs(&config.logger);
    let qbuild = QBuild::open_directory(fs, cwd, config)?;
    let node = qbuild.detect_node(node)?;
    let project = qbuild.open(&node)?;
    qbuild.execute(&project, target)
}

/// 一次构建会话
///
/// 持有构建上下文；drop 时释放缓存的项目。
pub struct QBuild {
    ctx: Arc<BuildContext>,
    cwd: String,
    /// `-f` 模式下的项目节点
    file_node: Option<String>,
}

impl QBuild {
    /// 在已建好的 solution 上开始会话
    pub fn new(registry: Arc<SolutionRegistry>, cwd: &str, config: RunConfig) -> Self {
        let mut builder = BuildContext::builder(registry)
            .options(config.options)
            .logger(config.logger);
        if let Some(timings) = config.timings {
            builder = builder.timings(timings);
        }
        if let Some(console) = config.console {
            builder = builder.console(console);
        }
        if let Some(shell) = config.shell {
            builder = builder.shell(shell);
        }
        for provider in config.providers {
            builder = builder.provider(provider);
        }
        Self {
            ctx: builder.build(),
            cwd: trim_dir(cwd),
            file_node: None,
        }
    }

    /// 从 `cwd` 向上查找 solution 描述文件；找不到时以 `cwd` 为根
    pub fn open_directory(fs: Arc<dyn VirtualFileSystem>, cwd: &str, config: RunConfig) -> Result<Self> {
        let registry = SolutionRegistry::new(fs, &config.options.project_marker);
        let solution = registry
            .create_default(cwd, &config.options.solution_descriptor)
            .ok_or_else(|| QBuildError::NoProject(cwd.to_string()))?;
        debug!(config.logger, "Default solution {}", solution.name());
        Ok(Self::new(registry, cwd, config))
    }

    /// 单文件模式（`-f`）：`cwd` 和文件所在目录一起作为 solution 根
    pub fn for_file(
        fs: Arc<dyn VirtualFileSystem>,
        cwd: &str,
        file: &str,
        config: RunConfig,
    ) -> Result<Self> {
        let cwd = trim_dir(cwd);
        let path = if file.starts_with('/') {
            file.to_string()
        } else {
            qbuild_vfs::path::join(&cwd, file)
        };
        if !fs.is_file(Path::new(&path)) {
            return Err(QBuildError::Usage(format!("The file {file} does not exist")));
        }
        let (dir, name) = match path.rfind('/') {
            Some(idx) => (&path[..idx], &path[idx + 1..]),
            None => ("", path.as_str()),
        };

        let registry = SolutionRegistry::new(fs, &config.options.project_marker);
        let mut dirs = vec![SolutionDir::new("", cwd.clone())];
        if !dir.is_empty() && dir != cwd {
            dirs.push(SolutionDir::new("", dir));
        }
        registry.create("default", dirs);

        let node = format!("/{name}/");
        let mut qbuild = Self::new(registry, &cwd, config);
        qbuild.file_node = Some(node);
        Ok(qbuild)
    }

    pub fn context(&self) -> &Arc<BuildContext> {
        &self.ctx
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// 确定要构建的项目节点
    ///
    /// - 单文件模式：文件对应的节点
    /// - 没有给出或为 `.`：工作目录对应的节点
    /// - 相对路径：相对工作目录，目录不存在时先创建
    /// - 绝对节点或带 solution 前缀：原样使用
    pub fn detect_node(&self, node: Option<&str>) -> Result<String> {
        if let Some(file_node) = &self.file_node {
            return Ok(file_node.clone());
        }
        let real = match node {
            None | Some(".") => self.cwd.clone(),
            Some(node) if node.starts_with('/') || node.contains(':') => {
                return Ok(node.to_string());
            }
            Some(node) => {
                let dir = qbuild_vfs::path::join(&self.cwd, node);
                let fs = self.ctx.registry().fs();
                if !fs.is_dir(Path::new(&dir)) {
                    fs.create_dir_all(Path::new(&dir))?;
                }
                fs.canonicalize(Path::new(&dir))
                    .map(|path| path.to_string_lossy().into_owned())
                    .unwrap_or(dir)
            }
        };

        let solution = self
            .ctx
            .registry()
            .default_solution()
            .ok_or_else(|| QBuildError::NoProject(real.clone()))?;
        let detected = solution
            .fuzzy_real_to_solution(&real)
            .map(|file| file.solution_path().to_string())
            .ok_or_else(|| QBuildError::NoProject(real.clone()))?;
        debug!(self.ctx.logger(), "Detected node {} for {}", detected, real);
        Ok(detected)
    }

    /// 打开并 finalize 项目
    pub fn open(&self, node: &str) -> Result<Arc<Project>> {
        Ok(self.ctx.open(node)?)
    }

    /// 项目文件；虚拟项目没有
    pub fn project_file(&self, node: &str) -> Result<Option<SolutionFile>> {
        let sp = SolutionProject::from_node(self.ctx.registry(), node, None)
            .ok_or_else(|| QBuildError::NoProject(node.to_string()))?;
        Ok(sp.project_file().cloned())
    }

    /// 运行规则或刷新文件
    pub fn execute(&self, project: &Arc<Project>, target: &Target) -> Result<ExecuteOutput> {
        info!(self.ctx.logger(), "Building {} ({:?})", project.name(), target);
        let engine = RuleEngine::new(Arc::clone(&self.ctx));
        let outcome = match target {
            Target::Rule(rule) => engine.execute(project, rule)?,
            Target::Freshen(file) => engine.create_file(project, file)?,
        };
        info!(self.ctx.logger(), "Build of {} finished: {:?}", project.name(), outcome);
        Ok(ExecuteOutput {
            project: project.name().to_string(),
            target: target.clone(),
            outcome,
        })
    }

    /// 带帮助文本的规则
    pub fn actions(&self, project: &Project) -> ActionList {
        let actions = project
            .rules()
            .rules()
            .filter(|rule| !rule.help.is_empty())
            .map(|rule| Action {
                name: rule.name.clone(),
                help: rule.help.clone(),
            })
            .collect();
        ActionList(actions)
    }

    /// 所有 solution 的映射表
    pub fn solutions_report(&self) -> String {
        self.ctx.registry().dump()
    }

    /// 项目文件的预处理 token 列表（`-tokenize`）
    pub fn tokens(&self, node: &str) -> Result<String> {
        let Some(source) = self.project_source(node)? else {
            return Ok(String::new());
        };
        let tokens = Preprocessor::with_logger(Arc::clone(self.ctx.logger())).tokenize(&source);
        Ok(format_tokens(&source, &tokens))
    }

    /// 项目文件的语法树（`-parse-tree`）
    pub fn parse_tree(&self, node: &str) -> Result<String> {
        let Some(source) = self.project_source(node)? else {
            return Ok(String::new());
        };
        let tree = qbuild_core::parse(&source)?;
        Ok(dump::to_tree(&tree))
    }

    fn project_source(&self, node: &str) -> Result<Option<String>> {
        let Some(file) = self.project_file(node)? else {
            return Ok(None);
        };
        let bytes = self
            .ctx
            .registry()
            .fs()
            .read_file(Path::new(file.fs_path()))?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// 各阶段耗时，按总时间排序
    pub fn timings_report(&self) -> Vec<TimingRow> {
        self.ctx.timings().report()
    }

    /// 释放缓存的项目和解析结果
    pub fn teardown(&self) {
        self.ctx.teardown();
    }
}

impl Drop for QBuild {
    fn drop(&mut self) {
        self.ctx.teardown();
    }
}

fn trim_dir(dir: &str) -> String {
    match dir.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}
