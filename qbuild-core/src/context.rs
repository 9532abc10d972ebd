//! 构建上下文
//!
//! 一次构建共享的全部状态都挂在 [`BuildContext`] 上：选项、日志、计时、
//! solution 注册表、函数提供者、类型钩子、扩展目录、解析缓存和项目缓存。
//! 没有任何全局变量；上下文以 `Arc` 传给项目和规则引擎。
//!
//! 项目持有上下文，上下文的项目缓存又持有项目，构建结束时调用
//! [`BuildContext::teardown`] 打破这个环。

use crate::console::{display_name, Console, StdConsole};
use crate::engine::{ShellExecutor, SystemShell};
use crate::parser::ParseCache;
use crate::project::{
    project_name, Builtins, EvalError, EvalResult, FunctionProvider, FunctionRegistry, Project,
    ProjectCache,
};
use parking_lot::{Mutex, RwLock};
use qbuild_config::BuildOptions;
use qbuild_log::{info, Logger, Timings};
use qbuild_vfs::solution::{FileMode, Solution, SolutionFile, SolutionProject, SolutionRegistry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// 类型钩子的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeHook {
    /// `TYPE` 新增了某个值
    New,
    /// `TYPE` 去掉了某个值
    Del,
}

/// 一次构建的上下文
pub struct BuildContext {
    options: BuildOptions,
    logger: Arc<Logger>,
    timings: Arc<Timings>,
    registry: Arc<SolutionRegistry>,
    functions: FunctionRegistry,
    console: Arc<dyn Console>,
    shell: Arc<dyn ShellExecutor>,
    parse_cache: ParseCache,
    projects: ProjectCache,
    type_hooks: RwLock<HashMap<(TypeHook, String), Vec<String>>>,
    extension_paths: RwLock<Vec<String>>,
    extensions: Mutex<HashMap<(String, String), Option<SolutionFile>>>,
}

/// [`BuildContext`] 构建器
pub struct BuildContextBuilder {
    registry: Arc<SolutionRegistry>,
    options: BuildOptions,
    logger: Option<Arc<Logger>>,
    timings: Option<Arc<Timings>>,
    console: Option<Arc<dyn Console>>,
    shell: Option<Arc<dyn ShellExecutor>>,
    providers: Vec<Arc<dyn FunctionProvider>>,
}

impl BuildContextBuilder {
    pub fn options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn timings(mut self, timings: Arc<Timings>) -> Self {
        self.timings = Some(timings);
        self
    }

    pub fn console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn shell(mut self, shell: Arc<dyn ShellExecutor>) -> Self {
        self.shell = Some(shell);
        self
    }

    /// 额外的函数提供者；内建函数总是最后尝试
    pub fn provider(mut self, provider: Arc<dyn FunctionProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> Arc<BuildContext> {
        let logger = self.logger.unwrap_or_else(Logger::noop);
        let timings = self
            .timings
            .unwrap_or_else(|| Timings::new(self.options.debug.perf_timing));
        let functions = FunctionRegistry::new();
        functions.register(Arc::new(Builtins));
        for provider in self.providers {
            functions.register(provider);
        }
        let extension_paths = self
            .options
            .extension_paths
            .iter()
            .map(|path| configured_extension_path(path))
            .collect();

        Arc::new(BuildContext {
            parse_cache: ParseCache::new(Arc::clone(&logger)),
            console: self.console.unwrap_or_else(|| Arc::new(StdConsole)),
            shell: self.shell.unwrap_or_else(|| Arc::new(SystemShell)),
            registry: self.registry,
            options: self.options,
            logger,
            timings,
            functions,
            projects: ProjectCache::new(),
            type_hooks: RwLock::new(HashMap::new()),
            extension_paths: RwLock::new(extension_paths),
            extensions: Mutex::new(HashMap::new()),
        })
    }
}

fn trim_path(path: &str) -> String {
    match path.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// 配置中的绝对路径指向真实目录（`!` 前缀），其余是 solution 中的逻辑路径
fn configured_extension_path(path: &Path) -> String {
    let text = trim_path(&path.to_string_lossy());
    if path.is_absolute() {
        format!("!{text}")
    } else {
        text
    }
}

impl BuildContext {
    pub fn builder(registry: Arc<SolutionRegistry>) -> BuildContextBuilder {
        BuildContextBuilder {
            registry,
            options: BuildOptions::default(),
            logger: None,
            timings: None,
            console: None,
            shell: None,
            providers: Vec::new(),
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn timings(&self) -> &Arc<Timings> {
        &self.timings
    }

    pub fn registry(&self) -> &Arc<SolutionRegistry> {
        &self.registry
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn console(&self) -> &Arc<dyn Console> {
        &self.console
    }

    pub fn shell(&self) -> &Arc<dyn ShellExecutor> {
        &self.shell
    }

    pub fn parse_cache(&self) -> &ParseCache {
        &self.parse_cache
    }

    pub fn projects(&self) -> &ProjectCache {
        &self.projects
    }

    // ---- 项目 ----

    /// 按 `[solution:]node` 打开项目
    pub fn open(self: &Arc<Self>, node: &str) -> EvalResult<Arc<Project>> {
        let sp = SolutionProject::from_node(&self.registry, node, None)
            .ok_or_else(|| EvalError::NoSuchProject(node.to_string()))?;
        self.open_project(sp)
    }

    /// 打开并 finalize 项目；同一个项目只打开一次
    pub fn open_project(self: &Arc<Self>, sp: SolutionProject) -> EvalResult<Arc<Project>> {
        let key = format!("{}:{}", sp.solution().name(), sp.node());
        self.projects.get_or_open(&key, || {
            let name = project_name(&self.registry, &sp);
            if !self.options.silent && !sp.file_mode() {
                self.console
                    .print(&format!("QBuild: Opening project {}", display_name(&name)));
            }
            info!(self.logger, "Opening project {}", name);
            let timer = self.timings.start("Project::Load");
            let project = Project::new(Arc::clone(self), sp);
            let result = project.load().and_then(|()| project.finalize());
            drop(timer);
            result.map_err(|err| err.in_project(&name))?;
            Ok(project)
        })
    }

    // ---- 类型钩子 ----

    pub fn add_type_hook(&self, hook: TypeHook, type_name: &str, function: &str) {
        let mut hooks = self.type_hooks.write();
        let functions = hooks.entry((hook, type_name.to_string())).or_default();
        if !functions.iter().any(|f| f == function) {
            functions.push(function.to_string());
        }
    }

    pub fn type_hooks(&self, hook: TypeHook, type_name: &str) -> Vec<String> {
        self.type_hooks
            .read()
            .get(&(hook, type_name.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    // ---- 扩展 ----

    pub fn add_extensions_path(&self, path: &str) {
        let path = trim_path(path);
        let mut paths = self.extension_paths.write();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    pub fn extension_paths(&self) -> Vec<String> {
        self.extension_paths.read().clone()
    }

    /// 在扩展目录中找 `<name>.pri`，按 (名字, solution) 缓存
    pub fn find_extension(&self, name: &str, solution: &Solution) -> Option<SolutionFile> {
        let key = (name.to_string(), solution.name().to_string());
        if let Some(found) = self.extensions.lock().get(&key) {
            return found.clone();
        }
        let found = self.extension_paths().iter().find_map(|path| {
            solution.find_file(&format!("{path}/{name}.pri"), FileMode::Existing, None)
        });
        self.extensions.lock().insert(key, found.clone());
        found
    }

    /// 释放缓存的项目
    pub fn teardown(&self) {
        self.projects.clear();
        self.parse_cache.clear();
        self.extensions.lock().clear();
    }
}
