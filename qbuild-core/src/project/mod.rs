//! 项目求值器
//!
//! [`Project`] 持有一个项目的对象树和规则组，负责：
//!
//! - 生命周期：`init` → `run_project` → `finalize`，期间可以被 reset 重新开始
//! - 解释语法树（见 `eval`）
//! - 通过 [`FunctionProvider`] 调用函数
//! - 分派对象树的修改通知（`CONFIG` 订阅、类型钩子、`watch`）
//!
//! finalize 之后对象树只读，项目可以被多个工作线程同时读取。
//!
//! # 加锁约定
//!
//! 对象树、规则组和求值状态各自一把锁，持锁期间从不调用函数提供者，
//! 提供者可以随意回调项目的任何方法。

mod builtins;
mod cache;
mod error;
mod eval;
mod finalize;
mod functions;
mod regexp;
mod variables;

pub use builtins::{Builtins, BUILTIN_PRIORITY};
pub use cache::ProjectCache;
pub use error::{EvalError, EvalResult};
pub use eval::function_result_to_bool;
pub use finalize::{finalize_order, FinalizeModule};
pub use functions::{
    FunctionProvider, FunctionRegistry, NativeFunction, NativeFunctions, ScriptHandler,
};
pub use regexp::Substitution;
pub use variables::InternalVariables;

use crate::console::{project_message, MessageLevel};
use crate::context::{BuildContext, TypeHook};
use crate::object::{Notification, ObjectError, ObjectTree, TraceContext};
use crate::parser::AssignOp;
use crate::rules::{Rule, Rules};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use qbuild_log::{debug, warn};
use qbuild_vfs::solution::{
    FileMode, Includes, Solution, SolutionFile, SolutionProject, SolutionRegistry,
};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// 求值过程中的可变状态
#[derive(Debug, Default)]
struct EvalState {
    /// 正在执行的文件
    file: Option<SolutionFile>,
    /// `NAME [ ... ]` 块的前缀
    using: String,
    resetting: bool,
    /// 跨 init 保留
    reset_reasons: BTreeMap<String, String>,
    included: Vec<String>,
    extensions: HashSet<String>,
    is_virtual: bool,
    has_warnings: bool,
    finalized: bool,
}

/// 一个打开的项目
pub struct Project {
    ctx: Arc<BuildContext>,
    sp: SolutionProject,
    name: String,
    build_dir: String,
    tree: RwLock<ObjectTree>,
    rules: RwLock<Rules>,
    state: Mutex<EvalState>,
}

/// 项目名：以 `/` 开头；非默认 solution 加 `sln:` 前缀
pub fn project_name(registry: &SolutionRegistry, sp: &SolutionProject) -> String {
    let mut name = sp.node().to_string();
    if !name.starts_with('/') {
        name.insert(0, '/');
    }
    let is_default = registry
        .default_solution()
        .is_some_and(|default| Arc::ptr_eq(&default, sp.solution()));
    if is_default {
        name
    } else {
        format!("{}:{}", sp.solution().name(), name)
    }
}

impl Project {
    /// 创建尚未求值的项目；由构建上下文负责 `load` 和 `finalize`
    pub(crate) fn new(ctx: Arc<BuildContext>, sp: SolutionProject) -> Self {
        let name = project_name(ctx.registry(), &sp);
        let build_dir = sp
            .solution()
            .find_file(sp.node_path(), FileMode::Generated, None)
            .map(|file| file.fs_path().trim_end_matches('/').to_string())
            .unwrap_or_default();
        let state = EvalState {
            file: sp.project_file().cloned(),
            ..EvalState::default()
        };
        Self {
            tree: RwLock::new(ObjectTree::new(name.clone())),
            rules: RwLock::new(Rules::new(name.clone())),
            state: Mutex::new(state),
            ctx,
            sp,
            name,
            build_dir,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> &str {
        self.sp.node()
    }

    pub fn solution_project(&self) -> &SolutionProject {
        &self.sp
    }

    pub fn solution(&self) -> &Arc<Solution> {
        self.sp.solution()
    }

    pub fn context(&self) -> &Arc<BuildContext> {
        &self.ctx
    }

    /// 构建目录（真实路径，不带末尾 `/`）
    pub fn build_dir(&self) -> &str {
        &self.build_dir
    }

    /// 当前正在执行的文件
    pub fn file(&self) -> Option<SolutionFile> {
        self.state.lock().file.clone()
    }

    pub fn is_file_mode(&self) -> bool {
        self.sp.file_mode()
    }

    /// 没有项目文件，或者被禁用
    pub fn is_virtual(&self) -> bool {
        self.state.lock().is_virtual
    }

    pub fn is_disabled(&self) -> bool {
        self.state.lock().reset_reasons.contains_key("disabled")
    }

    pub fn disabled_reason(&self) -> Option<String> {
        self.state.lock().reset_reasons.get("disabled").cloned()
    }

    pub fn is_finalized(&self) -> bool {
        self.state.lock().finalized
    }

    pub fn has_warnings(&self) -> bool {
        self.state.lock().has_warnings
    }

    pub fn is_resetting(&self) -> bool {
        self.state.lock().resetting
    }

    /// 执行过的文件（真实路径）
    pub fn included_files(&self) -> Vec<String> {
        self.state.lock().included.clone()
    }

    /// 已加载的扩展
    pub fn is_loaded(&self, extension: &str) -> bool {
        self.state.lock().extensions.contains(extension)
    }

    // ---- 对象树 ----

    /// 只读访问对象树
    pub fn with_tree<R>(&self, f: impl FnOnce(&ObjectTree) -> R) -> R {
        f(&self.tree.read())
    }

    /// 本项目中变量的值；不存在时为空
    pub fn value(&self, path: &str) -> Vec<String> {
        self.lookup(path).unwrap_or_default()
    }

    fn lookup(&self, path: &str) -> Option<Vec<String>> {
        let tree = self.tree.read();
        let node = tree.lookup(tree.root(), path)?;
        Some(tree.value(node).to_vec())
    }

    /// `CONFIG` 是否包含 `option`
    pub fn is_active_config(&self, option: &str) -> bool {
        self.value("CONFIG").iter().any(|v| v == option)
    }

    /// 可以跨项目寻址的取值
    ///
    /// `OBJ.path` 取本项目；`rel/project/OBJ` 相对本项目解析，
    /// `/abs/project/OBJ` 和 `sln:/project/OBJ` 是绝对路径。
    /// 对象部分为空时取项目根节点。
    pub fn object_value(&self, path: &str) -> EvalResult<Option<Vec<String>>> {
        let Some((project, object)) = path.rsplit_once('/') else {
            return Ok(self.lookup(path));
        };
        let node = self.resolve_node(project);
        let Some(sp) =
            SolutionProject::from_node(self.ctx.registry(), &node, Some(self.solution()))
        else {
            return Ok(None);
        };
        if sp == self.sp {
            return Ok(self.lookup(object));
        }
        let other = self.ctx.open_project(sp)?;
        Ok(other.lookup(object))
    }

    fn resolve_node(&self, project: &str) -> String {
        if let Some((solution, rest)) = project.split_once(':') {
            if !solution.contains('/') {
                return format!("{}:/{}/", solution, rest.trim_matches('/'));
            }
        }
        let mut parts: Vec<&str> = if project.starts_with('/') {
            Vec::new()
        } else {
            self.sp
                .node_path()
                .split('/')
                .filter(|p| !p.is_empty())
                .collect()
        };
        for part in project.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                part => parts.push(part),
            }
        }
        if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", parts.join("/"))
        }
    }

    /// 修改变量，随后分派修改通知
    pub fn assign(
        &self,
        path: &str,
        op: AssignOp,
        values: Vec<String>,
        trace: Option<&TraceContext>,
    ) -> EvalResult<()> {
        let notifications = {
            let mut tree = self.tree.write();
            let root = tree.root();
            let node = tree
                .property(root, path)
                .ok_or_else(|| ObjectError::ReadOnly {
                    path: format!("{}{}", self.name, path),
                    operation: "create",
                })?;
            match op {
                AssignOp::Assign => tree.set_value(node, values, trace)?,
                AssignOp::Add => tree.add_value(node, values, trace)?,
                AssignOp::Remove => tree.subtract_value(node, &values, trace)?,
                AssignOp::Unite => tree.unite_value(node, values, trace)?,
                AssignOp::Regexp => {
                    drop(tree);
                    return self.regexp_value(path, &values.join(" "), trace);
                }
            }
            tree.take_notifications()
        };
        self.dispatch(notifications)
    }

    /// `~=`：无效的表达式只记录日志
    pub fn regexp_value(
        &self,
        path: &str,
        expression: &str,
        trace: Option<&TraceContext>,
    ) -> EvalResult<()> {
        let Some(substitution) = Substitution::parse(expression) else {
            warn!(self.ctx.logger(), "Invalid regexp {:?} for {}", expression, path);
            return Ok(());
        };
        let current = self.value(path);
        match substitution.apply(&current) {
            Ok(Some(values)) => self.assign(path, AssignOp::Assign, values, trace),
            Ok(None) => Ok(()),
            Err(err) => {
                warn!(self.ctx.logger(), "Invalid regexp {:?}: {}", expression, err);
                Ok(())
            }
        }
    }

    /// 变量变化时运行 `function`
    pub fn watch(&self, path: &str, function: &str) -> EvalResult<()> {
        let mut tree = self.tree.write();
        let root = tree.root();
        let node = tree
            .property(root, path)
            .ok_or_else(|| ObjectError::ReadOnly {
                path: format!("{}{}", self.name, path),
                operation: "watch",
            })?;
        tree.watch(node, function);
        Ok(())
    }

    fn dispatch(&self, notifications: Vec<Notification>) -> EvalResult<()> {
        for notification in notifications {
            if self.is_resetting() {
                break;
            }
            match notification {
                Notification::Changed {
                    subscription,
                    added,
                    ..
                } if subscription == "CONFIG" => {
                    for config in added {
                        self.load_extension(&config)?;
                    }
                }
                Notification::Changed { .. } => {}
                Notification::NewType { path, type_name } => {
                    self.run_type_hooks(TypeHook::New, &path, &type_name)?
                }
                Notification::DelType { path, type_name } => {
                    self.run_type_hooks(TypeHook::Del, &path, &type_name)?
                }
                Notification::Watch { functions, .. } => {
                    for function in functions {
                        self.call_function(&function, &[])?;
                    }
                }
            }
        }
        Ok(())
    }

    fn run_type_hooks(&self, hook: TypeHook, path: &str, type_name: &str) -> EvalResult<()> {
        for function in self.ctx.type_hooks(hook, type_name) {
            self.call_function(&function, &[vec![path.to_string()]])?;
        }
        Ok(())
    }

    // ---- 消息 ----

    /// 打印项目消息；警告和错误会让 finalize 失败
    pub fn message(&self, level: MessageLevel, text: &str) {
        if matches!(level, MessageLevel::Warning | MessageLevel::Error) {
            self.state.lock().has_warnings = true;
        }
        self.ctx
            .console()
            .print(&project_message(&self.name, level, text));
    }

    pub fn warning(&self, text: &str) {
        self.message(MessageLevel::Warning, text);
    }

    pub fn info(&self, text: &str) {
        self.message(MessageLevel::Information, text);
    }

    // ---- 生命周期 ----

    /// 以 `reason` 重新开始求值；同一个原因只能用一次
    pub fn reset(&self, reason: &str, value: &str) -> EvalResult<()> {
        let mut state = self.state.lock();
        if state.reset_reasons.contains_key(reason) {
            return Err(EvalError::DuplicateReset(reason.to_string()));
        }
        state
            .reset_reasons
            .insert(reason.to_string(), value.to_string());
        state.resetting = true;
        Ok(())
    }

    pub fn set_disabled(&self, reason: &str) -> EvalResult<()> {
        if self.is_file_mode() {
            return Err(EvalError::DisableInFileMode);
        }
        if self.is_disabled() {
            self.warning("Cannot disable project from within disable scripts");
            return Ok(());
        }
        self.reset("disabled", reason)
    }

    /// init 和 run_project，直到不再 reset
    pub(crate) fn load(&self) -> EvalResult<()> {
        let span = self.ctx.logger().enter_span("project", self.name.as_str());
        let result = self.load_until_settled();
        drop(span);
        result
    }

    fn load_until_settled(&self) -> EvalResult<()> {
        loop {
            self.state.lock().resetting = false;
            self.init()?;
            if !self.is_resetting() {
                self.run_project()?;
            }
            if !self.is_resetting() {
                return Ok(());
            }
            debug!(self.ctx.logger(), "Project {} reset", self.name);
        }
    }

    fn init(&self) -> EvalResult<()> {
        {
            let mut tree = self.tree.write();
            let root = tree.root();
            tree.clear(root, None)?;
            tree.set_tracing(self.ctx.options().debug.trace);
            if let Some(config) = tree.property(root, "CONFIG") {
                tree.subscribe(config, "CONFIG");
            }
            drop(tree.take_notifications());
        }
        {
            let mut state = self.state.lock();
            state.included.clear();
            state.extensions.clear();
            state.is_virtual = false;
            state.finalized = false;
            state.using.clear();
            state.file = self.sp.project_file().cloned();
        }
        *self.rules.write() = Rules::new(self.name.clone());

        if !self.is_file_mode() {
            let common = self.includes().common;
            self.include_all(&common)?;
        }
        Ok(())
    }

    fn run_project(&self) -> EvalResult<()> {
        let includes = self.includes();
        if self.is_disabled() {
            self.include_all(&includes.disabled)?;
            self.state.lock().is_virtual = true;
            return Ok(());
        }
        match self.sp.project_file().cloned() {
            Some(file) => {
                if !self.is_file_mode() {
                    self.include_all(&includes.default)?;
                }
                if !self.is_resetting() {
                    self.include_file(&file)?;
                }
            }
            None => {
                self.include_all(&includes.blank)?;
                self.state.lock().is_virtual = true;
            }
        }
        Ok(())
    }

    fn includes(&self) -> Includes {
        self.solution()
            .includes(&self.ctx.extension_paths())
            .clone()
    }

    fn include_all(&self, files: &[SolutionFile]) -> EvalResult<()> {
        for file in files {
            if self.is_resetting() {
                break;
            }
            self.include_file(file)?;
        }
        Ok(())
    }

    /// 解析并执行一个文件；文件不可读时返回 `false`
    pub fn include_file(&self, file: &SolutionFile) -> EvalResult<bool> {
        let file = self.solution().canonical_path(file);
        let path = file.fs_path().to_string();
        let fs = self.solution().fs();
        if !fs.is_file(Path::new(&path)) {
            return Ok(false);
        }
        if self.ctx.options().debug.run_trace {
            debug!(self.ctx.logger(), "Including {}", path);
        }
        self.state.lock().included.push(path.clone());

        let timer = self.ctx.timings().start("Project::Parse");
        let parsed = self.ctx.parse_cache().get_or_parse(&path, || {
            fs.read_file(Path::new(&path))
                .ok()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        });
        drop(timer);
        let block = match parsed {
            Ok(block) => block,
            Err(err) if err.is_empty_input() => return Ok(true),
            Err(err) => {
                return Err(EvalError::Parse {
                    file: path,
                    line: err.line().unwrap_or(0),
                    column: err.column().unwrap_or(0),
                    message: err.message(),
                })
            }
        };

        let previous = std::mem::replace(&mut self.state.lock().file, Some(file));
        let result = self.run_multi(&block);
        self.state.lock().file = previous;
        result.map(|()| true)
    }

    /// 加载扩展，每个项目只加载一次
    pub fn load_extension(&self, name: &str) -> EvalResult<bool> {
        if name.is_empty() || !self.state.lock().extensions.insert(name.to_string()) {
            return Ok(!name.is_empty());
        }
        for provider in self.ctx.functions().providers() {
            if provider.load(self, name)? {
                return Ok(true);
            }
        }
        self.state.lock().extensions.remove(name);
        Ok(false)
    }

    /// 依次询问函数提供者；都不认识时返回 `Ok(None)`
    pub fn call_function(&self, name: &str, args: &[Vec<String>]) -> EvalResult<Option<Vec<String>>> {
        for provider in self.ctx.functions().providers() {
            if let Some(result) = provider.call(self, name, args)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    // ---- 规则 ----

    /// 规则组的只读视图
    pub fn rules(&self) -> RwLockReadGuard<'_, Rules> {
        self.rules.read()
    }

    /// 加入规则；抢占其他规则的输出时记录警告
    pub fn add_rule(&self, rule: Rule) -> Arc<Rule> {
        let mut rules = self.rules.write();
        for (file, owner) in rules.conflicts(&rule) {
            warn!(
                self.ctx.logger(),
                "Rule {}{} takes output {} from rule {}", self.name, rule.name, file, owner
            );
        }
        rules.add_rule(rule)
    }

    /// `rule([name])`：声明规则对象并立即登记；空名字得到匿名规则
    pub fn declare_rule(&self, name: &str) -> EvalResult<String> {
        let name = {
            let mut rules = self.rules.write();
            let name = if name.is_empty() {
                rules.next_anonymous()
            } else {
                name.to_string()
            };
            if rules.rule_by_name(&name).is_none() {
                let mut rule = Rule::new(name.clone());
                rule.trace.push(self.trace_context(0));
                rules.add_rule(rule);
            }
            name
        };
        let trace = self.trace_context(0);
        self.assign(
            &format!("{name}.TYPE"),
            AssignOp::Unite,
            vec!["RULE".to_string()],
            Some(&trace),
        )?;
        Ok(name)
    }

    /// `-rules` 输出
    pub fn dump_rules(&self, filter: Option<&str>) -> String {
        self.rules.read().dump(filter)
    }

    /// `-parse` / `-finalize` 输出
    pub fn dump(&self) -> String {
        let tree = self.tree.read();
        tree.dump(tree.root())
    }

    /// 当前文件和行号
    pub(crate) fn trace_context(&self, line: usize) -> TraceContext {
        let file = self
            .state
            .lock()
            .file
            .as_ref()
            .map(|f| f.fs_path().to_string())
            .unwrap_or_default();
        TraceContext::new(file, line)
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("build_dir", &self.build_dir)
            .finish_non_exhaustive()
    }
}
