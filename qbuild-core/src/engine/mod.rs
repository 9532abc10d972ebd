//! 规则引擎
//!
//! 从目标规则出发，沿前置动作和输入文件的生产者展开依赖图，
//! 在固定大小的线程池上执行过期的规则：
//!
//! - 同一条规则在一次执行中最多运行一次
//! - 单条规则的命令按声明顺序串行执行
//! - `serial` 规则之间互斥，分类限流另外限制并发数
//! - 失败的规则不会让其他独立分支停下来
//!
//! 结果是三态的 [`EngineOutcome`]；只有求值错误、环形依赖和线程 panic
//! 才是 [`EngineError`]。

mod error;
mod scheduler;
mod shell;
mod state;
mod worker;

pub use error::{EngineError, EngineResult};
pub use shell::{ShellExecutor, ShellOutput, SystemShell};
pub use state::{FailureKind, RuleState};

use crate::console::display_name;
use crate::context::BuildContext;
use crate::project::Project;
use qbuild_log::{info, warn};
use scheduler::Scheduler;
use state::{Entry, SchedState};
use std::sync::Arc;
use std::thread;

/// 一次执行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    Succeeded,
    Failed,
    NothingToDo,
}

impl EngineOutcome {
    pub fn is_failure(self) -> bool {
        self == EngineOutcome::Failed
    }
}

/// 规则引擎
pub struct RuleEngine {
    ctx: Arc<BuildContext>,
    threads: usize,
}

impl RuleEngine {
    pub fn new(ctx: Arc<BuildContext>) -> Self {
        let threads = ctx.options().threads.max(1);
        Self { ctx, threads }
    }

    /// 覆盖配置中的线程数
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// 执行 `project` 中的规则 `rule`；空名字表示 `default`
    pub fn execute(&self, project: &Arc<Project>, rule: &str) -> EngineResult<EngineOutcome> {
        let rule = if rule.is_empty() { "default" } else { rule };
        if project.rules().rule_by_name(rule).is_none() {
            return Err(EngineError::NoSuchRule(format!("{}{}", project.name(), rule)));
        }
        info!(self.ctx.logger(), "Executing {}{}", project.name(), rule);
        self.run(project, rule)
    }

    /// 执行产生 `file` 的规则
    pub fn create_file(&self, project: &Arc<Project>, file: &str) -> EngineResult<EngineOutcome> {
        let Some(rule) = project.rules().rule_for_file(file) else {
            return Err(EngineError::CannotFreshen(file.to_string()));
        };
        let outcome = self.run(project, &rule.name)?;
        if outcome == EngineOutcome::NothingToDo {
            self.ctx.console().print(&format!("File {file} fresh"));
        }
        Ok(outcome)
    }

    fn run(&self, project: &Arc<Project>, rule: &str) -> EngineResult<EngineOutcome> {
        let scheduler = Scheduler::new(&self.ctx);
        let mut root = Entry::new(format!("{}{}", project.name(), rule), rule.to_string());
        root.project = Some(Arc::clone(project));
        root.force = self.ctx.options().force;
        let root = scheduler.seed(root);

        let panicked = thread::scope(|scope| -> EngineResult<bool> {
            let mut handles = Vec::with_capacity(self.threads);
            for worker in 0..self.threads {
                let scheduler = &scheduler;
                let spawned = thread::Builder::new()
                    .name(format!("qbuild-worker-{worker}"))
                    .spawn_scoped(scope, move || scheduler.worker(worker));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(err) if handles.is_empty() => return Err(err.into()),
                    Err(err) => {
                        // 空闲判断只看活动计数，少几个线程也能跑完
                        warn!(self.ctx.logger(), "Running with {} workers: {}", handles.len(), err);
                        break;
                    }
                }
            }
            Ok(handles
                .into_iter()
                .map(|handle| handle.join().is_err())
                .fold(false, |any, failed| any || failed))
        })?;

        let mut state = scheduler.lock();
        if panicked || state.panicked {
            return Err(EngineError::WorkerPanic);
        }
        if let Some(err) = state.fatal.take() {
            return Err(EngineError::Eval(err));
        }

        let entry = &state.entries[root];
        match entry.state {
            RuleState::DoneSucceeded => Ok(EngineOutcome::Succeeded),
            RuleState::DoneNothingToDo => {
                self.ctx.console().print(&format!(
                    "Nothing to be done for {}",
                    display_name(&entry.name)
                ));
                Ok(EngineOutcome::NothingToDo)
            }
            RuleState::DoneFailed | RuleState::DoneNotFound => {
                self.ctx.console().print("*** Error");
                self.report(&state, root);
                Ok(EngineOutcome::Failed)
            }
            _ => Err(EngineError::CircularDependency {
                chain: Scheduler::cycle_chain(&state, root),
            }),
        }
    }

    /// 沿失败原因链打印错误
    fn report(&self, state: &SchedState, id: usize) {
        let console = self.ctx.console();
        let mut current = Some(id);
        while let Some(id) = current {
            let entry = &state.entries[id];
            let Some(failure) = &entry.failure else {
                if entry.state == RuleState::DoneNotFound {
                    console.print(&format!("{}: No such rule", entry.name));
                }
                return;
            };
            console.print(&format!("{}: {}", entry.name, failure.kind));
            if !failure.description.is_empty() {
                for line in failure.description.lines() {
                    console.print(&format!("\t{line}"));
                }
            }
            current = failure.cause;
        }
    }
}
