use crate::project::{EvalError, Project};
use crate::rules::{CommandFlags, Rule};
use qbuild_vfs::solution::SolutionProject;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// 一条规则在本次执行中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    /// 只被引用过，还没进队列
    Unvisited,
    Queued,
    /// 等前置规则完成
    Waiting,
    /// 分类限流，等其他规则让出名额
    Throttled,
    Running,
    DoneNotFound,
    DoneNothingToDo,
    DoneFailed,
    DoneSucceeded,
}

impl RuleState {
    pub fn is_done(self) -> bool {
        matches!(
            self,
            RuleState::DoneNotFound
                | RuleState::DoneNothingToDo
                | RuleState::DoneFailed
                | RuleState::DoneSucceeded
        )
    }
}

/// 工作线程下一次拿到条目时要做的事
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// 找到规则，展开前置动作和输入文件
    Prime,
    /// 检查当前阶段的前置规则
    Stage,
    /// 判断是否过期并执行命令
    Run,
}

/// 规则失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    PrereqEval,
    PrereqFunc,
    PrereqMissing,
    PrereqFailed,
    InputEval,
    InputFunc,
    InputMissing,
    TestEval,
    CommandEval,
    CommandExec,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureKind::PrereqEval => "Prerequisite action expansion failed",
            FailureKind::PrereqFunc => "Prerequisite action function expansion failed",
            FailureKind::PrereqMissing => "Prerequisite missing",
            FailureKind::PrereqFailed => "Prerequisite failed",
            FailureKind::InputEval => "Input file expansion failed",
            FailureKind::InputFunc => "Input file function expansion failed",
            FailureKind::InputMissing => "Input file is missing and cannot be created",
            FailureKind::TestEval => "Test expansion failed",
            FailureKind::CommandEval => "Command expansion failed",
            FailureKind::CommandExec => "Command execution failed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub kind: FailureKind,
    pub description: String,
    /// 导致失败的前置规则
    pub cause: Option<usize>,
}

impl Failure {
    pub fn new(kind: FailureKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            cause: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Dep {
    pub id: usize,
    pub flags: CommandFlags,
}

/// 调度表中的一条规则
pub(crate) struct Entry {
    /// `<project><rule>`
    pub name: String,
    pub rule_name: String,
    /// 跨项目引用时尚未打开的项目
    pub target: Option<SolutionProject>,
    pub project: Option<Arc<Project>>,
    pub rule: Option<Arc<Rule>>,
    pub state: RuleState,
    pub phase: Phase,
    pub stages: Vec<Vec<Dep>>,
    pub stage: usize,
    pub registered: bool,
    pub pending: usize,
    pub waiters: Vec<usize>,
    pub inputs: Vec<String>,
    pub force: bool,
    /// 有非隐藏的前置规则真正执行过
    pub succeeded: bool,
    pub failure: Option<Failure>,
}

impl Entry {
    pub fn new(name: String, rule_name: String) -> Self {
        Self {
            name,
            rule_name,
            target: None,
            project: None,
            rule: None,
            state: RuleState::Unvisited,
            phase: Phase::Prime,
            stages: Vec::new(),
            stage: 0,
            registered: false,
            pending: 0,
            waiters: Vec::new(),
            inputs: Vec::new(),
            force: false,
            succeeded: false,
            failure: None,
        }
    }

    /// 当前阶段里第一个还没完成的前置规则
    pub fn blocked_on(&self, entries: &[Entry]) -> Option<usize> {
        self.stages
            .get(self.stage)?
            .iter()
            .map(|dep| dep.id)
            .find(|&id| !entries[id].state.is_done())
    }
}

/// 调度器的共享状态，全部由一把锁保护
#[derive(Default)]
pub(crate) struct SchedState {
    pub entries: Vec<Entry>,
    pub index: HashMap<String, usize>,
    pub ready: VecDeque<usize>,
    pub throttled: Vec<usize>,
    /// 分类 → 正在执行的规则数
    pub categories: HashMap<String, usize>,
    pub serial_running: bool,
    pub active: usize,
    /// 已经进入过的项目（只宣告一次）
    pub entered: HashSet<String>,
    pub panicked: bool,
    pub fatal: Option<EvalError>,
}

impl SchedState {
    /// 按名字取条目，没有就插入 `make()` 的结果
    pub fn intern(&mut self, name: &str, make: impl FnOnce() -> Entry) -> usize {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.entries.len();
        self.entries.push(make());
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn stopped(&self) -> bool {
        self.panicked || self.fatal.is_some()
    }
}
