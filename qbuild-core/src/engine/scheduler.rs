//! 调度器
//!
//! 所有条目放在一张表里，由一把锁保护。工作线程从就绪队列取条目，
//! 在锁外做耗时的事（打开项目、展开表达式、检查文件、执行命令），
//! 再回到锁内推进状态。条目等待前置规则时登记在对方的 `waiters` 上，
//! 对方完成时把计数减到零的等待者放回就绪队列。
//!
//! 就绪队列为空且没有线程在工作时调度结束；此时还没完成的条目一定
//! 卡在环上。

use super::state::{Dep, Entry, Failure, FailureKind, Phase, RuleState, SchedState};
use crate::context::BuildContext;
use crate::project::EvalError;
use crate::rules::{CommandFlags, Rule};
use parking_lot::{Condvar, Mutex, MutexGuard};
use qbuild_log::debug;
use std::sync::Arc;
use std::thread;

pub(crate) struct Scheduler<'a> {
    pub(crate) ctx: &'a Arc<BuildContext>,
    pub(crate) state: Mutex<SchedState>,
    wake: Condvar,
}

/// 工作线程处理条目期间持有；析构时归还计数，线程 panic 时记下来
struct ActiveGuard<'s, 'a> {
    scheduler: &'s Scheduler<'a>,
}

impl Drop for ActiveGuard<'_, '_> {
    fn drop(&mut self) {
        let mut state = self.scheduler.state.lock();
        state.active -= 1;
        if thread::panicking() {
            state.panicked = true;
        }
        drop(state);
        self.scheduler.wake.notify_all();
    }
}

impl<'a> Scheduler<'a> {
    pub(crate) fn new(ctx: &'a Arc<BuildContext>) -> Self {
        Self {
            ctx,
            state: Mutex::new(SchedState::default()),
            wake: Condvar::new(),
        }
    }

    /// 加入根条目并放进就绪队列
    pub(crate) fn seed(&self, entry: Entry) -> usize {
        let mut state = self.state.lock();
        let name = entry.name.clone();
        let id = state.intern(&name, || entry);
        if state.entries[id].state == RuleState::Unvisited {
            state.entries[id].state = RuleState::Queued;
            self.push_ready(&mut state, id);
        }
        id
    }

    fn push_ready(&self, state: &mut SchedState, id: usize) {
        state.ready.push_back(id);
        self.wake.notify_one();
    }

    /// 工作线程主循环
    pub(crate) fn worker(&self, worker: usize) {
        debug!(self.ctx.logger(), "worker {} started", worker);
        loop {
            let id = {
                let mut state = self.state.lock();
                loop {
                    if state.stopped() {
                        drop(state);
                        self.wake.notify_all();
                        return;
                    }
                    if let Some(id) = state.ready.pop_front() {
                        state.active += 1;
                        break id;
                    }
                    if state.active == 0 {
                        drop(state);
                        self.wake.notify_all();
                        debug!(self.ctx.logger(), "worker {} idle, exiting", worker);
                        return;
                    }
                    self.wake.wait(&mut state);
                }
            };
            let guard = ActiveGuard { scheduler: self };
            self.process(id);
            drop(guard);
        }
    }

    // ---- 阶段 ----

    /// 推进条目的前置阶段；全部通过后转入执行
    pub(crate) fn advance(&self, state: &mut SchedState, id: usize) {
        loop {
            let entry = &state.entries[id];
            if entry.stage >= entry.stages.len() {
                let entry = &mut state.entries[id];
                entry.phase = Phase::Run;
                entry.state = RuleState::Queued;
                self.push_ready(state, id);
                return;
            }

            if !entry.registered {
                let deps: Vec<Dep> = entry.stages[entry.stage].clone();
                let mut pending = 0;
                for dep in &deps {
                    let target = &mut state.entries[dep.id];
                    if target.state.is_done() {
                        continue;
                    }
                    pending += 1;
                    target.waiters.push(id);
                    if target.state == RuleState::Unvisited {
                        target.state = RuleState::Queued;
                        self.push_ready(state, dep.id);
                    }
                }
                let entry = &mut state.entries[id];
                entry.registered = true;
                entry.pending = pending;
                if pending > 0 {
                    entry.phase = Phase::Stage;
                    entry.state = RuleState::Waiting;
                    return;
                }
            }

            if let Some(failure) = self.check_stage(state, id) {
                self.finish(state, id, RuleState::DoneFailed, Some(failure));
                return;
            }
            let entry = &mut state.entries[id];
            entry.stage += 1;
            entry.registered = false;
        }
    }

    /// 当前阶段的前置规则都完成了，检查它们的结果
    fn check_stage(&self, state: &mut SchedState, id: usize) -> Option<Failure> {
        let entry = &state.entries[id];
        let mut succeeded = false;
        let mut failure = None;
        for dep in &entry.stages[entry.stage] {
            let target = &state.entries[dep.id];
            match target.state {
                RuleState::DoneNotFound if !dep.flags.contains(CommandFlags::OPTIONAL) => {
                    failure = Some(Failure::new(FailureKind::PrereqMissing, target.name.as_str()));
                    break;
                }
                RuleState::DoneFailed if !dep.flags.contains(CommandFlags::NO_FAIL) => {
                    failure = Some(Failure {
                        kind: FailureKind::PrereqFailed,
                        description: String::new(),
                        cause: Some(dep.id),
                    });
                    break;
                }
                RuleState::DoneSucceeded if !dep.flags.contains(CommandFlags::HIDDEN) => {
                    succeeded = true;
                }
                _ => {}
            }
        }
        if succeeded {
            state.entries[id].succeeded = true;
        }
        failure
    }

    // ---- 完成 ----

    pub(crate) fn complete(&self, id: usize, result: RuleState, failure: Option<Failure>) {
        let mut state = self.state.lock();
        self.finish(&mut state, id, result, failure);
    }

    fn finish(&self, state: &mut SchedState, id: usize, result: RuleState, failure: Option<Failure>) {
        let entry = &mut state.entries[id];
        if self.ctx.options().debug.rule_exec {
            debug!(self.ctx.logger(), "{}: completed {:?}", entry.name, result);
        }
        entry.state = result;
        entry.failure = failure;
        let waiters = std::mem::take(&mut entry.waiters);
        for waiter in waiters {
            let target = &mut state.entries[waiter];
            target.pending -= 1;
            if target.pending == 0 {
                target.state = RuleState::Queued;
                self.push_ready(state, waiter);
            }
        }
    }

    /// 执行中遇到求值错误，停止整个调度
    pub(crate) fn abort(&self, id: usize, err: EvalError) {
        let mut state = self.state.lock();
        if state.fatal.is_none() {
            state.fatal = Some(err);
        }
        self.finish(&mut state, id, RuleState::DoneFailed, None);
        drop(state);
        self.wake.notify_all();
    }

    // ---- 限流 ----

    /// 占用规则的分类名额；不够时把条目挂到限流表上并返回 `false`
    pub(crate) fn begin_category(&self, id: usize, rule: &Rule) -> bool {
        let mut state = self.state.lock();
        let throttles = &self.ctx.options().throttles;
        let serial_busy = rule.is_serial() && state.serial_running;
        let full = rule.category.iter().any(|category| {
            let limit = throttles.get(category).copied().unwrap_or(0);
            limit > 0 && state.categories.get(category).copied().unwrap_or(0) >= limit
        });
        if serial_busy || full {
            state.entries[id].state = RuleState::Throttled;
            state.throttled.push(id);
            return false;
        }
        if rule.is_serial() {
            state.serial_running = true;
        }
        for category in &rule.category {
            *state.categories.entry(category.clone()).or_default() += 1;
        }
        state.entries[id].state = RuleState::Running;
        true
    }

    /// 归还名额，被限流的条目全部重新排队
    pub(crate) fn end_category(&self, rule: &Rule) {
        let mut state = self.state.lock();
        if rule.is_serial() {
            state.serial_running = false;
        }
        for category in &rule.category {
            if let Some(count) = state.categories.get_mut(category) {
                *count = count.saturating_sub(1);
            }
        }
        let throttled = std::mem::take(&mut state.throttled);
        for id in throttled {
            state.entries[id].state = RuleState::Queued;
            self.push_ready(&mut state, id);
        }
    }

    // ---- 收尾 ----

    pub(crate) fn lock(&self) -> MutexGuard<'_, SchedState> {
        self.state.lock()
    }

    /// 从 `root` 沿第一个未完成的前置规则走，直到重复
    pub(crate) fn cycle_chain(state: &SchedState, root: usize) -> Vec<String> {
        let mut chain = vec![root];
        let mut current = root;
        while let Some(next) = state.entries[current].blocked_on(&state.entries) {
            let seen = chain.contains(&next);
            chain.push(next);
            if seen {
                break;
            }
            current = next;
        }
        chain
            .into_iter()
            .map(|id| state.entries[id].name.clone())
            .collect()
    }
}
