//! 工作线程对单条规则做的事
//!
//! - Prime：打开项目、找到规则、展开前置动作和输入文件、划分阶段
//! - Stage：前置规则完成后检查结果（见调度器）
//! - Run：判断是否过期，占用分类名额，依次执行命令

use super::scheduler::Scheduler;
use super::state::{Dep, Entry, Failure, FailureKind, Phase, RuleState};
use crate::console::display_name;
use crate::project::{
    function_result_to_bool, project_name, EvalError, EvalResult, InternalVariables, Project,
};
use crate::rules::{absolute_file, parse_flags, CommandFlags, Rule, RuleVariables};
use qbuild_log::debug;
use qbuild_vfs::solution::SolutionProject;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// 规则处理提前结束的原因
enum Halt {
    Failed(Failure),
    Fatal(EvalError),
    /// 被限流，等名额释放后重新排队
    Parked,
}

impl From<EvalError> for Halt {
    fn from(err: EvalError) -> Self {
        Halt::Fatal(err)
    }
}

type Step<T> = Result<T, Halt>;

fn failed<T>(kind: FailureKind, description: impl Into<String>) -> Step<T> {
    Err(Halt::Failed(Failure::new(kind, description)))
}

fn split(item: &str) -> (String, CommandFlags) {
    let (flags, text) = parse_flags(item);
    (text.to_string(), flags)
}

/// 规则运行的目录，以 `/` 结尾
fn rule_cwd(project: &Project) -> String {
    format!("{}/", project.build_dir())
}

impl Scheduler<'_> {
    pub(crate) fn process(&self, id: usize) {
        let (phase, name) = {
            let state = self.lock();
            let entry = &state.entries[id];
            (entry.phase, entry.name.clone())
        };
        let span = self.ctx.logger().enter_span("rule", name);
        let result = match phase {
            Phase::Prime => self.prime(id),
            Phase::Stage => {
                let mut state = self.lock();
                self.advance(&mut state, id);
                Ok(())
            }
            Phase::Run => self.run(id),
        };
        match result {
            Ok(()) | Err(Halt::Parked) => {}
            Err(Halt::Failed(failure)) => {
                self.complete(id, RuleState::DoneFailed, Some(failure));
            }
            Err(Halt::Fatal(err)) => self.abort(id, err),
        }
        drop(span);
    }

    // ---- Prime ----

    fn prime(&self, id: usize) -> Step<()> {
        let (rule_name, target, project, mut force) = {
            let state = self.lock();
            let entry = &state.entries[id];
            (
                entry.rule_name.clone(),
                entry.target.clone(),
                entry.project.clone(),
                entry.force,
            )
        };
        let project = match (project, target) {
            (Some(project), _) => project,
            (None, Some(sp)) => self.ctx.open_project(sp)?,
            (None, None) => {
                self.complete(id, RuleState::DoneNotFound, None);
                return Ok(());
            }
        };
        let Some(rule) = project.rules().rule_by_name(&rule_name) else {
            self.complete(id, RuleState::DoneNotFound, None);
            return Ok(());
        };
        self.enter(&project)?;
        if self.ctx.options().debug.rule_exec {
            debug!(self.ctx.logger(), "{}: priming", self.lock().entries[id].name);
        }

        let cwd = rule_cwd(&project);
        let mut deps = self.prerequisites(&project, &rule, &cwd)?;
        let inputs = self.input_files(&project, &rule, &cwd, &mut deps, &mut force)?;

        let mut state = self.lock();
        let serial = rule.is_serial();
        let mut stages: Vec<Vec<Dep>> = Vec::new();
        for (entry, flags) in deps {
            let name = entry.name.clone();
            let dep = Dep {
                id: state.intern(&name, || entry),
                flags,
            };
            let new_stage = match stages.last() {
                None => true,
                Some(last) => !last.is_empty() && (serial || flags.contains(CommandFlags::ORDERED)),
            };
            if new_stage {
                stages.push(Vec::new());
            }
            if let Some(stage) = stages.last_mut() {
                stage.push(dep);
            }
        }

        let entry = &mut state.entries[id];
        entry.project = Some(project);
        entry.rule = Some(rule);
        entry.stages = stages;
        entry.stage = 0;
        entry.registered = false;
        entry.inputs = inputs;
        entry.force = force;
        self.advance(&mut state, id);
        Ok(())
    }

    /// 第一次在项目中执行规则时宣告并创建构建目录
    fn enter(&self, project: &Project) -> EvalResult<()> {
        if !self.lock().entered.insert(project.name().to_string()) {
            return Ok(());
        }
        if !self.ctx.options().silent && !project.is_file_mode() {
            self.ctx.console().print(&format!(
                "QBuild: Running rules for project {}",
                display_name(project.name())
            ));
        }
        if !self.ctx.options().dry_run && !project.build_dir().is_empty() {
            project
                .solution()
                .fs()
                .create_dir_all(Path::new(project.build_dir()))?;
        }
        Ok(())
    }

    /// 展开 `#(f)`、`#(c)` 条目，展开结果继续排在末尾处理
    fn expand(
        &self,
        project: &Project,
        rule: &Rule,
        cwd: &str,
        items: &[String],
        kinds: (FailureKind, FailureKind),
    ) -> Step<Vec<(String, CommandFlags)>> {
        let variables = RuleVariables::new(rule, cwd);
        let extra: [&dyn InternalVariables; 1] = [&variables];
        let mut queue: VecDeque<(String, CommandFlags)> =
            items.iter().map(|item| split(item)).collect();
        let mut out = Vec::new();
        while let Some((text, flags)) = queue.pop_front() {
            if text.is_empty() {
                continue;
            }
            let expanded = if flags.contains(CommandFlags::EVALUATABLE) {
                match project.run_expression(&text, &extra)? {
                    Some(values) => values,
                    None => return failed(kinds.0, text),
                }
            } else if flags.contains(CommandFlags::CALL_FUNCTION) {
                match project.call_function(&text, &[vec![rule.name.clone()]])? {
                    Some(values) => values,
                    None => return failed(kinds.1, text),
                }
            } else {
                out.push((text, flags));
                continue;
            };
            queue.extend(expanded.iter().map(|item| split(item)));
        }
        Ok(out)
    }

    fn prerequisites(
        &self,
        project: &Arc<Project>,
        rule: &Rule,
        cwd: &str,
    ) -> Step<Vec<(Entry, CommandFlags)>> {
        let timer = self.ctx.timings().start("RuleEngine::Prereqs");
        let actions = self.expand(
            project,
            rule,
            cwd,
            &rule.prerequisite_actions,
            (FailureKind::PrereqEval, FailureKind::PrereqFunc),
        )?;
        let mut seen = HashSet::new();
        let mut deps = Vec::new();
        for (action, flags) in actions {
            if !seen.insert(action.clone()) {
                continue;
            }
            let mask = CommandFlags::NO_FAIL
                | CommandFlags::HIDDEN
                | CommandFlags::OPTIONAL
                | CommandFlags::ORDERED;
            deps.push((self.prerequisite(project, &action), flags & mask));
        }
        drop(timer);
        Ok(deps)
    }

    /// `rule` 是本项目的规则，`proj/rule` 是其他项目的规则（相对路径相对本项目）
    fn prerequisite(&self, project: &Arc<Project>, action: &str) -> Entry {
        let Some((node, rule)) = action.rsplit_once('/') else {
            let mut entry = Entry::new(format!("{}{}", project.name(), action), action.to_string());
            entry.project = Some(Arc::clone(project));
            return entry;
        };
        let rule = if rule.is_empty() { "default" } else { rule };
        let node = if node.is_empty() { "/" } else { node };
        let registry = self.ctx.registry();
        match SolutionProject::from_node_relative(registry, node, project.solution_project()) {
            Some(sp) => {
                let name = format!("{}{}", project_name(registry, &sp), rule);
                let mut entry = Entry::new(name, rule.to_string());
                entry.target = Some(sp);
                entry
            }
            None => Entry::new(format!("{node}/{rule}"), rule.to_string()),
        }
    }

    /// 输入文件；由其他规则产生的文件把那条规则加入前置规则
    fn input_files(
        &self,
        project: &Arc<Project>,
        rule: &Rule,
        cwd: &str,
        deps: &mut Vec<(Entry, CommandFlags)>,
        force: &mut bool,
    ) -> Step<Vec<String>> {
        let timer = self.ctx.timings().start("RuleEngine::InputFiles");
        let files = self.expand(
            project,
            rule,
            cwd,
            &rule.input_files,
            (FailureKind::InputEval, FailureKind::InputFunc),
        )?;
        let fs = project.solution().fs();
        let mut inputs = Vec::new();
        for (file, flags) in files {
            let path = absolute_file(cwd, &file);
            let producer = {
                let rules = project.rules();
                rules
                    .rule_for_file(&file)
                    .or_else(|| rules.rule_for_file(&path))
            };
            match producer {
                Some(producer) => {
                    if producer.name != rule.name {
                        let mut entry = Entry::new(
                            format!("{}{}", project.name(), producer.name),
                            producer.name.clone(),
                        );
                        entry.project = Some(Arc::clone(project));
                        deps.push((entry, flags & CommandFlags::NO_FAIL));
                        inputs.push(path);
                    }
                }
                None if fs.exists(Path::new(&path)) => inputs.push(path),
                None if flags.contains(CommandFlags::OPTIONAL) => {
                    if flags.contains(CommandFlags::TEST) {
                        *force = true;
                    }
                }
                None => return failed(FailureKind::InputMissing, file),
            }
        }
        drop(timer);
        Ok(inputs)
    }

    // ---- Run ----

    fn run(&self, id: usize) -> Step<()> {
        let (project, rule, inputs, force, succeeded) = {
            let state = self.lock();
            let entry = &state.entries[id];
            (
                entry.project.clone(),
                entry.rule.clone(),
                entry.inputs.clone(),
                entry.force,
                entry.succeeded,
            )
        };
        let (Some(project), Some(rule)) = (project, rule) else {
            self.complete(id, RuleState::DoneNotFound, None);
            return Ok(());
        };
        let cwd = rule_cwd(&project);

        let mut run = succeeded
            || force
            || (rule.output_files().is_empty() && !rule.commands.is_empty())
            || self.out_of_date(&project, &rule, &cwd, &inputs);

        let variables = RuleVariables::new(&rule, &cwd);
        let extra: [&dyn InternalVariables; 1] = [&variables];
        for test in &rule.tests {
            if run {
                break;
            }
            match project.run_expression(test, &extra)? {
                Some(values) => run = function_result_to_bool(&values),
                None => return failed(FailureKind::TestEval, test.as_str()),
            }
        }

        if !run {
            self.complete(id, RuleState::DoneNothingToDo, None);
            return Ok(());
        }
        if !self.begin_category(id, &rule) {
            return Err(Halt::Parked);
        }
        let result = self.commands(&project, &rule, &cwd);
        self.end_category(&rule);

        let fs = project.solution().fs();
        for output in rule.output_files() {
            fs.invalidate(Some(Path::new(&absolute_file(&cwd, output))));
        }

        let state = match result? {
            true => RuleState::DoneSucceeded,
            false if succeeded => RuleState::DoneSucceeded,
            false => RuleState::DoneNothingToDo,
        };
        self.complete(id, state, None);
        Ok(())
    }

    /// 缺少输出文件，或者有输入文件比最早的输出文件新
    fn out_of_date(&self, project: &Project, rule: &Rule, cwd: &str, inputs: &[String]) -> bool {
        let fs = project.solution().fs();
        let mut earliest: Option<SystemTime> = None;
        for output in rule.output_files() {
            let path = absolute_file(cwd, output);
            match fs.modified(Path::new(&path)) {
                Some(time) => earliest = Some(earliest.map_or(time, |e| e.min(time))),
                None => {
                    if self.ctx.options().debug.rule_exec {
                        debug!(self.ctx.logger(), "missing output {}", path);
                    }
                    return true;
                }
            }
        }
        inputs.iter().any(|input| {
            match (fs.modified(Path::new(input)), earliest) {
                (Some(time), Some(earliest)) => time > earliest,
                (Some(_), None) => true,
                (None, _) => false,
            }
        })
    }

    /// 依次执行命令；返回是否有非隐藏命令执行过
    fn commands(&self, project: &Project, rule: &Rule, cwd: &str) -> Step<bool> {
        let timer = self.ctx.timings().start("RuleEngine::Commands");
        let options = self.ctx.options();
        let console = self.ctx.console();
        let variables = RuleVariables::new(rule, cwd);
        let extra: [&dyn InternalVariables; 1] = [&variables];
        let mut ran = 0;

        for raw in &rule.commands {
            let (flags, text) = parse_flags(raw);
            let command = if flags.contains(CommandFlags::VERBATIM) {
                text.to_string()
            } else {
                match project.run_expression(text, &extra)? {
                    Some(values) => values.join(" "),
                    None => return failed(FailureKind::CommandEval, text),
                }
            };

            let echo = options.verbose
                || !flags.intersects(CommandFlags::NO_ECHO | CommandFlags::ECHO_IF_NEEDED);
            if echo {
                console.print(&command);
            }

            let mut output = String::new();
            let success = if command.is_empty() || options.dry_run {
                true
            } else if flags.contains(CommandFlags::CALL_FUNCTION) {
                project.call_function(&command, &[])?.is_some()
            } else {
                match self
                    .ctx
                    .shell()
                    .run(&command, cwd, flags.contains(CommandFlags::TTY))
                {
                    Ok(result) if result.success() => {
                        if !result.output.is_empty() {
                            if !echo && flags.contains(CommandFlags::ECHO_IF_NEEDED) {
                                console.print(&command);
                            }
                            console.print(result.output.trim_end_matches('\n'));
                        }
                        true
                    }
                    Ok(result) => {
                        output = result.output;
                        false
                    }
                    Err(err) => {
                        output = err.to_string();
                        false
                    }
                }
            };

            if !success && flags.contains(CommandFlags::TEST) {
                break;
            }
            if !success && !flags.contains(CommandFlags::NO_FAIL) {
                let mut description = if flags.contains(CommandFlags::VERBATIM) {
                    command
                } else {
                    format!("{text}\n{command}")
                };
                let output = output.trim_end();
                if !output.is_empty() {
                    description.push('\n');
                    description.push_str(output);
                }
                return failed(FailureKind::CommandExec, description);
            }
            if !flags.contains(CommandFlags::HIDDEN) {
                ran += 1;
            }
        }
        drop(timer);
        Ok(ran > 0)
    }
}
