//! 语法树解释

use super::error::{EvalError, EvalResult};
use super::variables::{self, InternalVariables, ProjectVariables};
use super::Project;
use crate::parser::{
    parse, parse_single_expression, AssignOp, Assignment, Block, Combinator, Expression,
    MultiBlock, Scope, Value,
};
use qbuild_log::debug;

/// 函数返回值当作条件：空、单个 `false`、单个空串为假
pub fn function_result_to_bool(values: &[String]) -> bool {
    match values {
        [] => false,
        [only] => !(only == "false" || only.is_empty()),
        _ => true,
    }
}

impl Project {
    pub(crate) fn run_multi(&self, block: &MultiBlock) -> EvalResult<()> {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.using.clone();
            if let Some(using) = &block.using {
                state.using = if previous.is_empty() {
                    using.clone()
                } else {
                    format!("{previous}.{using}")
                };
            }
            previous
        };
        let result = self.run_blocks(&block.blocks);
        self.state.lock().using = previous;
        result
    }

    fn run_blocks(&self, blocks: &[Block]) -> EvalResult<()> {
        for block in blocks {
            if self.is_resetting() {
                break;
            }
            self.run_block(block)?;
        }
        Ok(())
    }

    fn run_block(&self, block: &Block) -> EvalResult<()> {
        if self.ctx.options().debug.run_trace {
            let trace = self.trace_context(block.pos().line);
            debug!(self.ctx.logger(), "run {}", trace);
        }
        match block {
            Block::Multi(multi) => self.run_multi(multi),
            Block::Scope(scope) => self.run_scope(scope),
            Block::Assignment(assignment) => self.run_assignment(assignment),
            Block::Function(value) => self.run_function(value, &[]).map(drop),
            Block::Script { text, pos } => {
                let trace = self.trace_context(pos.line);
                for provider in self.ctx.functions().providers() {
                    if provider.run_script(self, text, &trace)? {
                        return Ok(());
                    }
                }
                Err(EvalError::Script(trace.to_string()))
            }
        }
    }

    fn run_scope(&self, scope: &Scope) -> EvalResult<()> {
        let (result, for_loop) = self.test_scope(scope, true)?;
        if self.is_resetting() {
            return Ok(());
        }
        if let Some(args) = for_loop {
            return self.run_for(args, &scope.blocks);
        }
        if result {
            self.run_blocks(&scope.blocks)
        } else if let Some(else_block) = &scope.else_block {
            self.run_block(else_block)
        } else {
            Ok(())
        }
    }

    /// `for(var, LIST)`：依次把 `var` 设为 `LIST` 的每个值，结束后恢复
    fn run_for(&self, args: &[Expression], body: &[Block]) -> EvalResult<()> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.expression_value(arg, &[])?);
        }
        let first = |index: usize| -> Option<String> {
            values.get(index).and_then(|v| v.first()).cloned()
        };
        let (Some(iterator), Some(list)) = (first(0), first(1)) else {
            return Err(EvalError::InvalidFor);
        };
        let backup = self.value(&iterator);
        for item in self.value(&list) {
            if self.is_resetting() {
                break;
            }
            self.assign(&iterator, AssignOp::Assign, vec![item], None)?;
            self.run_blocks(body)?;
        }
        self.assign(&iterator, AssignOp::Assign, backup, None)
    }

    /// 计算作用域条件；`allow_for` 时返回 `for()` 的参数
    pub(crate) fn test_scope<'a>(
        &self,
        scope: &'a Scope,
        allow_for: bool,
    ) -> EvalResult<(bool, Option<&'a [Expression]>)> {
        let mut result = scope.combinator == Combinator::And;
        let mut for_loop = None;
        for condition in &scope.conditions {
            if self.is_resetting() {
                break;
            }
            if for_loop.is_some() {
                return Err(EvalError::ForWithoutBlock);
            }
            let mut value = match condition.test_function() {
                Some((name, args)) => {
                    if allow_for && name == "for" {
                        for_loop = Some(args);
                    }
                    let rv = self.run_function(&condition.values[0], &[])?;
                    function_result_to_bool(&rv)
                }
                None => {
                    let text = self.group_value(&condition.values, &[])?.join(" ");
                    self.is_active_config(&text)
                }
            };
            if condition.negate {
                value = !value;
            }
            match scope.combinator {
                Combinator::And if !value => {
                    result = false;
                    break;
                }
                Combinator::Or if value => {
                    result = true;
                    break;
                }
                _ => {}
            }
        }
        Ok((result, for_loop))
    }

    fn run_assignment(&self, assignment: &Assignment) -> EvalResult<()> {
        let values = self.expression_value(&assignment.expr, &[])?;
        if self.is_resetting() || assignment.name.is_empty() {
            return Ok(());
        }
        let name = {
            let state = self.state.lock();
            if state.using.is_empty() {
                assignment.name.clone()
            } else {
                format!("{}.{}", state.using, assignment.name)
            }
        };
        let trace = self.trace_context(assignment.pos.line);
        self.assign(&name, assignment.op, values, Some(&trace))
    }

    /// 表达式的值；每组要么展开成列表，要么拼成一个字符串，空串被丢弃
    pub fn expression_value(
        &self,
        expr: &Expression,
        extra: &[&dyn InternalVariables],
    ) -> EvalResult<Vec<String>> {
        let mut out = Vec::new();
        for group in &expr.groups {
            if self.is_resetting() {
                break;
            }
            out.extend(
                self.group_value(group, extra)?
                    .into_iter()
                    .filter(|v| !v.is_empty()),
            );
        }
        Ok(out)
    }

    fn group_value(
        &self,
        values: &[Value],
        extra: &[&dyn InternalVariables],
    ) -> EvalResult<Vec<String>> {
        let mut text = String::new();
        for value in values {
            if self.is_resetting() {
                break;
            }
            let resolved = self.value_of(value, extra)?;
            if values.len() == 1 && resolved.len() > 1 {
                return Ok(resolved);
            }
            text.push_str(&resolved.join(" "));
        }
        Ok(vec![text])
    }

    fn value_of(&self, value: &Value, extra: &[&dyn InternalVariables]) -> EvalResult<Vec<String>> {
        Ok(match value {
            Value::Characters { text, .. } => vec![text.clone()],
            Value::Environment { name, .. } => vec![std::env::var(name).unwrap_or_default()],
            Value::Variable { name, .. } => self.value(name),
            Value::EngineVariable { name, .. } => {
                let own = ProjectVariables {
                    node: &self.name,
                    build_dir: &self.build_dir,
                };
                let mut chain: Vec<&dyn InternalVariables> = Vec::with_capacity(extra.len() + 1);
                chain.push(&own);
                chain.extend_from_slice(extra);
                variables::resolve(&chain, name)
            }
            Value::Function { .. } => self.run_function(value, extra)?,
            Value::TestFunction { .. } => {
                self.run_function(value, extra)?;
                Vec::new()
            }
        })
    }

    /// 求出参数后调用函数；没有提供者认识它是致命错误
    fn run_function(&self, value: &Value, extra: &[&dyn InternalVariables]) -> EvalResult<Vec<String>> {
        let (name, args, pos) = match value {
            Value::Function { name, args, pos } | Value::TestFunction { name, args, pos } => {
                (name, args, pos)
            }
            _ => return Ok(Vec::new()),
        };
        let mut arguments = Vec::with_capacity(args.len());
        for arg in args {
            arguments.push(self.expression_value(arg, extra)?);
            if self.is_resetting() {
                return Ok(Vec::new());
            }
        }
        match self.call_function(name, &arguments)? {
            Some(result) => Ok(result),
            None => {
                let trace = self.trace_context(pos.line);
                Err(EvalError::UnknownFunction {
                    name: name.clone(),
                    file: trace.file,
                    line: trace.line,
                })
            }
        }
    }

    /// 执行一段源码；解析失败返回 `false`
    pub fn run(&self, text: &str, origin: &str) -> EvalResult<bool> {
        match parse(text) {
            Ok(block) => {
                if self.ctx.options().debug.run_trace {
                    debug!(self.ctx.logger(), "run {}", origin);
                }
                self.run_multi(&block).map(|()| true)
            }
            Err(err) if err.is_empty_input() => Ok(true),
            Err(err) => {
                debug!(self.ctx.logger(), "{}: {}", origin, err);
                Ok(false)
            }
        }
    }

    /// 把 `text` 当作作用域条件求值；解析失败返回 `None`
    pub fn do_if(&self, text: &str) -> EvalResult<Option<bool>> {
        let Ok(block) = parse(&format!("{text}:if=true\n")) else {
            return Ok(None);
        };
        match block.blocks.first() {
            Some(Block::Scope(scope)) => Ok(Some(self.test_scope(scope, false)?.0)),
            _ => Ok(None),
        }
    }

    /// 展开规则命令、测试等单个表达式；解析失败返回 `None`
    pub fn run_expression(
        &self,
        text: &str,
        extra: &[&dyn InternalVariables],
    ) -> EvalResult<Option<Vec<String>>> {
        if text.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }
        match parse_single_expression(text) {
            Ok(assignment) => self.expression_value(&assignment.expr, extra).map(Some),
            Err(err) => {
                debug!(self.ctx.logger(), "cannot expand {:?}: {}", text, err);
                Ok(None)
            }
        }
    }
}
