//! finalize 阶段
//!
//! `QBUILD.FINALIZE.<module>` 声明 finalize 模块：
//!
//! ```text
//! QBUILD.FINALIZE.moc.CALL = moc_finalize
//! QBUILD.FINALIZE.moc.RUN_BEFORE_ME = uic
//! QBUILD.FINALIZE.link.RUN_AFTER_ME = install
//! ```
//!
//! 模块按依赖排序后依次调用 `CALL` 中的函数；`runlast` 模块总是最后运行。
//! 之后 `TYPE = RULE` 的对象被转换成规则，对象树变为只读。

use super::error::{EvalError, EvalResult};
use super::eval::function_result_to_bool;
use super::Project;
use crate::object::{NodeId, ObjectTree};
use crate::rules::{Rule, RuleFlags};
use qbuild_log::info;
use std::collections::BTreeMap;

const FINALIZE_ROOT: &str = "QBUILD.FINALIZE";
const RUN_LAST: &str = "runlast";

/// 一个 finalize 模块
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeModule {
    pub name: String,
    /// 必须在本模块之后运行的模块
    pub run_after_me: Vec<String>,
    /// 必须在本模块之前运行的模块
    pub run_before_me: Vec<String>,
    /// 依次调用的函数
    pub call: Vec<String>,
}

#[derive(Default)]
struct Info {
    after_me: Vec<String>,
    done: bool,
}

/// 深度优先排出模块顺序；同一层按名字排序
pub fn finalize_order(modules: &[FinalizeModule]) -> EvalResult<Vec<String>> {
    let mut infos: BTreeMap<String, Info> = BTreeMap::new();
    for module in modules {
        let mut after_me = module.run_after_me.clone();
        if module.name != RUN_LAST {
            after_me.push(RUN_LAST.to_string());
        }
        infos.entry(module.name.clone()).or_default().after_me.extend(after_me);
    }
    for module in modules {
        for before in &module.run_before_me {
            if let Some(info) = infos.get_mut(before) {
                info.after_me.push(module.name.clone());
            }
        }
    }

    let names: Vec<String> = infos.keys().cloned().collect();
    let mut order = Vec::with_capacity(names.len());
    for name in names {
        let mut stack = vec![name.clone()];
        visit(&mut infos, &name, &mut order, &mut stack).map_err(|(first, second)| {
            EvalError::FinalizeCycle {
                module: name.clone(),
                first,
                second,
            }
        })?;
    }
    Ok(order)
}

/// 先运行所有要求排在 `name` 之前的模块
fn visit(
    infos: &mut BTreeMap<String, Info>,
    name: &str,
    order: &mut Vec<String>,
    stack: &mut Vec<String>,
) -> Result<(), (String, String)> {
    if infos.get(name).map_or(true, |info| info.done) {
        return Ok(());
    }
    let before: Vec<String> = infos
        .iter()
        .filter(|(_, info)| !info.done && info.after_me.iter().any(|a| a == name))
        .map(|(other, _)| other.clone())
        .collect();
    for other in before {
        if infos.get(&other).is_some_and(|info| info.done) {
            continue;
        }
        if stack.contains(&other) {
            return Err((name.to_string(), other));
        }
        stack.push(other.clone());
        let result = visit(infos, &other, order, stack);
        stack.pop();
        result?;
    }
    if let Some(info) = infos.get_mut(name) {
        info.done = true;
    }
    order.push(name.to_string());
    Ok(())
}

fn values(tree: &ObjectTree, id: NodeId, path: &str) -> Vec<String> {
    tree.lookup(id, path)
        .map(|node| tree.value(node).to_vec())
        .unwrap_or_default()
}

/// `TYPE = RULE` 对象转换成规则；名字取 `name` 属性或节点名
fn rule_from_object(tree: &ObjectTree, id: NodeId) -> Rule {
    let name = values(tree, id, "name").join(" ");
    let name = if name.is_empty() {
        tree.name(id).to_string()
    } else {
        name
    };
    let mut rule = Rule::new(name).with_output_files(values(tree, id, "outputFiles"));
    rule.help = values(tree, id, "help").join(" ");
    rule.input_files = values(tree, id, "inputFiles");
    rule.prerequisite_actions = values(tree, id, "prerequisiteActions");
    rule.commands = values(tree, id, "commands");
    rule.tests = values(tree, id, "tests");
    rule.other = values(tree, id, "other");
    rule.category = values(tree, id, "category");
    if function_result_to_bool(&values(tree, id, "serial")) {
        rule.flags |= RuleFlags::SERIAL;
    }
    if let Some(type_node) = tree.lookup(id, "TYPE") {
        rule.trace = tree
            .trace(type_node)
            .iter()
            .map(|entry| entry.context.clone())
            .collect();
    }
    rule
}

impl Project {
    fn finalize_modules(&self) -> Vec<FinalizeModule> {
        let tree = self.tree.read();
        let Some(root) = tree.lookup(tree.root(), FINALIZE_ROOT) else {
            return Vec::new();
        };
        tree.properties(root)
            .into_iter()
            .filter_map(|name| {
                let id = tree.lookup(root, &name)?;
                Some(FinalizeModule {
                    run_after_me: values(&tree, id, "RUN_AFTER_ME"),
                    run_before_me: values(&tree, id, "RUN_BEFORE_ME"),
                    call: values(&tree, id, "CALL"),
                    name,
                })
            })
            .collect()
    }

    /// 运行 finalize 模块（期间的 reset 会重新加载项目），
    /// 然后登记规则对象并把对象树设为只读
    pub(crate) fn finalize(&self) -> EvalResult<()> {
        let timer = self.ctx.timings().start("Project::Finalize");
        loop {
            let modules = self.finalize_modules();
            let order = finalize_order(&modules)?;
            if self.ctx.options().debug.finalize {
                info!(
                    self.ctx.logger(),
                    "Finalize order for {}: {}",
                    self.name,
                    order.join(" ")
                );
            }
            'modules: for name in &order {
                let Some(module) = modules.iter().find(|m| &m.name == name) else {
                    continue;
                };
                for function in &module.call {
                    if self.call_function(function, &[])?.is_none() {
                        return Err(EvalError::Finalizer(function.clone()));
                    }
                    if self.is_resetting() {
                        break 'modules;
                    }
                }
            }
            if !self.is_resetting() {
                break;
            }
            self.load()?;
        }

        let declared: Vec<Rule> = {
            let tree = self.tree.read();
            let root = tree.root();
            tree.find(root, "TYPE", "RULE")
                .into_iter()
                .filter(|id| *id != root)
                .map(|id| rule_from_object(&tree, id))
                .collect()
        };
        for rule in declared {
            self.add_rule(rule);
        }

        {
            let mut tree = self.tree.write();
            let root = tree.root();
            tree.set_read_only(root);
        }
        self.state.lock().finalized = true;
        drop(timer);

        if self.has_warnings() {
            return Err(EvalError::Warnings);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, after: &[&str], before: &[&str]) -> FinalizeModule {
        FinalizeModule {
            name: name.to_string(),
            run_after_me: after.iter().map(|s| s.to_string()).collect(),
            run_before_me: before.iter().map(|s| s.to_string()).collect(),
            call: Vec::new(),
        }
    }

    #[test]
    fn test_name_order_without_dependencies() {
        let order = finalize_order(&[module("b", &[], &[]), module("a", &[], &[])]).unwrap();
        assert_eq!(order, ["a", "b"]);
    }

    #[test]
    fn test_dependencies() {
        // a 必须在 b 之后；c 必须在 a 之前
        let modules = [
            module("b", &["a"], &[]),
            module("a", &[], &["c"]),
            module("c", &[], &[]),
        ];
        let order = finalize_order(&modules).unwrap();
        let pos = |n: &str| order.iter().position(|o| o == n).unwrap();
        assert!(pos("b") < pos("a"));
        assert!(pos("c") < pos("a"));
    }

    #[test]
    fn test_runlast_is_last() {
        let modules = [
            module("runlast", &[], &[]),
            module("zeta", &[], &[]),
            module("alpha", &[], &[]),
        ];
        assert_eq!(finalize_order(&modules).unwrap(), ["alpha", "zeta", "runlast"]);
    }

    #[test]
    fn test_cycle() {
        let modules = [module("a", &["b"], &[]), module("b", &["a"], &[])];
        let err = finalize_order(&modules).unwrap_err();
        match err {
            EvalError::FinalizeCycle { first, second, .. } => {
                let mut pair = [first, second];
                pair.sort();
                assert_eq!(pair, ["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
