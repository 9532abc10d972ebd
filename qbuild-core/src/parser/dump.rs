//! 语法树输出
//!
//! [`to_source`] 把语法树写回可再次解析的源码；
//! [`to_tree`] 打印缩进的树形结构（`-parse-tree`）。

use super::block::{Assignment, Block, Combinator, Condition, Expression, MultiBlock, Scope, Value};

const INDENT: &str = "    ";

/// 写回源码
pub fn to_source(block: &MultiBlock) -> String {
    let mut out = String::new();
    for child in &block.blocks {
        write_block(&mut out, child, 0);
    }
    out
}

/// 单个表达式写回源码
pub fn expression_source(expr: &Expression) -> String {
    expr.groups
        .iter()
        .map(|group| group.iter().map(value_source).collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

fn pad(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_block(out: &mut String, block: &Block, depth: usize) {
    match block {
        Block::Multi(multi) => match &multi.using {
            Some(name) => {
                pad(out, depth);
                out.push_str(name);
                out.push_str(" [\n");
                write_children(out, &multi.blocks, depth + 1);
                pad(out, depth);
                out.push_str("]\n");
            }
            None => {
                pad(out, depth);
                out.push_str("{\n");
                write_children(out, &multi.blocks, depth + 1);
                pad(out, depth);
                out.push_str("}\n");
            }
        },
        Block::Scope(scope) => write_scope(out, scope, depth),
        Block::Assignment(assignment) => {
            pad(out, depth);
            out.push_str(&assignment_source(assignment));
            out.push('\n');
        }
        Block::Function(value) => {
            pad(out, depth);
            out.push_str(&value_source(value));
            out.push('\n');
        }
        Block::Script { text, .. } => {
            pad(out, depth);
            out.push_str("<script>");
            out.push_str(text);
            if !text.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("</script>\n");
        }
    }
}

fn write_children(out: &mut String, blocks: &[Block], depth: usize) {
    for block in blocks {
        write_block(out, block, depth);
    }
}

/// 作用域主体：单个无前缀的子块直接展开，避免多一层花括号
fn write_body(out: &mut String, blocks: &[Block], depth: usize) {
    match blocks {
        [Block::Multi(multi)] if multi.using.is_none() => write_children(out, &multi.blocks, depth),
        _ => write_children(out, blocks, depth),
    }
}

fn write_scope(out: &mut String, scope: &Scope, depth: usize) {
    pad(out, depth);
    let separator = match scope.combinator {
        Combinator::And => ":",
        Combinator::Or => "|",
    };
    let conditions: Vec<String> = scope.conditions.iter().map(condition_source).collect();
    out.push_str(&conditions.join(separator));
    if scope.blocks.is_empty() {
        out.push('\n');
    } else {
        out.push_str(" {\n");
        write_body(out, &scope.blocks, depth + 1);
        pad(out, depth);
        out.push_str("}\n");
    }
    if let Some(else_block) = &scope.else_block {
        pad(out, depth);
        out.push_str("else {\n");
        write_body(out, std::slice::from_ref(else_block.as_ref()), depth + 1);
        pad(out, depth);
        out.push_str("}\n");
    }
}

fn condition_source(condition: &Condition) -> String {
    let mut text = String::new();
    if condition.negate {
        text.push('!');
    }
    for value in &condition.values {
        text.push_str(&value_source(value));
    }
    text
}

fn assignment_source(assignment: &Assignment) -> String {
    let expr = expression_source(&assignment.expr);
    if assignment.name.is_empty() {
        return expr;
    }
    if expr.is_empty() {
        format!("{} {}", assignment.name, assignment.op.as_str())
    } else {
        format!("{} {} {}", assignment.name, assignment.op.as_str(), expr)
    }
}

fn needs_quotes(text: &str) -> bool {
    matches!(text, "else" | "script" | "endscript")
        || text.chars().any(|c| {
            c.is_whitespace()
                || matches!(
                    c,
                    '"' | '#' | '$' | ':' | '|' | '{' | '}' | '[' | ']' | '=' | '!' | '\\' | '<'
                )
        })
}

fn arguments_source(args: &[Expression]) -> String {
    args.iter()
        .map(expression_source)
        .collect::<Vec<_>>()
        .join(", ")
}

fn value_source(value: &Value) -> String {
    match value {
        Value::Characters { text, .. } => {
            if needs_quotes(text) {
                format!("\"{}\"", text.replace('"', "\"\""))
            } else {
                text.clone()
            }
        }
        Value::Variable { name, .. } => format!("$${{{name}}}"),
        Value::EngineVariable { name, .. } => format!("$$[{name}]"),
        Value::Environment { name, .. } => format!("$$({name})"),
        Value::Function { name, args, .. } => format!("$${name}({})", arguments_source(args)),
        Value::TestFunction { name, args, .. } => format!("{name}({})", arguments_source(args)),
    }
}

/// 打印树形结构
pub fn to_tree(block: &MultiBlock) -> String {
    let mut out = String::new();
    tree_multi(&mut out, block, 0);
    out
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(text);
    out.push('\n');
}

fn tree_multi(out: &mut String, multi: &MultiBlock, depth: usize) {
    match &multi.using {
        Some(name) => line(out, depth, &format!("MultiBlock [{}] using {}", multi.pos, name)),
        None => line(out, depth, &format!("MultiBlock [{}]", multi.pos)),
    }
    for block in &multi.blocks {
        tree_block(out, block, depth + 1);
    }
}

fn tree_block(out: &mut String, block: &Block, depth: usize) {
    match block {
        Block::Multi(multi) => tree_multi(out, multi, depth),
        Block::Scope(scope) => {
            line(out, depth, &format!("Scope [{}] {:?}", scope.pos, scope.combinator));
            for condition in &scope.conditions {
                let prefix = if condition.negate { "Condition !" } else { "Condition" };
                line(out, depth + 1, prefix);
                for value in &condition.values {
                    tree_value(out, value, depth + 2);
                }
            }
            for child in &scope.blocks {
                tree_block(out, child, depth + 1);
            }
            if let Some(else_block) = &scope.else_block {
                line(out, depth + 1, "Else");
                tree_block(out, else_block, depth + 2);
            }
        }
        Block::Assignment(assignment) => {
            line(
                out,
                depth,
                &format!(
                    "Assignment [{}] {} {}",
                    assignment.pos,
                    assignment.name,
                    assignment.op.as_str()
                ),
            );
            tree_expression(out, &assignment.expr, depth + 1);
        }
        Block::Function(value) => {
            line(out, depth, "Function");
            tree_value(out, value, depth + 1);
        }
        Block::Script { text, pos } => {
            line(out, depth, &format!("Script [{}] {} bytes", pos, text.len()));
        }
    }
}

fn tree_expression(out: &mut String, expr: &Expression, depth: usize) {
    for group in &expr.groups {
        line(out, depth, "Group");
        for value in group {
            tree_value(out, value, depth + 1);
        }
    }
}

fn tree_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Characters { text, .. } => line(out, depth, &format!("Characters {text:?}")),
        Value::Variable { name, .. } => line(out, depth, &format!("Variable {name}")),
        Value::EngineVariable { name, .. } => line(out, depth, &format!("EngineVariable {name}")),
        Value::Environment { name, .. } => line(out, depth, &format!("Environment {name}")),
        Value::Function { name, args, .. } | Value::TestFunction { name, args, .. } => {
            let kind = if value.is_test_function() {
                "TestFunction"
            } else {
                "Function"
            };
            line(out, depth, &format!("{kind} {name}"));
            for arg in args {
                line(out, depth + 1, "Argument");
                tree_expression(out, arg, depth + 2);
            }
        }
    }
}
