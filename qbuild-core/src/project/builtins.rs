//! 内建函数
//!
//! 优先级最低，任何注册的提供者都可以覆盖同名函数。

use super::error::{EvalError, EvalResult};
use super::eval::function_result_to_bool;
use super::functions::FunctionProvider;
use super::Project;
use crate::console::MessageLevel;
use crate::context::TypeHook;
use crate::rules::absolute_file;
use qbuild_vfs::solution::{FileMode, Lookup};
use std::path::Path;

pub const BUILTIN_PRIORITY: i32 = -100;

/// 内建函数提供者
#[derive(Debug, Default, Clone, Copy)]
pub struct Builtins;

fn truth(value: bool) -> Vec<String> {
    vec![if value { "true" } else { "false" }.to_string()]
}

fn arg<'a>(args: &'a [Vec<String>], index: usize) -> &'a [String] {
    args.get(index).map(Vec::as_slice).unwrap_or(&[])
}

/// 参数的第一个值
fn first(args: &[Vec<String>], index: usize) -> String {
    arg(args, index).first().cloned().unwrap_or_default()
}

/// 参数的所有值用空格连接
fn joined(args: &[Vec<String>], index: usize) -> String {
    arg(args, index).join(" ")
}

/// 每个参数各自连接后再连接
fn all_joined(args: &[Vec<String>]) -> String {
    args.iter()
        .map(|a| a.join(" "))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 整体加引号，参数之间用逗号隔开，内部的 `"` 转义
fn shell_quote(args: &[Vec<String>]) -> String {
    let mut text: String = args
        .iter()
        .map(|a| {
            let mut part = a.join(" ");
            part.push(',');
            part
        })
        .collect::<Vec<_>>()
        .join(" ");
    text.pop();
    format!("\"{}\"", text.replace('"', "\\\""))
}

/// 解析 make 生成的 `.d` 依赖文件，返回冒号后面的文件
fn depends_rule(text: &str) -> Vec<String> {
    let Some((_, deps)) = text.split_once(':') else {
        return Vec::new();
    };
    let mut files = Vec::new();
    let mut current = String::new();
    let mut chars = deps.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\n') | Some('\r') | None => {}
                Some(escaped) => current.push(escaped),
            },
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    files.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        files.push(current);
    }
    files.into_iter().map(|f| format!("#(o){f}")).collect()
}

impl Builtins {
    fn exists(project: &Project, name: &str) -> bool {
        let solution = project.solution();
        let fs = solution.fs();
        solution
            .file(
                name,
                Lookup::ALL,
                project.solution_project().project_file(),
            )
            .is_some()
            || solution
                .path_mappings(name)
                .iter()
                .any(|path| fs.exists(Path::new(path)))
            || fs.exists(Path::new(name))
    }

    fn include(project: &Project, name: &str) -> EvalResult<Vec<String>> {
        let file = project
            .solution()
            .find_file(name, FileMode::Existing, project.file().as_ref())
            .ok_or_else(|| EvalError::IncludeMissing(name.to_string()))?;
        if !project.include_file(&file)? {
            return Err(EvalError::IncludeInvalid(name.to_string()));
        }
        Ok(truth(true))
    }

    fn test_file(project: &Project, name: &str, content: &str) -> Vec<String> {
        let solution = project.solution();
        let matches = solution
            .find_file(name, FileMode::Existing, project.file().as_ref())
            .and_then(|file| solution.fs().read_file(Path::new(file.fs_path())).ok())
            .is_some_and(|bytes| bytes == content.as_bytes());
        truth(matches)
    }

    fn write_file(project: &Project, name: &str, content: &str) -> EvalResult<Vec<String>> {
        let solution = project.solution();
        let Some(file) = solution.find_file(name, FileMode::Generated, project.file().as_ref())
        else {
            return Ok(truth(false));
        };
        let path = Path::new(file.fs_path());
        if let Some(parent) = path.parent() {
            solution.fs().create_dir_all(parent)?;
        }
        solution.fs().write_file(path, content.as_bytes())?;
        Ok(truth(true))
    }

    fn include_depends_rule(project: &Project, name: &str) -> Vec<String> {
        let cwd = format!("{}/", project.build_dir());
        let path = absolute_file(&cwd, name);
        match project.solution().fs().read_file(Path::new(&path)) {
            Ok(bytes) => depends_rule(&String::from_utf8_lossy(&bytes)),
            // 依赖文件在第一次构建前还不存在
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => {
                project.warning(&format!("Cannot read dependency file: {err}"));
                Vec::new()
            }
        }
    }

    fn path(project: &Project, args: &[Vec<String>]) -> EvalResult<Vec<String>> {
        if args.len() != 2 {
            return Err(EvalError::PathArguments);
        }
        let mode = match first(args, 1).as_str() {
            "generated" => FileMode::Generated,
            "project" => FileMode::Project,
            "existing" => FileMode::Existing,
            _ => {
                project.warning("Invalid type to path() function");
                return Ok(Vec::new());
            }
        };
        Ok(project
            .solution()
            .find_file(&joined(args, 0), mode, project.file().as_ref())
            .map(|file| vec![file.fs_path().to_string()])
            .unwrap_or_default())
    }
}

impl FunctionProvider for Builtins {
    fn name(&self) -> &str {
        "builtin"
    }

    fn priority(&self) -> i32 {
        BUILTIN_PRIORITY
    }

    fn call(
        &self,
        project: &Project,
        name: &str,
        args: &[Vec<String>],
    ) -> EvalResult<Option<Vec<String>>> {
        let result = match name {
            "project" => vec![project.name().to_string()],
            "equals" => {
                let matches = args.len() >= 2 && project.value(&first(args, 0)) == arg(args, 1);
                truth(matches)
            }
            "isEmpty" => truth(project.value(&first(args, 0)).is_empty()),
            "contains" => {
                let values = project.value(&first(args, 0));
                truth(arg(args, 1).iter().all(|item| values.contains(item)))
            }
            "not" => truth(!function_result_to_bool(&args.concat())),
            "exists" => truth(
                !args.is_empty()
                    && args
                        .iter()
                        .flatten()
                        .all(|name| Self::exists(project, name)),
            ),
            "testFile" => Self::test_file(project, &joined(args, 0), &joined(args, 1)),
            "writeFile" => Self::write_file(project, &joined(args, 0), &joined(args, 1))?,
            "info" => {
                project.message(MessageLevel::Information, &all_joined(args));
                Vec::new()
            }
            "message" => {
                project.message(MessageLevel::Message, &all_joined(args));
                Vec::new()
            }
            "warning" => {
                project.message(MessageLevel::Warning, &all_joined(args));
                Vec::new()
            }
            "error" => return Err(EvalError::User(all_joined(args))),
            "include" => Self::include(project, &joined(args, 0))?,
            "include_depends_rule" => Self::include_depends_rule(project, &joined(args, 0)),
            "load" => {
                let mut loaded = true;
                for extension in args.iter().flatten() {
                    loaded &= project.load_extension(extension)?;
                }
                truth(loaded)
            }
            "disable_project" => {
                project.set_disabled(&all_joined(args))?;
                Vec::new()
            }
            "upper" => arg(args, 0).iter().map(|v| v.to_uppercase()).collect(),
            "lower" => arg(args, 0).iter().map(|v| v.to_lowercase()).collect(),
            "eval" => truth(project.run(&all_joined(args), "eval() function call")?),
            "if" => {
                let text = all_joined(args);
                if text.trim().is_empty() {
                    return Err(EvalError::EmptyIf);
                }
                match project.do_if(&text)? {
                    Some(result) => truth(result),
                    None => return Err(EvalError::InvalidIf(text)),
                }
            }
            "for" => {
                if args.len() != 2 {
                    return Err(EvalError::InvalidFor);
                }
                truth(true)
            }
            "rule" => vec![project.declare_rule(&first(args, 0))?],
            "rule_for_file" => {
                if args.len() != 1 {
                    return Err(EvalError::RuleForFileArguments);
                }
                project
                    .rules()
                    .rule_for_file(&joined(args, 0))
                    .map(|rule| vec![rule.name.clone()])
                    .unwrap_or_default()
            }
            "shellQuote" => vec![shell_quote(args)],
            "join" => args.iter().map(|a| a.join(" ")).collect(),
            "value" => project.object_value(&joined(args, 0))?.unwrap_or_default(),
            "path" => Self::path(project, args)?,
            "watch" => {
                let variable = first(args, 0);
                for function in arg(args, 1) {
                    project.watch(&variable, function)?;
                }
                Vec::new()
            }
            "on_new_type" | "on_del_type" => {
                let hook = if name == "on_new_type" {
                    TypeHook::New
                } else {
                    TypeHook::Del
                };
                let type_name = first(args, 0);
                for function in args.iter().skip(1).flatten() {
                    project.context().add_type_hook(hook, &type_name, function);
                }
                Vec::new()
            }
            "add_extensions_path" => {
                for path in args.iter().flatten() {
                    project.context().add_extensions_path(path);
                }
                Vec::new()
            }
            _ => return Ok(None),
        };
        Ok(Some(result))
    }

    /// 在扩展目录中找 `<name>.pri` 并包含
    fn load(&self, project: &Project, name: &str) -> EvalResult<bool> {
        match project
            .context()
            .find_extension(name, project.solution())
        {
            Some(file) => project.include_file(&file),
            None => Ok(false),
        }
    }
}
