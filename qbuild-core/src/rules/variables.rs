use super::rule::Rule;
use crate::project::InternalVariables;

/// 规则求值期间的 `$$[...]` 变量
///
/// `INPUT`、`OUTPUT`、`OTHER` 取规则声明的列表；`.N` 取第 N 个，
/// 末尾的 `.ABS` 把相对路径接到工作目录后面。下标越界得到空列表。
pub struct RuleVariables<'a> {
    rule: &'a Rule,
    cwd: &'a str,
}

impl<'a> RuleVariables<'a> {
    /// `cwd` 是规则运行的目录，以 `/` 结尾
    pub fn new(rule: &'a Rule, cwd: &'a str) -> Self {
        Self { rule, cwd }
    }
}

/// `file` 为绝对路径时原样返回，否则接在 `cwd` 后面
pub fn absolute_file(cwd: &str, file: &str) -> String {
    if file.starts_with('/') {
        file.to_string()
    } else {
        format!("{cwd}{file}")
    }
}

impl InternalVariables for RuleVariables<'_> {
    fn value(&self, name: &str) -> Option<Vec<String>> {
        let (name, absolute) = match name.strip_suffix(".ABS") {
            Some(stripped) => (stripped, true),
            None => (name, false),
        };
        let (base, index) = match name.split_once('.') {
            Some((base, index)) => (base, Some(index.parse::<usize>().ok()?)),
            None => (name, None),
        };
        let list: &[String] = match base {
            "INPUT" => &self.rule.input_files,
            "OUTPUT" => self.rule.output_files(),
            "OTHER" => &self.rule.other,
            _ => return None,
        };
        let selected: Vec<String> = match index {
            Some(index) => list.get(index).cloned().into_iter().collect(),
            None => list.to_vec(),
        };
        Some(if absolute {
            selected
                .iter()
                .map(|file| absolute_file(self.cwd, file))
                .collect()
        } else {
            selected
        })
    }
}
