use super::flags::RuleFlags;
use crate::object::TraceContext;

/// 一条构建规则
///
/// 除输出文件外的字段都可以直接修改；输出文件参与所在组的索引，
/// 加入组以后只能通过 [`Rules`](super::Rules) 修改。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rule {
    pub name: String,
    pub help: String,
    pub input_files: Vec<String>,
    pub prerequisite_actions: Vec<String>,
    pub other: Vec<String>,
    pub commands: Vec<String>,
    pub tests: Vec<String>,
    pub category: Vec<String>,
    pub flags: RuleFlags,
    /// 声明位置
    pub trace: Vec<TraceContext>,
    pub(super) output_files: Vec<String>,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 加入组之前设置输出文件
    pub fn with_output_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_input_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_prerequisites<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisite_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category.push(category.into());
        self
    }

    pub fn serial(mut self) -> Self {
        self.flags |= RuleFlags::SERIAL;
        self
    }

    pub fn output_files(&self) -> &[String] {
        &self.output_files
    }

    pub fn is_serial(&self) -> bool {
        self.flags.contains(RuleFlags::SERIAL)
    }

    /// `-rules` 输出的一段
    pub fn describe(&self, group: &str) -> String {
        let mut out = format!("{}{}\n", group, self.name);
        if !self.help.is_empty() {
            out.push_str(&format!("    help: {}\n", self.help));
        }
        let fields: [(&str, &[String]); 7] = [
            ("outputFiles", &self.output_files),
            ("inputFiles", &self.input_files),
            ("prerequisiteActions", &self.prerequisite_actions),
            ("commands", &self.commands),
            ("tests", &self.tests),
            ("other", &self.other),
            ("category", &self.category),
        ];
        for (label, values) in fields {
            if !values.is_empty() {
                out.push_str(&format!("    {}: {}\n", label, values.join(" ")));
            }
        }
        if self.is_serial() {
            out.push_str("    serial\n");
        }
        out
    }
}
