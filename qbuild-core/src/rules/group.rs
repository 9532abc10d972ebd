use super::rule::Rule;
use super::RuleError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// 一个项目的规则组
///
/// 维护"输出文件 → 规则名"索引；规则以 `Arc` 共享给引擎，
/// 组内修改采用写时复制，不影响引擎已经拿到的快照。
#[derive(Debug, Clone, Default)]
pub struct Rules {
    name: String,
    counter: usize,
    rules: BTreeMap<String, Arc<Rule>>,
    outputs: HashMap<String, String>,
}

impl Rules {
    /// `name` 是规则全名的前缀，通常是项目名（以 `/` 结尾）
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 匿名规则的下一个名字：`Anonymous1`、`Anonymous2`……
    pub fn next_anonymous(&mut self) -> String {
        loop {
            self.counter += 1;
            let name = format!("Anonymous{}", self.counter);
            if !self.rules.contains_key(&name) {
                return name;
            }
        }
    }

    /// 规则全名：组名加规则名
    pub fn full_name(&self, rule: &Rule) -> String {
        format!("{}{}", self.name, rule.name)
    }

    /// 按名字排序的全部规则
    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.values()
    }

    /// `rule` 的输出中已经属于其他规则的 `(文件, 规则名)`
    pub fn conflicts(&self, rule: &Rule) -> Vec<(String, String)> {
        rule.output_files
            .iter()
            .filter_map(|file| {
                let owner = self.outputs.get(file)?;
                (owner != &rule.name).then(|| (file.clone(), owner.clone()))
            })
            .collect()
    }

    /// 加入规则；同名规则被替换，输出索引以后加入的为准
    pub fn add_rule(&mut self, rule: Rule) -> Arc<Rule> {
        if let Some(old) = self.rules.remove(&rule.name) {
            self.evict(&old);
        }
        for file in &rule.output_files {
            self.outputs.insert(file.clone(), rule.name.clone());
        }
        let rule = Arc::new(rule);
        self.rules.insert(rule.name.clone(), Arc::clone(&rule));
        rule
    }

    pub fn rule_by_name(&self, name: &str) -> Option<Arc<Rule>> {
        self.rules.get(name).cloned()
    }

    /// 生成 `file` 的规则
    pub fn rule_for_file(&self, file: &str) -> Option<Arc<Rule>> {
        self.outputs
            .get(file)
            .and_then(|name| self.rules.get(name))
            .cloned()
    }

    pub fn remove_rule(&mut self, name: &str) -> Result<Arc<Rule>, RuleError> {
        let rule = self
            .rules
            .remove(name)
            .ok_or_else(|| RuleError::UnknownRule(name.to_string()))?;
        self.evict(&rule);
        Ok(rule)
    }

    /// 整体替换输出文件：先清掉旧的索引项
    pub fn set_output_files(&mut self, name: &str, files: Vec<String>) -> Result<(), RuleError> {
        let mut rule = self
            .rules
            .remove(name)
            .ok_or_else(|| RuleError::UnknownRule(name.to_string()))?;
        self.evict(&rule);
        Arc::make_mut(&mut rule).output_files = files;
        for file in &rule.output_files {
            self.outputs.insert(file.clone(), rule.name.clone());
        }
        self.rules.insert(name.to_string(), rule);
        Ok(())
    }

    /// 追加一个输出文件；已被任何规则占用时拒绝
    pub fn append_output_file(&mut self, name: &str, file: &str) -> Result<(), RuleError> {
        if let Some(owner) = self.outputs.get(file) {
            return Err(RuleError::DuplicateOutput {
                file: file.to_string(),
                rule: name.to_string(),
                owner: owner.clone(),
            });
        }
        let rule = self
            .rules
            .get_mut(name)
            .ok_or_else(|| RuleError::UnknownRule(name.to_string()))?;
        Arc::make_mut(rule).output_files.push(file.to_string());
        self.outputs.insert(file.to_string(), name.to_string());
        Ok(())
    }

    /// 修改规则的其他字段
    pub fn update<F>(&mut self, name: &str, update: F) -> Result<(), RuleError>
    where
        F: FnOnce(&mut Rule),
    {
        let rule = self
            .rules
            .get_mut(name)
            .ok_or_else(|| RuleError::UnknownRule(name.to_string()))?;
        let rule = Arc::make_mut(rule);
        let outputs = std::mem::take(&mut rule.output_files);
        update(rule);
        rule.name = name.to_string();
        rule.output_files = outputs;
        Ok(())
    }

    fn evict(&mut self, rule: &Rule) {
        for file in &rule.output_files {
            if self.outputs.get(file) == Some(&rule.name) {
                self.outputs.remove(file);
            }
        }
    }

    /// `-rules` / `-actions` 输出；`filter` 非空时只输出名字包含它的规则
    pub fn dump(&self, filter: Option<&str>) -> String {
        self.rules
            .values()
            .filter(|rule| filter.map_or(true, |f| rule.name.contains(f)))
            .map(|rule| rule.describe(&self.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> Rules {
        let mut rules = Rules::new("/hello/");
        rules.add_rule(Rule::new("R1").with_output_files(["out.o"]));
        rules
    }

    #[test]
    fn test_lookup() {
        let rules = group();
        assert_eq!(rules.rule_for_file("out.o").unwrap().name, "R1");
        assert_eq!(rules.rule_by_name("R1").unwrap().output_files(), ["out.o"]);
        assert!(rules.rule_for_file("missing").is_none());
        assert_eq!(rules.full_name(&rules.rule_by_name("R1").unwrap()), "/hello/R1");
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let mut rules = group();
        rules.add_rule(Rule::new("R2"));
        let err = rules.append_output_file("R2", "out.o").unwrap_err();
        assert_eq!(
            err,
            RuleError::DuplicateOutput {
                file: "out.o".into(),
                rule: "R2".into(),
                owner: "R1".into(),
            }
        );
        // 同一规则重复声明也被拒绝
        assert!(rules.append_output_file("R1", "out.o").is_err());
        assert_eq!(rules.rule_for_file("out.o").unwrap().name, "R1");
    }

    #[test]
    fn test_set_output_files_evicts() {
        let mut rules = group();
        rules
            .set_output_files("R1", vec!["new.o".into()])
            .unwrap();
        assert!(rules.rule_for_file("out.o").is_none());
        assert_eq!(rules.rule_for_file("new.o").unwrap().name, "R1");
    }

    #[test]
    fn test_add_rule_conflicts_and_replace() {
        let mut rules = group();
        let other = Rule::new("R2").with_output_files(["out.o"]);
        assert_eq!(rules.conflicts(&other), vec![("out.o".into(), "R1".into())]);
        rules.add_rule(other);
        assert_eq!(rules.rule_for_file("out.o").unwrap().name, "R2");

        rules.add_rule(Rule::new("R2"));
        assert!(rules.rule_for_file("out.o").is_none());
    }

    #[test]
    fn test_remove_and_update() {
        let mut rules = group();
        rules
            .update("R1", |rule| rule.commands.push("touch out.o".into()))
            .unwrap();
        assert_eq!(rules.rule_by_name("R1").unwrap().commands, ["touch out.o"]);
        rules.remove_rule("R1").unwrap();
        assert!(rules.rule_for_file("out.o").is_none());
        assert_eq!(
            rules.remove_rule("R1").unwrap_err(),
            RuleError::UnknownRule("R1".into())
        );
    }

    #[test]
    fn test_anonymous_names() {
        let mut rules = Rules::new("/");
        rules.add_rule(Rule::new("Anonymous1"));
        assert_eq!(rules.next_anonymous(), "Anonymous2");
        assert_eq!(rules.next_anonymous(), "Anonymous3");
    }
}
