/// `$$[NAME]` 变量的来源
///
/// 求值时先问项目自身，再按顺序问调用方传入的来源（例如规则变量）。
/// 不认识的名字返回 `None`，交给下一个来源。
pub trait InternalVariables {
    fn value(&self, name: &str) -> Option<Vec<String>>;
}

/// 项目自身提供的变量
pub(crate) struct ProjectVariables<'a> {
    pub node: &'a str,
    pub build_dir: &'a str,
}

impl InternalVariables for ProjectVariables<'_> {
    fn value(&self, name: &str) -> Option<Vec<String>> {
        match name {
            "QBUILD_VERSION" => Some(vec![env!("CARGO_PKG_VERSION").to_string()]),
            "QBUILD_BUILD_DIR" => Some(vec![self.build_dir.to_string()]),
            "QBUILD_NODE" => Some(vec![self.node.to_string()]),
            _ => None,
        }
    }
}

/// 按顺序查找，第一个认识的来源生效；都不认识时为空
pub(crate) fn resolve(chain: &[&dyn InternalVariables], name: &str) -> Vec<String> {
    chain
        .iter()
        .find_map(|source| source.value(name))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl InternalVariables for Fixed {
        fn value(&self, name: &str) -> Option<Vec<String>> {
            (name == "QBUILD_NODE" || name == "EXTRA").then(|| vec!["fixed".to_string()])
        }
    }

    #[test]
    fn test_chain_order() {
        let project = ProjectVariables {
            node: "/hello/",
            build_dir: "/build/hello",
        };
        let chain: [&dyn InternalVariables; 2] = [&project, &Fixed];
        assert_eq!(resolve(&chain, "QBUILD_NODE"), ["/hello/"]);
        assert_eq!(resolve(&chain, "EXTRA"), ["fixed"]);
        assert_eq!(resolve(&chain, "QBUILD_BUILD_DIR"), ["/build/hello"]);
        assert!(resolve(&chain, "UNKNOWN").is_empty());
    }
}
