//! 函数提供者
//!
//! 求值器调用的所有函数（内建函数、用户函数、类型钩子、finalize 函数）都经过
//! [`FunctionProvider`]。提供者按优先级从高到低依次尝试，第一个返回
//! `Some` 的结果生效。

use super::error::EvalResult;
use super::Project;
use crate::object::TraceContext;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// 外部函数能力
pub trait FunctionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// 越大越先尝试
    fn priority(&self) -> i32 {
        0
    }

    /// 调用函数；不认识这个函数时返回 `Ok(None)`
    fn call(
        &self,
        project: &Project,
        name: &str,
        args: &[Vec<String>],
    ) -> EvalResult<Option<Vec<String>>>;

    /// 加载扩展；处理了返回 `true`
    #[allow(unused_variables)]
    fn load(&self, project: &Project, name: &str) -> EvalResult<bool> {
        Ok(false)
    }

    /// 运行脚本块；处理了返回 `true`
    #[allow(unused_variables)]
    fn run_script(&self, project: &Project, text: &str, trace: &TraceContext) -> EvalResult<bool> {
        Ok(false)
    }
}

/// 按优先级排好的提供者列表
#[derive(Default)]
pub struct FunctionRegistry {
    providers: RwLock<Vec<Arc<dyn FunctionProvider>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册提供者；同优先级的按注册顺序
    pub fn register(&self, provider: Arc<dyn FunctionProvider>) {
        let mut providers = self.providers.write();
        let at = providers
            .iter()
            .position(|p| p.priority() < provider.priority())
            .unwrap_or(providers.len());
        providers.insert(at, provider);
    }

    /// 当前列表的快照，调用期间不持有锁
    pub fn providers(&self) -> Vec<Arc<dyn FunctionProvider>> {
        self.providers.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers
            .read()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }
}

pub type NativeFunction =
    Arc<dyn Fn(&Project, &[Vec<String>]) -> EvalResult<Vec<String>> + Send + Sync>;

pub type ScriptHandler = Arc<dyn Fn(&Project, &str, &TraceContext) -> EvalResult<()> + Send + Sync>;

/// 用闭包注册函数的提供者，供嵌入方和测试使用
pub struct NativeFunctions {
    name: String,
    priority: i32,
    functions: RwLock<HashMap<String, NativeFunction>>,
    script: Option<ScriptHandler>,
}

impl NativeFunctions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            functions: RwLock::new(HashMap::new()),
            script: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_function<F>(self, name: &str, function: F) -> Self
    where
        F: Fn(&Project, &[Vec<String>]) -> EvalResult<Vec<String>> + Send + Sync + 'static,
    {
        self.define(name, function);
        self
    }

    /// 接管脚本块
    pub fn with_script_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Project, &str, &TraceContext) -> EvalResult<()> + Send + Sync + 'static,
    {
        self.script = Some(Arc::new(handler));
        self
    }

    pub fn define<F>(&self, name: &str, function: F)
    where
        F: Fn(&Project, &[Vec<String>]) -> EvalResult<Vec<String>> + Send + Sync + 'static,
    {
        self.functions
            .write()
            .insert(name.to_string(), Arc::new(function));
    }
}

impl FunctionProvider for NativeFunctions {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn call(
        &self,
        project: &Project,
        name: &str,
        args: &[Vec<String>],
    ) -> EvalResult<Option<Vec<String>>> {
        // 先取出闭包再调用：函数里可能再定义函数
        let function = self.functions.read().get(name).cloned();
        match function {
            Some(function) => function(project, args).map(Some),
            None => Ok(None),
        }
    }

    fn run_script(&self, project: &Project, text: &str, trace: &TraceContext) -> EvalResult<bool> {
        match &self.script {
            Some(handler) => handler(project, text, trace).map(|()| true),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, i32);

    impl FunctionProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn priority(&self) -> i32 {
            self.1
        }

        fn call(&self, _: &Project, _: &str, _: &[Vec<String>]) -> EvalResult<Option<Vec<String>>> {
            Ok(None)
        }
    }

    #[test]
    fn test_priority_order() {
        let registry = FunctionRegistry::new();
        registry.register(Arc::new(Named("builtin", -100)));
        registry.register(Arc::new(Named("user", 0)));
        registry.register(Arc::new(Named("late", 0)));
        registry.register(Arc::new(Named("override", 10)));
        assert_eq!(registry.names(), ["override", "user", "late", "builtin"]);
    }
}
