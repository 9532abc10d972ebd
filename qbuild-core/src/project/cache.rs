//! 项目缓存
//!
//! 同一个项目只打开一次。第一个请求者负责打开，其他线程在条件变量上等待；
//! 等待之前沿"线程 → 等待的项目 → 负责该项目的线程"链检查环路，
//! 发现环路就返回死锁错误，而不是永远等下去。

use super::error::{EvalError, EvalResult};
use super::Project;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[derive(Default)]
struct CacheState {
    projects: HashMap<String, Arc<Project>>,
    failed: HashMap<String, (String, Arc<EvalError>)>,
    /// 正在打开的项目 → 负责的线程
    servicing: HashMap<String, ThreadId>,
    /// 正在等待的线程 → 等待的项目
    waiting: HashMap<ThreadId, String>,
}

impl CacheState {
    /// 从 `owner` 出发沿等待链走，回到 `me` 说明有环
    fn deadlock(&self, key: &str, me: ThreadId, owner: ThreadId) -> Option<String> {
        let mut report = vec![format!("{me:?} requests {key} (serviced by {owner:?})")];
        let mut current = owner;
        loop {
            if current == me {
                return Some(report.join("\n"));
            }
            let next_key = self.waiting.get(&current)?;
            let next_owner = *self.servicing.get(next_key)?;
            report.push(format!(
                "{current:?} waits on {next_key} (serviced by {next_owner:?})"
            ));
            if report.len() > self.waiting.len() + 2 {
                return None;
            }
            current = next_owner;
        }
    }
}

/// 负责打开某个项目的凭证；析构时（包括 `open` panic 时）交还并唤醒等待者
struct Servicing<'a> {
    cache: &'a ProjectCache,
    key: &'a str,
}

impl Drop for Servicing<'_> {
    fn drop(&mut self) {
        self.cache.state.lock().servicing.remove(self.key);
        self.cache.ready.notify_all();
    }
}

/// 按 `solution:node` 缓存打开的项目（包括失败）
#[derive(Default)]
pub struct ProjectCache {
    state: Mutex<CacheState>,
    ready: Condvar,
}

impl ProjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取缓存的项目，没有时在当前线程用 `open` 打开
    pub fn get_or_open<F>(&self, key: &str, open: F) -> EvalResult<Arc<Project>>
    where
        F: FnOnce() -> EvalResult<Project>,
    {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            if let Some(project) = state.projects.get(key) {
                return Ok(Arc::clone(project));
            }
            if let Some((project, source)) = state.failed.get(key) {
                return Err(EvalError::ProjectFailed {
                    project: project.clone(),
                    source: Arc::clone(source),
                });
            }
            let Some(owner) = state.servicing.get(key).copied() else {
                break;
            };
            if let Some(report) = state.deadlock(key, me, owner) {
                return Err(EvalError::Deadlock(report));
            }
            state.waiting.insert(me, key.to_string());
            self.ready.wait(&mut state);
            state.waiting.remove(&me);
        }
        state.servicing.insert(key.to_string(), me);
        drop(state);

        let servicing = Servicing { cache: self, key };
        let result = open();

        let mut state = self.state.lock();
        let result = match result {
            Ok(project) => {
                let project = Arc::new(project);
                state.projects.insert(key.to_string(), Arc::clone(&project));
                Ok(project)
            }
            Err(EvalError::ProjectFailed { project, source }) => {
                state
                    .failed
                    .insert(key.to_string(), (project.clone(), Arc::clone(&source)));
                Err(EvalError::ProjectFailed { project, source })
            }
            Err(err) => Err(err),
        };
        drop(state);
        drop(servicing);
        result
    }

    pub fn get(&self, key: &str) -> Option<Arc<Project>> {
        self.state.lock().projects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().projects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.state.lock().projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 释放全部项目；项目持有上下文，不清理会形成引用环
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.projects.clear();
        state.failed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_panicking_open_releases_key() {
        let cache = ProjectCache::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            cache.get_or_open("sln:/p", || panic!("evaluator bug"))
        }));
        assert!(outcome.is_err());
        assert!(cache.state.lock().servicing.is_empty());

        let err = cache
            .get_or_open("sln:/p", || Err(EvalError::Deadlock("retry".into())))
            .err()
            .unwrap();
        assert!(matches!(err, EvalError::Deadlock(ref msg) if msg == "retry"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_waiter_takes_over_after_owner_panics() {
        let cache = ProjectCache::new();
        let cache = &cache;
        let (started, on_started) = mpsc::channel();

        thread::scope(|scope| {
            let owner = scope.spawn(move || {
                cache.get_or_open("sln:/p", || {
                    started.send(()).unwrap();
                    while cache.state.lock().waiting.is_empty() {
                        thread::sleep(Duration::from_millis(1));
                    }
                    panic!("evaluator bug");
                })
            });

            on_started.recv().unwrap();
            let waiter = scope.spawn(move || {
                cache.get_or_open("sln:/p", || Err(EvalError::Deadlock("second".into())))
            });

            assert!(owner.join().is_err());
            let err = waiter.join().unwrap().err().unwrap();
            assert!(matches!(err, EvalError::Deadlock(ref msg) if msg == "second"));
        });
        assert!(cache.state.lock().servicing.is_empty());
    }
}
