//! 阶段计时
//!
//! [`Timings`] 由构建上下文持有并显式传递，不使用线程局部状态。
//! 每个 [`TimingGuard`] 在析构时把经过的时间累加到对应标签上，
//! 多个线程可以同时计时同一个标签。

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default)]
struct Entry {
    total: Duration,
    count: u64,
}

/// 计时汇总中的一行
#[derive(Clone, Debug, PartialEq)]
pub struct TimingRow {
    /// 阶段标签
    pub label: &'static str,
    /// 累计耗时
    pub total: Duration,
    /// 进入次数
    pub count: u64,
}

impl fmt::Display for TimingRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<40} {:>10.3} ms {:>8}",
            self.label,
            self.total.as_secs_f64() * 1000.0,
            self.count
        )
    }
}

/// 并发安全的阶段耗时汇总
pub struct Timings {
    enabled: AtomicBool,
    entries: Mutex<HashMap<&'static str, Entry>>,
}

impl Timings {
    /// 创建计时器；`enabled` 为 false 时所有计时都是空操作
    pub fn new(enabled: bool) -> Arc<Self> {
        Arc::new(Timings {
            enabled: AtomicBool::new(enabled),
            entries: Mutex::new(HashMap::new()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// 开始为 `label` 计时，守卫析构时记录
    pub fn start(self: &Arc<Self>, label: &'static str) -> TimingGuard {
        TimingGuard {
            timings: self.is_enabled().then(|| Arc::clone(self)),
            label,
            started: Instant::now(),
        }
    }

    /// 直接累加一段耗时
    pub fn record(&self, label: &'static str, elapsed: Duration) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.lock();
        let entry = entries.entry(label).or_default();
        entry.total += elapsed;
        entry.count += 1;
    }

    /// 按累计耗时降序返回汇总
    pub fn report(&self) -> Vec<TimingRow> {
        let entries = self.entries.lock();
        let mut rows: Vec<TimingRow> = entries
            .iter()
            .map(|(label, entry)| TimingRow {
                label,
                total: entry.total,
                count: entry.count,
            })
            .collect();
        rows.sort_by(|a, b| b.total.cmp(&a.total).then(a.label.cmp(b.label)));
        rows
    }

    /// 单个标签的汇总
    pub fn get(&self, label: &str) -> Option<TimingRow> {
        self.report().into_iter().find(|row| row.label == label)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// 计时守卫
pub struct TimingGuard {
    timings: Option<Arc<Timings>>,
    label: &'static str,
    started: Instant,
}

impl TimingGuard {
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if let Some(timings) = self.timings.take() {
            timings.record(self.label, self.started.elapsed());
        }
    }
}
