//! 最近日志的环形缓冲区
//!
//! 构建以致命错误结束时，CLI 从这里取出最后若干条记录打印出来。

use crate::logger::LogSink;
use crate::record::Record;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// 某一时刻缓冲区的内容
#[derive(Clone, Debug, Default)]
pub struct RingSnapshot {
    pub records: Vec<Record>,
    /// 在这些记录之前被挤出去的条数
    pub dropped: usize,
}

impl RingSnapshot {
    /// 每条记录一行，丢弃过记录时第一行说明丢了多少
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.records.len() + 1);
        if self.dropped > 0 {
            lines.push(format!("... {} earlier records dropped", self.dropped));
        }
        lines.extend(self.records.iter().map(Record::to_string));
        lines.join("\n")
    }
}

struct Slots {
    records: VecDeque<Record>,
    dropped: usize,
}

/// 容量固定，满了以后挤掉最旧的记录
pub struct LogRingBuffer {
    slots: Mutex<Slots>,
    capacity: usize,
}

impl LogRingBuffer {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(LogRingBuffer {
            slots: Mutex::new(Slots {
                records: VecDeque::with_capacity(capacity),
                dropped: 0,
            }),
            capacity,
        })
    }

    fn push(&self, record: Record) {
        let mut slots = self.slots.lock();
        if self.capacity == 0 {
            slots.dropped += 1;
            return;
        }
        if slots.records.len() == self.capacity {
            slots.records.pop_front();
            slots.dropped += 1;
        }
        slots.records.push_back(record);
    }

    /// 记录和丢弃计数在同一把锁下取出，工作线程还在写也不会错位
    pub fn snapshot(&self) -> RingSnapshot {
        let slots = self.slots.lock();
        RingSnapshot {
            records: slots.records.iter().cloned().collect(),
            dropped: slots.dropped,
        }
    }

    /// 按时间顺序
    pub fn dump_records(&self) -> Vec<Record> {
        self.snapshot().records
    }

    pub fn dump(&self) -> String {
        self.snapshot().render()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_count(&self) -> usize {
        self.slots.lock().dropped
    }
}

impl LogSink for Arc<LogRingBuffer> {
    fn write(&self, record: &Record) {
        self.push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Level, Logger};

    fn record(message: &str) -> Record {
        Record::new(Level::Info, "test", message)
    }

    #[test]
    fn test_push_and_dump() {
        let ring = LogRingBuffer::new(4);
        ring.write(&record("a"));
        ring.write(&record("b"));

        let records = ring.dump_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "a");
        assert!(ring.dump().ends_with(": b"));
        assert_eq!(ring.dump().lines().count(), 2);
    }

    #[test]
    fn test_oldest_records_are_evicted() {
        let ring = LogRingBuffer::new(3);
        for i in 0..5 {
            ring.write(&record(&format!("msg {i}")));
        }

        let snapshot = ring.snapshot();
        assert_eq!(snapshot.dropped, 2);
        let messages: Vec<&str> = snapshot.records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["msg 2", "msg 3", "msg 4"]);

        let rendered = snapshot.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "... 2 earlier records dropped");
        assert!(lines[3].ends_with("msg 4"));
    }

    #[test]
    fn test_zero_capacity() {
        let ring = LogRingBuffer::new(0);
        ring.write(&record("lost"));
        assert!(ring.is_empty());
        assert_eq!(ring.dropped_count(), 1);
        assert_eq!(ring.dump(), "... 1 earlier records dropped");
    }

    #[test]
    fn test_empty_snapshot_renders_nothing() {
        let ring = LogRingBuffer::new(8);
        assert_eq!(ring.snapshot().render(), "");
    }

    #[test]
    fn test_concurrent_writers() {
        let ring = LogRingBuffer::new(150);
        let logger = Logger::new(Level::Debug).with_sink(ring.clone());

        std::thread::scope(|scope| {
            for t in 0..4 {
                let logger = &logger;
                scope.spawn(move || {
                    for i in 0..50 {
                        logger.log(Level::Info, "worker", format!("{t}:{i}"));
                    }
                });
            }
        });

        let snapshot = ring.snapshot();
        assert_eq!(snapshot.records.len(), 150);
        assert_eq!(snapshot.dropped, 50);
    }
}
