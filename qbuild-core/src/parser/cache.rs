//! 解析缓存
//!
//! 每个文件只解析一次，失败同样缓存。多个线程同时打开项目时共享同一份缓存。

use super::block::MultiBlock;
use super::error::{ParseResult, ParserError, ParserErrorKind};
use super::parser::Parser;
use parking_lot::Mutex;
use qbuild_log::{debug, Logger};
use std::collections::HashMap;
use std::sync::Arc;

type Entry = Result<Arc<MultiBlock>, ParserError>;

pub struct ParseCache {
    entries: Mutex<HashMap<String, Entry>>,
    logger: Arc<Logger>,
}

impl ParseCache {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            logger,
        }
    }

    /// 取 `key` 的解析结果，没有缓存时用 `load` 读出源码再解析
    ///
    /// `load` 返回 `None` 表示文件不可读，按空输入处理。
    pub fn get_or_parse<F>(&self, key: &str, load: F) -> ParseResult<Arc<MultiBlock>>
    where
        F: FnOnce() -> Option<String>,
    {
        if let Some(entry) = self.entries.lock().get(key) {
            return entry.clone();
        }

        let entry = match load() {
            Some(source) => Parser::with_logger(&source, self.logger.clone())
                .parse()
                .map(Arc::new),
            None => Err(ParserError::at_eof(ParserErrorKind::Empty)),
        };
        debug!(
            self.logger,
            "parsed {} ({})",
            key,
            if entry.is_ok() { "ok" } else { "failed" }
        );

        self.entries
            .lock()
            .entry(key.to_string())
            .or_insert(entry)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
