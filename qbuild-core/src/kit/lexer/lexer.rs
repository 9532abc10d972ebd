//! 词法分析器

use super::table::{START, TABLE};
use super::token::{Coordinate, Token, TokenKind};
use qbuild_log::{trace, Logger};
use std::sync::Arc;

/// 词法分析器
///
/// 无状态，可在多个线程间共享；`tokenize` 对同一输入总是产出相同结果。
pub struct Lexer {
    logger: Arc<Logger>,
}

impl Lexer {
    pub fn new() -> Self {
        Self {
            logger: Logger::noop(),
        }
    }

    pub fn with_logger(logger: Arc<Logger>) -> Self {
        Self { logger }
    }

    /// 把源码切成原始 token 流
    ///
    /// 相邻的同类字符串 token（字符、数字、空白、未识别字符）合并为一个。
    pub fn tokenize(&self, source: &str) -> Vec<Token> {
        let bytes = source.as_bytes();
        let mut tokens: Vec<Token> = Vec::new();
        let mut pos = 0;
        let mut line = 1;
        let mut line_start = 0;

        while pos < bytes.len() {
            let start = pos;
            let coord = Coordinate::new(line, start - line_start + 1);
            let mut state = START;
            while pos < bytes.len() {
                match TABLE.next(state, bytes[pos]) {
                    Some(next) => {
                        state = next;
                        pos += 1;
                    }
                    None => break,
                }
            }
            let kind = TABLE.token(state);
            if kind == TokenKind::Newline {
                line += 1;
                line_start = pos;
            }

            match tokens.last_mut() {
                Some(last) if kind.is_run() && last.kind == kind && last.end == start => {
                    last.end = pos;
                }
                _ => tokens.push(Token::new(kind, start, pos, coord)),
            }
        }

        trace!(self.logger, "lexed {} bytes into {} tokens", bytes.len(), tokens.len());
        tokens
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

/// 打印 token 流（`-tokenize` 使用），每行 `行:列 种类 "文本"`
pub fn format_tokens(source: &str, tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        out.push_str(&format!(
            "{} {} {:?}\n",
            token.pos,
            token.kind,
            token.text(source)
        ));
    }
    out
}
