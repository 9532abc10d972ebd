//! 预处理器
//!
//! 两遍处理原始 token 流：
//! 1. 去掉 `#` 注释（字符串内的 `#` 保留）；整行注释连同换行一起去掉
//! 2. 识别字符串边界、续行、转义引号，折叠空白和换行，合并名字
//!
//! 脚本块（`<script>` / `script` 到行首的结束标记）原样透传，
//! 解析器从源码中截取脚本文本。

use crate::kit::lexer::{Lexer, Token, TokenKind};
use qbuild_log::{trace, Logger};
use std::sync::Arc;

pub struct Preprocessor {
    logger: Arc<Logger>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            logger: Logger::noop(),
        }
    }

    pub fn with_logger(logger: Arc<Logger>) -> Self {
        Self { logger }
    }

    /// 词法分析并预处理
    pub fn tokenize(&self, source: &str) -> Vec<Token> {
        let raw = Lexer::with_logger(self.logger.clone()).tokenize(source);
        self.process(source, &raw)
    }

    /// 预处理原始 token 流
    pub fn process(&self, source: &str, raw: &[Token]) -> Vec<Token> {
        let stripped = strip_comments(source, raw);
        let out = normalize(source, &stripped);
        trace!(
            self.logger,
            "preprocessed {} raw tokens into {} tokens",
            raw.len(),
            out.len()
        );
        out
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

fn is_word_script_marker(source: &str, token: &Token) -> bool {
    token
        .text(source)
        .as_bytes()
        .first()
        .is_some_and(|b| b.is_ascii_alphabetic())
}

/// `tokens[i]` 开始的脚本块在哪里结束（含结束标记）
///
/// 结束标记必须位于行首（前面只能有空白）。找不到时返回 `None`。
fn script_end(tokens: &[Token], start: usize) -> Option<usize> {
    let mut line_start = false;
    for (idx, token) in tokens.iter().enumerate().skip(start + 1) {
        match token.kind {
            TokenKind::Newline => line_start = true,
            TokenKind::Whitespace | TokenKind::SingleSpace => {}
            TokenKind::ScriptEnd if line_start => return Some(idx),
            _ => line_start = false,
        }
    }
    None
}

/// 单词形式的 `script` 只有后面紧跟换行时才开始脚本块
fn opens_script(source: &str, tokens: &[Token], idx: usize) -> bool {
    if !is_word_script_marker(source, &tokens[idx]) {
        return true;
    }
    tokens[idx + 1..]
        .iter()
        .find(|t| t.kind != TokenKind::Whitespace)
        .map_or(true, |t| t.kind == TokenKind::Newline)
}

fn demote_word(source: &str, token: Token) -> Token {
    if is_word_script_marker(source, &token) {
        Token {
            kind: TokenKind::Characters,
            ..token
        }
    } else {
        token
    }
}

fn strip_comments(source: &str, raw: &[Token]) -> Vec<Token> {
    let mut out = Vec::with_capacity(raw.len());
    let mut quoted = false;
    let mut blank_line = true;
    let mut idx = 0;

    while idx < raw.len() {
        let token = raw[idx];
        match token.kind {
            TokenKind::Backslash if raw.get(idx + 1).is_some_and(|t| t.kind == TokenKind::Quote) => {
                out.push(token);
                out.push(raw[idx + 1]);
                blank_line = false;
                idx += 2;
                continue;
            }
            TokenKind::Quote => quoted = !quoted,
            TokenKind::Newline => {
                quoted = false;
                blank_line = true;
                out.push(token);
                idx += 1;
                continue;
            }
            TokenKind::Whitespace => {
                out.push(token);
                idx += 1;
                continue;
            }
            TokenKind::Hash if !quoted => {
                let mut end = idx;
                while end < raw.len() && raw[end].kind != TokenKind::Newline {
                    end += 1;
                }
                if blank_line && end < raw.len() {
                    end += 1;
                }
                idx = end;
                continue;
            }
            TokenKind::ScriptStart if !quoted => {
                if opens_script(source, raw, idx) {
                    let end = script_end(raw, idx).map_or(raw.len(), |end| end + 1);
                    out.extend_from_slice(&raw[idx..end]);
                    idx = end;
                    blank_line = false;
                    continue;
                }
                out.push(demote_word(source, token));
                blank_line = false;
                idx += 1;
                continue;
            }
            TokenKind::ScriptEnd => {
                out.push(demote_word(source, token));
                blank_line = false;
                idx += 1;
                continue;
            }
            _ => {}
        }
        blank_line = false;
        out.push(token);
        idx += 1;
    }
    out
}

fn push_word(out: &mut Vec<Token>, token: Token) {
    let kind = if token.kind == TokenKind::Digits {
        TokenKind::Digits
    } else {
        TokenKind::Name
    };
    if let Some(last) = out.last_mut() {
        if matches!(last.kind, TokenKind::Name | TokenKind::Digits) && last.end == token.start {
            last.end = token.end;
            if kind == TokenKind::Name {
                last.kind = TokenKind::Name;
            }
            return;
        }
    }
    out.push(Token { kind, ..token });
}

fn push_newline(out: &mut Vec<Token>, token: Token) {
    if out.last().is_some_and(|t| t.kind == TokenKind::SingleSpace) {
        out.pop();
    }
    if out.last().map_or(true, |t| t.kind == TokenKind::Newline) {
        return;
    }
    out.push(Token {
        kind: TokenKind::Newline,
        ..token
    });
}

fn normalize(source: &str, tokens: &[Token]) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut in_string = false;
    let mut idx = 0;

    while idx < tokens.len() {
        let token = tokens[idx];
        let next = tokens.get(idx + 1).map(|t| t.kind);
        match token.kind {
            TokenKind::Quote => {
                if in_string && next == Some(TokenKind::Quote) {
                    out.push(Token {
                        kind: TokenKind::Other,
                        ..tokens[idx + 1]
                    });
                    idx += 2;
                    continue;
                }
                in_string = !in_string;
                let kind = if in_string {
                    TokenKind::StringStart
                } else {
                    TokenKind::StringEnd
                };
                out.push(Token { kind, ..token });
            }
            TokenKind::Backslash => {
                if next == Some(TokenKind::Quote) {
                    out.push(Token {
                        kind: TokenKind::Other,
                        ..tokens[idx + 1]
                    });
                    idx += 2;
                    continue;
                }
                let mut end = idx + 1;
                while end < tokens.len() && tokens[end].kind == TokenKind::Whitespace {
                    end += 1;
                }
                if !in_string {
                    if end >= tokens.len() {
                        break;
                    }
                    if tokens[end].kind == TokenKind::Newline {
                        idx = end + 1;
                        continue;
                    }
                }
                out.push(Token {
                    kind: TokenKind::Other,
                    ..token
                });
            }
            TokenKind::Whitespace => {
                if in_string {
                    out.push(token);
                } else if out
                    .last()
                    .is_some_and(|t| t.kind != TokenKind::SingleSpace)
                {
                    out.push(Token {
                        kind: TokenKind::SingleSpace,
                        ..token
                    });
                }
            }
            TokenKind::Newline => {
                if in_string {
                    // 未闭合的字符串：截断，由解析器报告
                    break;
                }
                push_newline(&mut out, token);
            }
            TokenKind::Characters | TokenKind::Digits => push_word(&mut out, token),
            TokenKind::ScriptStart if !in_string => {
                let end = script_end(tokens, idx).map_or(tokens.len(), |end| end + 1);
                out.extend_from_slice(&tokens[idx..end]);
                idx = end;
                continue;
            }
            _ => out.push(token),
        }
        idx += 1;
    }

    if !out.is_empty() && !in_string {
        let end = source.len();
        let last = out[out.len() - 1];
        push_newline(
            &mut out,
            Token::new(TokenKind::Newline, end, end, last.pos),
        );
    }
    out
}
