//! 词法状态表
//!
//! 每个状态对 256 个字节各有一个转移；没有转移时结束当前 token，
//! 产出该状态记录的 token 种类。

use super::token::TokenKind;
use once_cell::sync::Lazy;

const NONE: u16 = u16::MAX;

pub(crate) const START: u16 = 0;

pub(crate) struct State {
    pub next: [u16; 256],
    pub token: TokenKind,
}

pub(crate) struct Table {
    states: Vec<State>,
}

impl Table {
    #[inline]
    pub fn next(&self, state: u16, byte: u8) -> Option<u16> {
        let next = self.states[state as usize].next[byte as usize];
        (next != NONE).then_some(next)
    }

    #[inline]
    pub fn token(&self, state: u16) -> TokenKind {
        self.states[state as usize].token
    }
}

pub(crate) static TABLE: Lazy<Table> = Lazy::new(build);

pub(crate) fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte >= 0x80
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r')
}

const SYMBOLS: &[(&str, TokenKind)] = &[
    ("\n", TokenKind::Newline),
    ("#", TokenKind::Hash),
    ("\"", TokenKind::Quote),
    ("\\", TokenKind::Backslash),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
    (",", TokenKind::Comma),
    (":", TokenKind::Colon),
    ("|", TokenKind::Pipe),
    ("!", TokenKind::Not),
    (".", TokenKind::Dot),
    ("$$", TokenKind::DollarDollar),
    ("=", TokenKind::Equal),
    ("+=", TokenKind::PlusEqual),
    ("-=", TokenKind::MinusEqual),
    ("*=", TokenKind::StarEqual),
    ("~=", TokenKind::TildeEqual),
    ("<script>", TokenKind::ScriptStart),
    ("</script>", TokenKind::ScriptEnd),
];

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("else", TokenKind::Else),
    ("script", TokenKind::ScriptStart),
    ("endscript", TokenKind::ScriptEnd),
];

struct Builder {
    states: Vec<State>,
}

impl Builder {
    fn add(&mut self, token: TokenKind) -> u16 {
        self.states.push(State {
            next: [NONE; 256],
            token,
        });
        (self.states.len() - 1) as u16
    }

    /// 沿前缀树插入 `word`，返回终止状态
    fn insert(&mut self, word: &str, token: TokenKind, runs: &[u16]) -> u16 {
        let prefix_token = if word.as_bytes()[0].is_ascii_alphabetic() {
            TokenKind::Characters
        } else {
            TokenKind::Other
        };
        let mut state = START;
        for &byte in word.as_bytes() {
            let next = self.states[state as usize].next[byte as usize];
            state = if next == NONE || runs.contains(&next) {
                let created = self.add(prefix_token);
                self.states[state as usize].next[byte as usize] = created;
                created
            } else {
                next
            };
        }
        self.states[state as usize].token = token;
        state
    }
}

fn build() -> Table {
    let mut builder = Builder { states: Vec::new() };
    let start = builder.add(TokenKind::Incomplete);
    let chars = builder.add(TokenKind::Characters);
    let digits = builder.add(TokenKind::Digits);
    let spaces = builder.add(TokenKind::Whitespace);
    let other = builder.add(TokenKind::Other);
    let runs = [chars, digits, spaces, other];

    for byte in 0..=255u8 {
        let target = if is_name_char(byte) {
            chars
        } else if byte.is_ascii_digit() {
            digits
        } else if is_space(byte) {
            spaces
        } else {
            other
        };
        builder.states[start as usize].next[byte as usize] = target;
        builder.states[target as usize].next[byte as usize] = target;
    }

    for (word, token) in SYMBOLS {
        builder.insert(word, *token, &runs);
    }

    // 关键字及其前缀状态：再遇到名字字符就退化为普通字符串
    let first_keyword_state = builder.states.len();
    for (word, token) in KEYWORDS {
        builder.insert(word, *token, &runs);
    }
    for state in first_keyword_state..builder.states.len() {
        for byte in 0..=255u8 {
            let slot = &mut builder.states[state].next[byte as usize];
            if *slot == NONE && (is_name_char(byte) || byte.is_ascii_digit()) {
                *slot = chars;
            }
        }
    }

    // 符号起始字节不属于未识别字符串
    for (word, _) in SYMBOLS {
        let first = word.as_bytes()[0];
        builder.states[other as usize].next[first as usize] = NONE;
    }

    Table {
        states: builder.states,
    }
}
