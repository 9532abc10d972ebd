//! Token 类型定义

use std::fmt;

/// 源码位置（行、列均从 1 开始，列按字节计）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coordinate {
    pub line: usize,
    pub column: usize,
}

impl Coordinate {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Default for Coordinate {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token 种类
///
/// 前半部分由词法分析器产出；`Name`、`SingleSpace`、`StringStart`、
/// `StringEnd` 只由预处理器产出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// 状态表的起始状态，从不产出
    Incomplete,
    /// 解析器哨兵：没有 token / 输入结束
    NoToken,

    // 字符类
    Characters,
    Digits,
    Whitespace,
    Newline,

    // 单字符符号
    Hash,
    Quote,
    Backslash,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Pipe,
    Not,
    Dot,

    // `$$`
    DollarDollar,

    // 赋值运算符
    Equal,
    PlusEqual,
    MinusEqual,
    StarEqual,
    TildeEqual,

    // 关键字
    Else,
    ScriptStart,
    ScriptEnd,

    /// 未识别字符
    Other,

    // 预处理器产出
    Name,
    SingleSpace,
    StringStart,
    StringEnd,
}

impl TokenKind {
    /// 是否为赋值运算符
    pub fn is_operator(self) -> bool {
        matches!(
            self,
            TokenKind::Equal
                | TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::TildeEqual
        )
    }

    /// 相邻同类 token 是否合并
    pub(crate) fn is_run(self) -> bool {
        matches!(
            self,
            TokenKind::Characters | TokenKind::Digits | TokenKind::Whitespace | TokenKind::Other
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Incomplete => "INCOMPLETE",
            TokenKind::NoToken => "NOTOKEN",
            TokenKind::Characters => "CHARACTERS",
            TokenKind::Digits => "DIGITS",
            TokenKind::Whitespace => "WHITESPACE",
            TokenKind::Newline => "NEWLINE",
            TokenKind::Hash => "HASH",
            TokenKind::Quote => "QUOTE",
            TokenKind::Backslash => "BACKSLASH",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::LBrace => "LBRACE",
            TokenKind::RBrace => "RBRACE",
            TokenKind::LBracket => "LBRACKET",
            TokenKind::RBracket => "RBRACKET",
            TokenKind::Comma => "COMMA",
            TokenKind::Colon => "COLON",
            TokenKind::Pipe => "PIPE",
            TokenKind::Not => "NOT",
            TokenKind::Dot => "DOT",
            TokenKind::DollarDollar => "DOLLAR_DOLLAR",
            TokenKind::Equal => "EQUAL",
            TokenKind::PlusEqual => "PLUS_EQUAL",
            TokenKind::MinusEqual => "MINUS_EQUAL",
            TokenKind::StarEqual => "STAR_EQUAL",
            TokenKind::TildeEqual => "TILDE_EQUAL",
            TokenKind::Else => "ELSE",
            TokenKind::ScriptStart => "SCRIPT_START",
            TokenKind::ScriptEnd => "SCRIPT_END",
            TokenKind::Other => "OTHER",
            TokenKind::Name => "NAME",
            TokenKind::SingleSpace => "SINGLE_SPACE",
            TokenKind::StringStart => "STRING_START",
            TokenKind::StringEnd => "STRING_END",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个 token：种类加源码中的字节区间
///
/// 文本不单独保存，通过 [`Token::text`] 从源码切片取得。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub pos: Coordinate,
}

impl Token {
    pub fn new(kind: TokenKind, start: usize, end: usize, pos: Coordinate) -> Self {
        Self { kind, start, end, pos }
    }

    /// token 在源码中的文本
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
