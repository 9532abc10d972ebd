use crate::kit::lexer::Coordinate;
use std::fmt;
use thiserror::Error;

/// 项目文件的语法错误
///
/// 解析器在子产生式失败时会回溯重试，只有整个文件解析失败才产生这个错误。
/// 位置取所有失败尝试中最靠后的那个 token。
#[derive(Debug, Clone, PartialEq, Error)]
#[error("[{location}] {kind}")]
pub struct ParserError {
    pub kind: ParserErrorKind,
    pub location: ErrorLocation,
    /// 出错 token 的文本；在文件末尾时为空
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorLocation {
    At(Coordinate),
    Eof,
    Unknown,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLocation::At(coord) => write!(f, "{}:{}", coord.line, coord.column),
            ErrorLocation::Eof => f.write_str("EOF"),
            ErrorLocation::Unknown => f.write_str("?:?"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParserErrorKind {
    #[error("Unexpected token '{found}'")]
    UnexpectedToken { found: String },

    #[error("Unterminated string")]
    UnterminatedString,

    /// `<script>` 没有 `</script>`，或 `script` 没有行首的 `endscript`
    #[error("Script block is missing its terminator")]
    UnterminatedScript,

    /// `a:b|c`：`:` 之后不能再接 `|`
    #[error("Cannot follow ':' with '|' in a scope condition")]
    MixedScopeOperators,

    #[error("Missing right curly brace '}}'")]
    MissingRightCurly,

    #[error("Missing right bracket ']'")]
    MissingRightBracket,

    #[error("Unexpected end of input")]
    UnexpectedEndOfInput,

    /// 文件里只有空白和注释
    #[error("Empty input")]
    Empty,
}

impl ParserErrorKind {
    pub fn unexpected(found: impl Into<String>) -> Self {
        ParserErrorKind::UnexpectedToken {
            found: found.into(),
        }
    }
}

impl ParserError {
    pub fn at(kind: ParserErrorKind, line: usize, column: usize) -> Self {
        Self::here(kind, Coordinate { line, column }, String::new())
    }

    /// 指向某个 token
    pub fn here(kind: ParserErrorKind, coordinate: Coordinate, token: impl Into<String>) -> Self {
        Self {
            kind,
            location: ErrorLocation::At(coordinate),
            token: token.into(),
        }
    }

    pub fn at_eof(kind: ParserErrorKind) -> Self {
        Self {
            kind,
            location: ErrorLocation::Eof,
            token: String::new(),
        }
    }

    fn coordinate(&self) -> Option<Coordinate> {
        match self.location {
            ErrorLocation::At(coord) => Some(coord),
            ErrorLocation::Eof | ErrorLocation::Unknown => None,
        }
    }

    pub fn line(&self) -> Option<usize> {
        self.coordinate().map(|coord| coord.line)
    }

    pub fn column(&self) -> Option<usize> {
        self.coordinate().map(|coord| coord.column)
    }

    /// 空文件不算错误，打开项目时静默忽略
    pub fn is_empty_input(&self) -> bool {
        self.kind == ParserErrorKind::Empty
    }

    /// 不带位置前缀的描述
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

pub type ParseResult<T> = Result<T, ParserError>;
