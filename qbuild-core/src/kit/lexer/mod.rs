//! 表驱动词法分析器
//!
//! - 状态表在第一次使用时构建，之后所有线程共享
//! - 相邻的字符串、数字、空白、未识别字符 token 会合并成一个
//! - 关键字只匹配完整单词：`elsewhere` 仍是普通字符

mod lexer;
mod table;
mod token;

pub use lexer::{format_tokens, Lexer};
pub use token::{Coordinate, Token, TokenKind};
