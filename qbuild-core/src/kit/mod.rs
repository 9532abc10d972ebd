//! 工具包：词法分析与预处理
//!
//! 解析流程分两步：[`lexer::Lexer`] 用表驱动状态机把源码切成原始 token，
//! [`preprocess::Preprocessor`] 再去掉注释、折叠空白、识别字符串边界，
//! 产出解析器直接消费的 token 流。

pub mod lexer;
pub mod preprocess;

pub use lexer::{format_tokens, Coordinate, Lexer, Token, TokenKind};
pub use preprocess::Preprocessor;
