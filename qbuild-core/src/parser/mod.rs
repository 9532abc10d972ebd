//! 解析器
//!
//! - [`block`]：语法树
//! - [`parser`]：递归下降解析
//! - [`cache`]：按文件名缓存解析结果（包括失败）
//! - [`dump`]：把语法树写回源码，或打印成树形

pub mod block;
pub mod cache;
pub mod dump;
pub mod error;
#[allow(clippy::module_inception)]
pub mod parser;

pub use block::{
    AssignOp, Assignment, Block, Combinator, Condition, Expression, MultiBlock, Scope, Value,
};
pub use cache::ParseCache;
pub use error::{ErrorLocation, ParseResult, ParserError, ParserErrorKind};
pub use parser::{parse, parse_single_expression, Parser};
