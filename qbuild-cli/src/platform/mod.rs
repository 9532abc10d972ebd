//! 平台相关的输出

mod cli;

pub use cli::print_error;
