//! CLI 格式化输出
//!
//! 提供命令行友好的错误显示和源码上下文打印。

use qbuild_api::QBuildError;

/// 打印错误；解析错误附带源码上下文
///
/// `json` 为真时输出单行 JSON 报告，供工具集成。
pub fn print_error(e: &QBuildError, json: bool) {
    let report = e.to_report();
    if json {
        match report.to_json() {
            Ok(text) => eprintln!("{text}"),
            Err(_) => eprintln!("{report}"),
        }
        return;
    }

    eprintln!("{report}");
    let Some(file) = e.file() else {
        return;
    };
    eprintln!("  --> {file}");

    if let (Some(error_line), Some(col)) = (e.line(), e.column()) {
        if let Ok(source) = std::fs::read_to_string(file) {
            print_source_context(&source, error_line, col);
        }
    }
}

/// 打印源代码上下文（显示错误行前后几行）
pub fn print_source_context(source: &str, error_line: usize, error_col: usize) {
    for line in source_context(source, error_line, error_col) {
        eprintln!("{line}");
    }
}

fn source_context(source: &str, error_line: usize, error_col: usize) -> Vec<String> {
    const CONTEXT_LINES: usize = 5;

    let lines: Vec<&str> = source.lines().collect();
    let total_lines = lines.len();
    if error_line == 0 || error_line > total_lines {
        return Vec::new();
    }

    let start_line = error_line.saturating_sub(CONTEXT_LINES).max(1);
    let end_line = (error_line + CONTEXT_LINES).min(total_lines);
    let width = end_line.to_string().len();
    let separator = format!("{}|--", "-".repeat(width + 1));

    let mut out = vec![separator.clone()];
    for (idx, content) in lines
        .iter()
        .enumerate()
        .take(end_line)
        .skip(start_line - 1)
    {
        let line_no = idx + 1;
        out.push(format!("{line_no:>width$} | {content}"));
        if line_no == error_line {
            let marker = " ".repeat(error_col.saturating_sub(1));
            out.push(format!("{} | {marker}^", " ".repeat(width)));
        }
    }
    out.push(separator);
    out
}
