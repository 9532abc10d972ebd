//! 递归下降解析器
//!
//! 每个产生式失败时把游标恢复到进入时的位置，返回 `None`；
//! 只有最外层 [`Parser::parse`] 把失败转换成 [`ParserError`]。

use super::block::{
    AssignOp, Assignment, Block, Combinator, Condition, Expression, MultiBlock, Scope, Value,
};
use super::error::{ErrorLocation, ParseResult, ParserError, ParserErrorKind};
use crate::kit::lexer::{Coordinate, Token, TokenKind};
use crate::kit::preprocess::Preprocessor;
use qbuild_log::{debug, trace, Logger};
use std::sync::Arc;

bitflags::bitflags! {
    /// 表达式的分隔符集合
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Delim: u16 {
        const NEWLINE = 1 << 0;
        const COLON = 1 << 1;
        const PIPE = 1 << 2;
        const LBRACE = 1 << 3;
        const RBRACE = 1 << 4;
        const SPACE = 1 << 5;
        const OP = 1 << 6;
        const SCRIPT_START = 1 << 7;
        const LPAREN = 1 << 8;
        const RPAREN = 1 << 9;
        const COMMA = 1 << 10;
    }
}

impl Delim {
    fn matches(self, kind: TokenKind) -> bool {
        let flag = match kind {
            TokenKind::Newline => Delim::NEWLINE,
            TokenKind::Colon => Delim::COLON,
            TokenKind::Pipe => Delim::PIPE,
            TokenKind::LBrace => Delim::LBRACE,
            TokenKind::RBrace => Delim::RBRACE,
            TokenKind::SingleSpace => Delim::SPACE,
            TokenKind::ScriptStart => Delim::SCRIPT_START,
            TokenKind::LParen => Delim::LPAREN,
            TokenKind::RParen => Delim::RPAREN,
            TokenKind::Comma => Delim::COMMA,
            kind if kind.is_operator() => Delim::OP,
            _ => return false,
        };
        self.contains(flag)
    }
}

/// 条件组合的中间状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Logic {
    Undecided,
    And,
    Or,
    /// `a|b:` —— 或条件，最后的 `:` 引出主体
    OrFinalAnd,
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    current: usize,
    /// 最靠后的一条具体错误
    error: Option<(usize, ParserErrorKind)>,
    logger: Arc<Logger>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_logger(source, Logger::noop())
    }

    pub fn with_logger(source: &'a str, logger: Arc<Logger>) -> Self {
        let tokens = Preprocessor::with_logger(logger.clone()).tokenize(source);
        Self {
            source,
            tokens,
            current: 0,
            error: None,
            logger,
        }
    }

    /// 解析整个文件
    ///
    /// 空输入（或只有注释）返回 [`ParserErrorKind::Empty`]。
    pub fn parse(&mut self) -> ParseResult<MultiBlock> {
        if self.tokens.is_empty() {
            return Err(ParserError::at_eof(ParserErrorKind::Empty));
        }
        let block = self.parse_multi_block(false, false);
        if !self.at_end() {
            return Err(self.failure());
        }
        trace!(self.logger, "parsed {} top-level blocks", block.blocks.len());
        Ok(block)
    }

    /// 解析单独一个表达式（规则命令、测试的展开），结果是无名赋值
    pub fn parse_single_expression(&mut self) -> ParseResult<Assignment> {
        let pos = self.coordinate();
        let expr = if self.tokens.is_empty() {
            Expression::default()
        } else {
            self.parse_expression(Delim::NEWLINE)
                .ok_or_else(|| self.failure())?
        };
        if self.check(TokenKind::Newline) {
            self.consume();
        }
        if !self.at_end() {
            return Err(self.failure());
        }
        Ok(Assignment {
            name: String::new(),
            op: AssignOp::Assign,
            expr,
            pos,
        })
    }

    /// 预处理后的 token 流
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    // ---- token 访问 ----

    fn at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }

    /// 当前 token 的种类；输入结束时为 `NoToken`
    fn peek(&self) -> TokenKind {
        self.tokens
            .get(self.current)
            .map_or(TokenKind::NoToken, |t| t.kind)
    }

    fn peek_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.current + offset)
            .map_or(TokenKind::NoToken, |t| t.kind)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    /// 消费当前token
    fn consume(&mut self) {
        if self.current < self.tokens.len() {
            self.current += 1;
        }
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.consume();
            true
        } else {
            false
        }
    }

    fn text(&self) -> &'a str {
        self.tokens
            .get(self.current)
            .map_or("", |t| t.text(self.source))
    }

    fn coordinate(&self) -> Coordinate {
        self.tokens
            .get(self.current)
            .or_else(|| self.tokens.last())
            .map_or_else(Coordinate::default, |t| t.pos)
    }

    fn skip_space(&mut self) {
        while self.check(TokenKind::SingleSpace) {
            self.consume();
        }
    }

    fn skip_space_newline(&mut self) {
        while matches!(self.peek(), TokenKind::SingleSpace | TokenKind::Newline) {
            self.consume();
        }
    }

    /// 记录一条具体错误，位置更靠后的覆盖之前的
    fn record(&mut self, kind: ParserErrorKind) {
        if self.error.as_ref().map_or(true, |(at, _)| *at <= self.current) {
            self.error = Some((self.current, kind));
        }
    }

    /// 在当前位置构造错误；已记录的更靠后的具体错误优先
    fn failure(&self) -> ParserError {
        let (at, kind) = match &self.error {
            Some((at, kind)) if *at >= self.current => (*at, kind.clone()),
            _ => {
                let kind = if self.at_end() {
                    ParserErrorKind::UnexpectedEndOfInput
                } else {
                    ParserErrorKind::unexpected(self.text())
                };
                (self.current, kind)
            }
        };
        match self.tokens.get(at) {
            Some(token) => ParserError::here(kind, token.pos, token.text(self.source)),
            None => ParserError {
                kind,
                location: ErrorLocation::Eof,
                token: String::new(),
            },
        }
    }

    // ---- 块 ----

    fn parse_multi_block(&mut self, in_scope: bool, in_using: bool) -> MultiBlock {
        self.skip_space();
        let pos = self.coordinate();
        let mut blocks = Vec::new();
        while !self.at_end() {
            if in_scope && self.check(TokenKind::RBrace) {
                break;
            }
            if in_using && self.check(TokenKind::RBracket) {
                break;
            }
            match self.parse_block(in_scope) {
                Some(block) => blocks.push(block),
                None => break,
            }
        }
        MultiBlock {
            blocks,
            using: None,
            pos,
        }
    }

    fn parse_block(&mut self, in_scope: bool) -> Option<Block> {
        let start = self.current;
        let pos = self.coordinate();
        let mut conditions: Vec<Condition> = Vec::new();
        let mut logic = Logic::Undecided;

        while let Some(condition) = self.parse_single_scope(in_scope) {
            self.skip_space();
            match self.peek() {
                TokenKind::Colon | TokenKind::Pipe => {
                    let and = self.check(TokenKind::Colon);
                    logic = match (logic, and) {
                        (Logic::Undecided, true) | (Logic::And, true) => Logic::And,
                        (Logic::Undecided, false) | (Logic::Or, false) => Logic::Or,
                        (Logic::Or, true) => Logic::OrFinalAnd,
                        _ => {
                            self.record(ParserErrorKind::MixedScopeOperators);
                            self.current = start;
                            return None;
                        }
                    };
                    conditions.push(condition);
                    self.consume();
                    self.skip_space();
                }
                kind if kind == TokenKind::Newline || (in_scope && kind == TokenKind::RBrace) => {
                    if condition.test_function().is_none() {
                        self.current = start;
                        return None;
                    }
                    conditions.push(condition);
                    break;
                }
                TokenKind::LBrace => {
                    conditions.push(condition);
                    break;
                }
                _ => {
                    self.current = start;
                    return None;
                }
            }
        }

        let body = match self.peek() {
            TokenKind::LBrace => match self.parse_sub_scope() {
                Some(multi) => Some(Block::Multi(multi)),
                None => {
                    self.current = start;
                    return None;
                }
            },
            TokenKind::ScriptStart => match self.parse_script() {
                Some(script) => Some(script),
                None => {
                    self.current = start;
                    return None;
                }
            },
            TokenKind::RBrace if in_scope => None,
            _ => {
                let delim = if in_scope {
                    Delim::NEWLINE | Delim::RBRACE
                } else {
                    Delim::NEWLINE
                };
                let block = if let Some(assignment) = self.parse_assignment(delim) {
                    Block::Assignment(assignment)
                } else if let Some(using) = self.parse_using() {
                    Block::Multi(using)
                } else {
                    // 最后一个条件其实是一条函数调用语句
                    match conditions.pop() {
                        Some(condition) if condition.test_function().is_some() => {
                            debug!(
                                self.logger,
                                "treating condition at {} as a function statement", pos
                            );
                            condition.values.into_iter().next().map(Block::Function)?
                        }
                        _ => {
                            self.current = start;
                            return None;
                        }
                    }
                };
                Some(block)
            }
        };

        self.skip_space();
        self.match_token(TokenKind::Newline);
        self.skip_space();

        if conditions.is_empty() {
            return match body {
                Some(block) => Some(block),
                None => {
                    self.current = start;
                    None
                }
            };
        }

        let combinator = match logic {
            Logic::Undecided | Logic::And => Combinator::And,
            Logic::Or | Logic::OrFinalAnd => Combinator::Or,
        };
        let else_block = self.parse_else_block(in_scope).map(Box::new);
        Some(Block::Scope(Scope {
            conditions,
            combinator,
            blocks: body.into_iter().collect(),
            else_block,
            pos,
        }))
    }

    fn parse_sub_scope(&mut self) -> Option<MultiBlock> {
        let start = self.current;
        if !self.match_token(TokenKind::LBrace) {
            return None;
        }
        self.skip_space_newline();
        let multi = self.parse_multi_block(true, false);
        self.skip_space_newline();
        if !self.match_token(TokenKind::RBrace) {
            self.record(ParserErrorKind::MissingRightCurly);
            self.current = start;
            return None;
        }
        self.skip_space_newline();
        Some(multi)
    }

    fn parse_else_block(&mut self, in_scope: bool) -> Option<Block> {
        let start = self.current;
        if !self.match_token(TokenKind::Else) {
            return None;
        }
        self.skip_space();
        let block = match self.peek() {
            TokenKind::LBrace => self.parse_sub_scope().map(Block::Multi),
            TokenKind::Colon | TokenKind::Pipe => {
                self.consume();
                self.skip_space();
                self.parse_block(in_scope)
            }
            _ => None,
        };
        if block.is_none() {
            self.current = start;
        }
        block
    }

    fn parse_using(&mut self) -> Option<MultiBlock> {
        let start = self.current;
        let name = self.parse_name()?;
        self.skip_space();
        if !self.match_token(TokenKind::LBracket) {
            self.current = start;
            return None;
        }
        self.skip_space_newline();
        let mut multi = self.parse_multi_block(false, true);
        self.skip_space_newline();
        if !self.match_token(TokenKind::RBracket) {
            self.record(ParserErrorKind::MissingRightBracket);
            self.current = start;
            return None;
        }
        multi.using = Some(name);
        Some(multi)
    }

    /// 脚本块：结束标记必须位于行首，文本取两个标记之间的原始源码
    fn parse_script(&mut self) -> Option<Block> {
        let start = self.current;
        let pos = self.coordinate();
        let open = *self.tokens.get(self.current)?;
        self.consume();
        let mut new_line = false;
        loop {
            if self.at_end() {
                self.current = start;
                self.record(ParserErrorKind::UnterminatedScript);
                return None;
            }
            match self.peek() {
                TokenKind::Newline => new_line = true,
                TokenKind::Whitespace | TokenKind::SingleSpace => {}
                TokenKind::ScriptEnd if new_line => break,
                _ => new_line = false,
            }
            self.consume();
        }
        let close = self.tokens[self.current];
        self.consume();
        self.skip_space();
        if !self.at_end() && !self.match_token(TokenKind::Newline) {
            self.record(ParserErrorKind::unexpected(self.text()));
            self.current = start;
            return None;
        }
        let text = self.source.get(open.end..close.start).unwrap_or("");
        Some(Block::Script {
            text: text.to_string(),
            pos,
        })
    }

    fn parse_assignment(&mut self, delim: Delim) -> Option<Assignment> {
        let start = self.current;
        let pos = self.coordinate();
        let name = self.parse_name()?;
        self.skip_space();
        let op = match self.peek() {
            TokenKind::Equal => AssignOp::Assign,
            TokenKind::PlusEqual => AssignOp::Add,
            TokenKind::MinusEqual => AssignOp::Remove,
            TokenKind::StarEqual => AssignOp::Unite,
            TokenKind::TildeEqual => AssignOp::Regexp,
            _ => {
                self.current = start;
                return None;
            }
        };
        self.consume();
        self.skip_space();
        match self.parse_expression(delim) {
            Some(expr) => Some(Assignment {
                name,
                op,
                expr,
                pos,
            }),
            None => {
                self.current = start;
                None
            }
        }
    }

    // ---- 条件 ----

    fn parse_single_scope(&mut self, in_scope: bool) -> Option<Condition> {
        let start = self.current;
        let mut delim = Delim::NEWLINE | Delim::COLON | Delim::PIPE | Delim::LBRACE | Delim::SPACE;
        if in_scope {
            delim |= Delim::RBRACE;
        }
        self.skip_space();
        let negate = self.match_token(TokenKind::Not);

        let attempt = self.current;
        if let Some(function) = self.parse_test_function() {
            self.skip_space();
            if delim.matches(self.peek()) {
                return Some(Condition {
                    values: vec![function],
                    negate,
                });
            }
        }
        self.current = attempt;

        let values = match self.parse_evaluatable_values(delim | Delim::OP | Delim::SCRIPT_START) {
            Some(values) if !values.is_empty() => values,
            _ => {
                self.current = start;
                return None;
            }
        };
        self.skip_space();
        if !delim.matches(self.peek()) {
            self.current = start;
            return None;
        }
        Some(Condition { values, negate })
    }

    fn parse_test_function(&mut self) -> Option<Value> {
        let start = self.current;
        let pos = self.coordinate();
        let name = self.parse_name()?;
        match self.parse_function_arguments() {
            Some(args) => Some(Value::TestFunction { name, args, pos }),
            None => {
                self.current = start;
                None
            }
        }
    }

    // ---- 值与表达式 ----

    /// `NAME ('.' (NAME | DIGITS))*`
    fn parse_name(&mut self) -> Option<String> {
        let start = self.current;
        self.skip_space();
        if !self.check(TokenKind::Name) {
            self.current = start;
            return None;
        }
        let mut name = self.text().to_string();
        self.consume();
        while self.check(TokenKind::Dot)
            && matches!(self.peek_at(1), TokenKind::Name | TokenKind::Digits)
        {
            self.consume();
            name.push('.');
            name.push_str(self.text());
            self.consume();
        }
        Some(name)
    }

    fn parse_function_arguments(&mut self) -> Option<Vec<Expression>> {
        let start = self.current;
        if !self.match_token(TokenKind::LParen) {
            return None;
        }
        self.skip_space();
        if self.match_token(TokenKind::RParen) {
            return Some(Vec::new());
        }

        let mut args = Vec::new();
        loop {
            let Some(expr) = self.parse_expression(Delim::NEWLINE | Delim::RPAREN | Delim::COMMA) else {
                self.current = start;
                return None;
            };
            if self.match_token(TokenKind::Comma) {
                args.push(expr);
                self.skip_space();
                continue;
            }
            if !(args.is_empty() && expr.is_empty()) {
                args.push(expr);
            }
            break;
        }

        if !self.match_token(TokenKind::RParen) {
            self.current = start;
            return None;
        }
        Some(args)
    }

    fn parse_expression(&mut self, delim: Delim) -> Option<Expression> {
        let start = self.current;
        let extra = if delim.contains(Delim::RPAREN) {
            Delim::LPAREN
        } else {
            Delim::empty()
        };
        let mut groups = Vec::new();
        let mut parens = 0usize;

        while !self.at_end() && !delim.matches(self.peek()) {
            let mut values = Vec::new();
            loop {
                let Some(part) = self.parse_evaluatable_values(delim | extra | Delim::SPACE) else {
                    self.current = start;
                    return None;
                };
                values.extend(part);
                let pos = self.coordinate();
                let kind = self.peek();
                let text = match kind {
                    TokenKind::LParen if !delim.contains(Delim::LPAREN) => {
                        parens += 1;
                        "("
                    }
                    TokenKind::RParen if delim.contains(Delim::RPAREN) && parens > 0 => {
                        parens -= 1;
                        ")"
                    }
                    TokenKind::Comma if delim.contains(Delim::COMMA) && parens > 0 => ",",
                    _ => break,
                };
                values.push(Value::Characters {
                    text: text.to_string(),
                    pos,
                });
                self.consume();
            }
            if !values.is_empty() {
                groups.push(values);
            }
            self.skip_space();
        }
        Some(Expression { groups })
    }

    fn parse_evaluatable_values(&mut self, delim: Delim) -> Option<Vec<Value>> {
        let start = self.current;
        let mut values = Vec::new();
        let mut text = String::new();
        let mut text_pos = self.coordinate();
        let mut quoted = false;

        while !self.at_end() && (quoted || !delim.matches(self.peek())) {
            match self.peek() {
                TokenKind::StringStart | TokenKind::StringEnd => {
                    quoted = !quoted;
                    self.consume();
                }
                TokenKind::DollarDollar => {
                    let attempt = self.current;
                    match self.parse_evaluatable_value() {
                        Some(value) => {
                            if !text.is_empty() {
                                values.push(Value::Characters {
                                    text: std::mem::take(&mut text),
                                    pos: text_pos,
                                });
                            }
                            values.push(value);
                        }
                        None => {
                            self.current = attempt;
                            if text.is_empty() {
                                text_pos = self.coordinate();
                            }
                            text.push_str(self.text());
                            self.consume();
                        }
                    }
                }
                _ => {
                    if text.is_empty() {
                        text_pos = self.coordinate();
                    }
                    text.push_str(self.text());
                    self.consume();
                }
            }
        }

        if quoted {
            self.record(ParserErrorKind::UnterminatedString);
            self.current = start;
            return None;
        }
        if !text.is_empty() {
            values.push(Value::Characters {
                text,
                pos: text_pos,
            });
        }
        Some(values)
    }

    /// `$$(ENV)`、`$$[ENGINE]`、`$$NAME`、`$${NAME}`、`$$func(args)`、`$${func}(args)`
    fn parse_evaluatable_value(&mut self) -> Option<Value> {
        let start = self.current;
        let pos = self.coordinate();
        if !self.match_token(TokenKind::DollarDollar) {
            return None;
        }

        let value = match self.peek() {
            TokenKind::LParen => {
                self.consume();
                let name = self.parse_name();
                match name {
                    Some(name) if self.match_token(TokenKind::RParen) => {
                        Some(Value::Environment { name, pos })
                    }
                    _ => None,
                }
            }
            TokenKind::LBracket => {
                self.consume();
                let name = self.parse_name();
                match name {
                    Some(name) if self.match_token(TokenKind::RBracket) => {
                        Some(Value::EngineVariable { name, pos })
                    }
                    _ => None,
                }
            }
            _ => {
                let brace = self.match_token(TokenKind::LBrace);
                match self.parse_name() {
                    Some(name) => {
                        let closed = if brace {
                            self.skip_space();
                            self.match_token(TokenKind::RBrace)
                        } else {
                            true
                        };
                        if !closed {
                            None
                        } else if self.check(TokenKind::LParen) {
                            self.parse_function_arguments()
                                .map(|args| Value::Function { name, args, pos })
                        } else {
                            Some(Value::Variable { name, pos })
                        }
                    }
                    None => None,
                }
            }
        };

        if value.is_none() {
            self.current = start;
        }
        value
    }
}

/// 解析源码为块树
pub fn parse(source: &str) -> ParseResult<MultiBlock> {
    Parser::new(source).parse()
}

/// 解析单个表达式
pub fn parse_single_expression(text: &str) -> ParseResult<Assignment> {
    Parser::new(text).parse_single_expression()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> MultiBlock {
        match parse(source) {
            Ok(block) => block,
            Err(err) => panic!("parse failed for {source:?}: {err}"),
        }
    }

    fn chars(value: &Value) -> &str {
        match value {
            Value::Characters { text, .. } => text,
            other => panic!("expected characters, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_assignments() {
        let tree = parse_ok("FOO = 1 2 3\nFOO -= 2\nA.B += x\nC *= y\nD ~= s/a/b/\n");
        let ops: Vec<_> = tree
            .blocks
            .iter()
            .map(|b| match b {
                Block::Assignment(a) => (a.name.as_str(), a.op),
                other => panic!("unexpected block {other:?}"),
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                ("FOO", AssignOp::Assign),
                ("FOO", AssignOp::Remove),
                ("A.B", AssignOp::Add),
                ("C", AssignOp::Unite),
                ("D", AssignOp::Regexp)
            ]
        );
        let Block::Assignment(first) = &tree.blocks[0] else {
            unreachable!()
        };
        assert_eq!(first.expr.groups.len(), 3);
        assert_eq!(chars(&first.expr.groups[1][0]), "2");
    }

    #[test]
    fn test_parse_scope_and_else() {
        let tree = parse_ok("linux:FOO = yes\nelse:FOO = no\n");
        assert_eq!(tree.blocks.len(), 1);
        let Block::Scope(scope) = &tree.blocks[0] else {
            panic!("expected scope")
        };
        assert_eq!(scope.conditions.len(), 1);
        assert_eq!(chars(&scope.conditions[0].values[0]), "linux");
        assert!(matches!(scope.blocks[0], Block::Assignment(_)));
        assert!(matches!(
            scope.else_block.as_deref(),
            Some(Block::Assignment(a)) if a.name == "FOO"
        ));
    }

    #[test]
    fn test_parse_or_then_and() {
        let tree = parse_ok("a|b:X = 1\n");
        let Block::Scope(scope) = &tree.blocks[0] else {
            panic!("expected scope")
        };
        assert_eq!(scope.combinator, Combinator::Or);
        assert_eq!(scope.conditions.len(), 2);
    }

    #[test]
    fn test_and_then_or_is_rejected() {
        let err = parse("a:b|c:X = 1\n").unwrap_err();
        assert_eq!(err.kind, ParserErrorKind::MixedScopeOperators);
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn test_parse_braced_scope_with_negation() {
        let tree = parse_ok("!exists(foo.txt) {\n    message(missing)\n}\n");
        let Block::Scope(scope) = &tree.blocks[0] else {
            panic!("expected scope")
        };
        assert!(scope.conditions[0].negate);
        assert_eq!(scope.conditions[0].test_function().map(|f| f.0), Some("exists"));
        let Block::Multi(body) = &scope.blocks[0] else {
            panic!("expected body")
        };
        assert!(matches!(&body.blocks[0], Block::Function(Value::TestFunction { name, .. }) if name == "message"));
    }

    #[test]
    fn test_parse_function_statement() {
        let tree = parse_ok("message(hello, world)\n");
        let Block::Function(Value::TestFunction { name, args, .. }) = &tree.blocks[0] else {
            panic!("expected function block")
        };
        assert_eq!(name, "message");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_parse_variables() {
        let tree = parse_ok("A = $$B x$${C}y $$(HOME) $$[QBUILD_VERSION] $$join($$D)\n");
        let Block::Assignment(a) = &tree.blocks[0] else {
            panic!("expected assignment")
        };
        assert!(matches!(&a.expr.groups[0][0], Value::Variable { name, .. } if name == "B"));
        assert_eq!(a.expr.groups[1].len(), 3);
        assert!(matches!(&a.expr.groups[1][1], Value::Variable { name, .. } if name == "C"));
        assert!(matches!(&a.expr.groups[2][0], Value::Environment { name, .. } if name == "HOME"));
        assert!(matches!(&a.expr.groups[3][0], Value::EngineVariable { name, .. } if name == "QBUILD_VERSION"));
        assert!(matches!(&a.expr.groups[4][0], Value::Function { name, args, .. } if name == "join" && args.len() == 1));
    }

    #[test]
    fn test_lone_dollar_dollar_is_text() {
        let tree = parse_ok("A = $$\n");
        let Block::Assignment(a) = &tree.blocks[0] else {
            panic!("expected assignment")
        };
        assert_eq!(chars(&a.expr.groups[0][0]), "$$");
    }

    #[test]
    fn test_nested_parens_in_arguments() {
        let tree = parse_ok("f(a(b,c), d)\n");
        let Block::Function(Value::TestFunction { args, .. }) = &tree.blocks[0] else {
            panic!("expected function block")
        };
        assert_eq!(args.len(), 2);
        let text: String = args[0].groups[0].iter().map(chars).collect();
        assert_eq!(text, "a(b,c)");
    }

    #[test]
    fn test_quoted_string_keeps_spaces() {
        let tree = parse_ok("A = \"x y\" z\n");
        let Block::Assignment(a) = &tree.blocks[0] else {
            panic!("expected assignment")
        };
        assert_eq!(a.expr.groups.len(), 2);
        assert_eq!(chars(&a.expr.groups[0][0]), "x y");
    }

    #[test]
    fn test_using_block() {
        let tree = parse_ok("RULE [\n    commands = echo\n    input = a\n]\n");
        let Block::Multi(multi) = &tree.blocks[0] else {
            panic!("expected using block")
        };
        assert_eq!(multi.using.as_deref(), Some("RULE"));
        assert_eq!(multi.blocks.len(), 2);
    }

    #[test]
    fn test_script_blocks() {
        let source = "script\nvar x = 1;\nendscript\nA = 1\n";
        let tree = parse_ok(source);
        let Block::Script { text, .. } = &tree.blocks[0] else {
            panic!("expected script")
        };
        assert!(text.contains("var x = 1;"));
        assert!(matches!(tree.blocks[1], Block::Assignment(_)));

        let tree = parse_ok("linux:<script>\nrun();\n</script>\n");
        let Block::Scope(scope) = &tree.blocks[0] else {
            panic!("expected scope")
        };
        assert!(matches!(&scope.blocks[0], Block::Script { text, .. } if text.contains("run();")));
    }

    #[test]
    fn test_unterminated_script_fails() {
        let err = parse("script\nnever ends\n").unwrap_err();
        assert_eq!(err.kind, ParserErrorKind::UnterminatedScript);
    }

    #[test]
    fn test_unterminated_string_fails() {
        let err = parse("A = \"open\n").unwrap_err();
        assert_eq!(err.kind, ParserErrorKind::UnterminatedString);
    }

    #[test]
    fn test_error_position_points_at_failing_statement() {
        let err = parse("A = 1\nB = 2\n} oops\n").unwrap_err();
        assert_eq!(err.line(), Some(3));
        assert_eq!(err.token, "}");
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").unwrap_err().is_empty_input());
        assert!(parse("# nothing\n").unwrap_err().is_empty_input());
    }

    #[test]
    fn test_single_expression() {
        let a = parse_single_expression("gcc -c $$INPUT -o $$OUTPUT").unwrap();
        assert!(a.name.is_empty());
        assert_eq!(a.expr.groups.len(), 5);
        assert!(parse_single_expression("").unwrap().expr.is_empty());
    }

    #[test]
    fn test_for_loop_scope() {
        let tree = parse_ok("for(f, FILES) {\n    OUT += $$f\n}\n");
        let Block::Scope(scope) = &tree.blocks[0] else {
            panic!("expected scope")
        };
        assert_eq!(scope.conditions[0].test_function().map(|f| f.1.len()), Some(2));
    }
}
