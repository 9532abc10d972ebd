//! 语法树
//!
//! 全部是封闭的和类型（enum），求值器按变体分派。

use crate::kit::lexer::Coordinate;

/// 赋值运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `+=`
    Add,
    /// `-=`
    Remove,
    /// `*=`，只追加不存在的值
    Unite,
    /// `~=`，`s/from/to/flags` 替换
    Regexp,
}

impl AssignOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Remove => "-=",
            AssignOp::Unite => "*=",
            AssignOp::Regexp => "~=",
        }
    }
}

/// 条件之间的组合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

/// 可求值的值
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 字面文本
    Characters { text: String, pos: Coordinate },
    /// `$$VAR` / `$${VAR}`
    Variable { name: String, pos: Coordinate },
    /// `$$[NAME]`，引擎内部变量
    EngineVariable { name: String, pos: Coordinate },
    /// `$$(NAME)`，环境变量
    Environment { name: String, pos: Coordinate },
    /// `$$name(args)`，取返回值
    Function {
        name: String,
        args: Vec<Expression>,
        pos: Coordinate,
    },
    /// `name(args)`，取真假
    TestFunction {
        name: String,
        args: Vec<Expression>,
        pos: Coordinate,
    },
}

impl Value {
    pub fn pos(&self) -> Coordinate {
        match self {
            Value::Characters { pos, .. }
            | Value::Variable { pos, .. }
            | Value::EngineVariable { pos, .. }
            | Value::Environment { pos, .. }
            | Value::Function { pos, .. }
            | Value::TestFunction { pos, .. } => *pos,
        }
    }

    pub fn is_test_function(&self) -> bool {
        matches!(self, Value::TestFunction { .. })
    }
}

/// 表达式：按空白分开的若干组，每组是紧挨着的若干值
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expression {
    pub groups: Vec<Vec<Value>>,
}

impl Expression {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// 作用域条件，`!` 前缀取反
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub values: Vec<Value>,
    pub negate: bool,
}

impl Condition {
    /// 唯一的值是测试函数时返回它
    pub fn test_function(&self) -> Option<(&str, &[Expression])> {
        match self.values.as_slice() {
            [Value::TestFunction { name, args, .. }] => Some((name, args)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiBlock {
    pub blocks: Vec<Block>,
    /// `NAME [ ... ]` 块的前缀
    pub using: Option<String>,
    pub pos: Coordinate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub conditions: Vec<Condition>,
    pub combinator: Combinator,
    pub blocks: Vec<Block>,
    pub else_block: Option<Box<Block>>,
    pub pos: Coordinate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// 为空时表示单独的表达式
    pub name: String,
    pub op: AssignOp,
    pub expr: Expression,
    pub pos: Coordinate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Multi(MultiBlock),
    Scope(Scope),
    Assignment(Assignment),
    /// 单独一行的函数调用，值为 [`Value::TestFunction`]
    Function(Value),
    Script { text: String, pos: Coordinate },
}

impl Block {
    pub fn pos(&self) -> Coordinate {
        match self {
            Block::Multi(multi) => multi.pos,
            Block::Scope(scope) => scope.pos,
            Block::Assignment(assignment) => assignment.pos,
            Block::Function(value) => value.pos(),
            Block::Script { pos, .. } => *pos,
        }
    }
}
