//! Shared syntax tree used by both backends.
//!
//! The parser builds these nodes once, then the interpreter walks them directly
//! while the IR generator lowers them into quadruples.

use std::fmt;

pub use crate::token::Number;

/// Declared type of a variable, parameter or function result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// `IN`: integers.
    In,
    /// `IR`: integers or reals.
    Ir,
    /// `STR`: strings.
    Str,
    /// `BINARY`: booleans.
    Binary,
    /// `TAB`: untyped slot, mostly used for arrays.
    Tab,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TypeTag::In => "IN",
            TypeTag::Ir => "IR",
            TypeTag::Str => "STR",
            TypeTag::Binary => "BINARY",
            TypeTag::Tab => "TAB",
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Number(Number),
    String(String),
    Boolean(bool),
    Identifier(String),
    ArrayAccess {
        name: String,
        index: Box<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    Call {
        name: String,
        args: Vec<Expression>,
    },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Greater => ">",
            BinaryOperator::Less => "<",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Param {
    pub ty: TypeTag,
    pub name: String,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeTag,
    pub body: Vec<Statement>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    Function(Function),
    /// `value` is always present when produced by the parser; backends still
    /// accept a bare declaration.
    VarDeclaration {
        ty: TypeTag,
        name: String,
        value: Option<Expression>,
    },
    ArrayDeclaration {
        ty: TypeTag,
        name: String,
        size: usize,
    },
    Assignment {
        target: AssignTarget,
        value: Expression,
    },
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        else_body: Option<Vec<Statement>>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    For {
        init: Box<Statement>,
        condition: Expression,
        update: Box<Statement>,
        body: Vec<Statement>,
    },
    Return(Option<Expression>),
    Output(Expression),
    /// Bare call statement, the only expression allowed in statement position.
    Expr(Expression),
}

/// Assignment target forms accepted by the parser.
#[derive(Debug, PartialEq, Clone)]
pub enum AssignTarget {
    Name(String),
    Index { name: String, index: Expression },
}

#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub declarations: Vec<Statement>,
}
