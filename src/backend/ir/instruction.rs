use std::fmt;

use serde::Serialize;

use crate::ast::{BinaryOperator, Number, TypeTag};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    Label,
    Jump,
    #[serde(rename = "JUMPIF")]
    JumpIf,
    Call,
    Assign,
    Declare,
    Load,
    LoadConst,
    ArrayAccess,
    Return,
    Plus,
    Minus,
    Multiply,
    Divide,
    Gt,
    Lt,
    Gte,
    Lte,
    Equals,
    #[serde(rename = "NOTEQUALS")]
    NotEquals,
}

impl Opcode {
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Label => "LABEL",
            Opcode::Jump => "JUMP",
            Opcode::JumpIf => "JUMPIF",
            Opcode::Call => "CALL",
            Opcode::Assign => "ASSIGN",
            Opcode::Declare => "DECLARE",
            Opcode::Load => "LOAD",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::ArrayAccess => "ARRAY_ACCESS",
            Opcode::Return => "RETURN",
            Opcode::Plus => "PLUS",
            Opcode::Minus => "MINUS",
            Opcode::Multiply => "MULTIPLY",
            Opcode::Divide => "DIVIDE",
            Opcode::Gt => "GT",
            Opcode::Lt => "LT",
            Opcode::Gte => "GTE",
            Opcode::Lte => "LTE",
            Opcode::Equals => "EQUALS",
            Opcode::NotEquals => "NOTEQUALS",
        }
    }

    pub fn for_operator(op: BinaryOperator) -> Self {
        match op {
            BinaryOperator::Add => Opcode::Plus,
            BinaryOperator::Sub => Opcode::Minus,
            BinaryOperator::Mul => Opcode::Multiply,
            BinaryOperator::Div => Opcode::Divide,
            BinaryOperator::Greater => Opcode::Gt,
            BinaryOperator::Less => Opcode::Lt,
            BinaryOperator::GreaterEqual => Opcode::Gte,
            BinaryOperator::LessEqual => Opcode::Lte,
            BinaryOperator::Equal => Opcode::Equals,
            BinaryOperator::NotEqual => Opcode::NotEquals,
        }
    }

    /// The source operator behind an arithmetic or comparison opcode.
    pub fn operator(self) -> Option<BinaryOperator> {
        Some(match self {
            Opcode::Plus => BinaryOperator::Add,
            Opcode::Minus => BinaryOperator::Sub,
            Opcode::Multiply => BinaryOperator::Mul,
            Opcode::Divide => BinaryOperator::Div,
            Opcode::Gt => BinaryOperator::Greater,
            Opcode::Lt => BinaryOperator::Less,
            Opcode::Gte => BinaryOperator::GreaterEqual,
            Opcode::Lte => BinaryOperator::LessEqual,
            Opcode::Equals => BinaryOperator::Equal,
            Opcode::NotEquals => BinaryOperator::NotEqual,
            _ => return None,
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Temporary `t<N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Temp(pub u32);

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Jump target `L<N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl From<Number> for Constant {
    fn from(number: Number) -> Self {
        match number {
            Number::Int(value) => Constant::Int(value),
            Number::Float(value) => Constant::Float(value),
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Int(value) => Value::Int(*value),
            Constant::Float(value) => Value::Float(*value),
            Constant::Str(value) => Value::Str(value.clone()),
            Constant::Bool(value) => Value::Bool(*value),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(value) => write!(f, "{value}"),
            Constant::Float(value) => write!(f, "{value:?}"),
            Constant::Str(value) => write!(f, "\"{value}\""),
            Constant::Bool(true) => f.write_str("YES"),
            Constant::Bool(false) => f.write_str("NO"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Temp(Temp),
    Label(Label),
    Name(String),
    Const(Constant),
    /// Argument temporaries of a `CALL`, left to right.
    Args(Vec<Temp>),
    Type(TypeTag),
}

impl Operand {
    pub fn as_temp(&self) -> Option<Temp> {
        match self {
            Operand::Temp(temp) => Some(*temp),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<Label> {
        match self {
            Operand::Label(label) => Some(*label),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Operand::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }
}

impl From<Temp> for Operand {
    fn from(temp: Temp) -> Self {
        Operand::Temp(temp)
    }
}

impl From<Label> for Operand {
    fn from(label: Label) -> Self {
        Operand::Label(label)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => f.write_str("_"),
            Operand::Temp(temp) => write!(f, "{temp}"),
            Operand::Label(label) => write!(f, "{label}"),
            Operand::Name(name) => f.write_str(name),
            Operand::Const(constant) => write!(f, "{constant}"),
            Operand::Args(temps) => {
                let rendered = temps
                    .iter()
                    .map(Temp::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{rendered}]")
            }
            Operand::Type(tag) => write!(f, "{tag}"),
        }
    }
}

/// One quadruple `(opcode, arg1, arg2, result)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub arg1: Operand,
    pub arg2: Operand,
    pub result: Operand,
}

impl Instruction {
    pub fn new(opcode: Opcode, arg1: Operand, arg2: Operand, result: Operand) -> Self {
        Self {
            opcode,
            arg1,
            arg2,
            result,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}, {}, {}",
            self.opcode, self.arg1, self.arg2, self.result
        )
    }
}

impl Serialize for Instruction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeTuple;

        let mut tuple = serializer.serialize_tuple(4)?;
        tuple.serialize_element(&self.opcode)?;
        for operand in [&self.arg1, &self.arg2, &self.result] {
            if operand.is_none() {
                tuple.serialize_element(&None::<String>)?;
            } else {
                tuple.serialize_element(&operand.to_string())?;
            }
        }
        tuple.end()
    }
}

/// One instruction per line.
pub fn listing(instructions: &[Instruction]) -> String {
    instructions
        .iter()
        .map(Instruction::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
