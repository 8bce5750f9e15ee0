use std::cmp::Ordering;

use serde::Serialize;
use thiserror::Error;

use crate::ast::{BinaryOperator, Number, TypeTag};

/// Errors raised while building or combining runtime values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("Type error: unsupported operand types for {op}: {left} and {right}")]
    IncompatibleOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow in '{op}'")]
    IntegerOverflow { op: &'static str },
    #[error("Array of {len} elements exceeds the limit of {max}", max = MAX_ARRAY_LEN)]
    ArrayTooLarge { len: usize },
}

/// Largest array a declaration may create.
pub const MAX_ARRAY_LEN: usize = 1 << 20;

/// Runtime value shared by the interpreter and the IR machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Array(Vec<Value>),
    None,
}

impl From<Number> for Value {
    fn from(number: Number) -> Self {
        match number {
            Number::Int(value) => Value::Int(value),
            Number::Float(value) => Value::Float(value),
        }
    }
}

impl Value {
    /// Initial value of a slot declared with `tag` and no initializer.
    pub fn default_for(tag: TypeTag) -> Self {
        match tag {
            TypeTag::In => Value::Int(0),
            TypeTag::Ir => Value::Float(0.0),
            TypeTag::Str => Value::Str(String::new()),
            TypeTag::Binary => Value::Bool(false),
            TypeTag::Tab => Value::None,
        }
    }

    /// Fixed-size array of `len` defaults for `tag`.
    pub fn array_of(tag: TypeTag, len: usize) -> Result<Value, ValueError> {
        if len > MAX_ARRAY_LEN {
            return Err(ValueError::ArrayTooLarge { len });
        }
        let mut items = Vec::new();
        items
            .try_reserve_exact(len)
            .map_err(|_| ValueError::ArrayTooLarge { len })?;
        items.resize(len, Value::default_for(tag));
        Ok(Value::Array(items))
    }

    /// Whether this value may be stored in a slot declared with `tag`.
    /// `IR` accepts integers too; `TAB` accepts anything.
    pub fn matches_type(&self, tag: TypeTag) -> bool {
        match tag {
            TypeTag::In => matches!(self, Value::Int(_)),
            TypeTag::Ir => matches!(self, Value::Int(_) | Value::Float(_)),
            TypeTag::Str => matches!(self, Value::Str(_)),
            TypeTag::Binary => matches!(self, Value::Bool(_)),
            TypeTag::Tab => true,
        }
    }

    pub fn to_output(&self) -> String {
        match self {
            Value::Int(value) => value.to_string(),
            Value::Float(value) => format!("{value:?}"),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Str(value) => value.clone(),
            Value::Array(items) => {
                let rendered = items
                    .iter()
                    .map(|item| match item {
                        Value::Str(text) => format!("'{text}'"),
                        other => other.to_output(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{rendered}]")
            }
            Value::None => "None".to_string(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(value) => *value != 0,
            Value::Float(value) => *value != 0.0,
            Value::Bool(value) => *value,
            Value::Str(value) => !value.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::None => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
            Value::Array(_) => "array",
            Value::None => "none",
        }
    }

    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn binary_op(&self, op: BinaryOperator, rhs: &Value) -> Result<Value, ValueError> {
        match op {
            BinaryOperator::Add => self.add(rhs),
            BinaryOperator::Sub => self.arithmetic(op, rhs, i64::checked_sub, |a, b| a - b),
            BinaryOperator::Mul => self.arithmetic(op, rhs, i64::checked_mul, |a, b| a * b),
            BinaryOperator::Div => self.divide(rhs),
            BinaryOperator::Greater => {
                Ok(Value::Bool(self.compare(op, rhs)? == Some(Ordering::Greater)))
            }
            BinaryOperator::Less => {
                Ok(Value::Bool(self.compare(op, rhs)? == Some(Ordering::Less)))
            }
            BinaryOperator::GreaterEqual => Ok(Value::Bool(matches!(
                self.compare(op, rhs)?,
                Some(Ordering::Greater | Ordering::Equal)
            ))),
            BinaryOperator::LessEqual => Ok(Value::Bool(matches!(
                self.compare(op, rhs)?,
                Some(Ordering::Less | Ordering::Equal)
            ))),
            BinaryOperator::Equal => {
                Ok(Value::Bool(self.compare(op, rhs)? == Some(Ordering::Equal)))
            }
            BinaryOperator::NotEqual => {
                Ok(Value::Bool(self.compare(op, rhs)? != Some(Ordering::Equal)))
            }
        }
    }

    fn add(&self, rhs: &Value) -> Result<Value, ValueError> {
        if let (Value::Str(left), Value::Str(right)) = (self, rhs) {
            return Ok(Value::Str(format!("{left}{right}")));
        }
        self.arithmetic(BinaryOperator::Add, rhs, i64::checked_add, |a, b| a + b)
    }

    fn arithmetic(
        &self,
        op: BinaryOperator,
        rhs: &Value,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value, ValueError> {
        if let (Value::Int(left), Value::Int(right)) = (self, rhs) {
            return int_op(*left, *right)
                .map(Value::Int)
                .ok_or(ValueError::IntegerOverflow { op: op.symbol() });
        }
        match (self.as_f64(), rhs.as_f64()) {
            (Some(left), Some(right)) => Ok(Value::Float(float_op(left, right))),
            _ => Err(self.incompatible(op, rhs)),
        }
    }

    /// `/` always yields a real.
    fn divide(&self, rhs: &Value) -> Result<Value, ValueError> {
        let (Some(left), Some(right)) = (self.as_f64(), rhs.as_f64()) else {
            return Err(self.incompatible(BinaryOperator::Div, rhs));
        };
        if right == 0.0 {
            return Err(ValueError::DivisionByZero);
        }
        Ok(Value::Float(left / right))
    }

    /// `None` only for unordered floats (NaN).
    fn compare(&self, op: BinaryOperator, rhs: &Value) -> Result<Option<Ordering>, ValueError> {
        match (self, rhs) {
            (Value::Int(left), Value::Int(right)) => Ok(Some(left.cmp(right))),
            (Value::Str(left), Value::Str(right)) => Ok(Some(left.cmp(right))),
            (Value::Bool(left), Value::Bool(right)) => Ok(Some(left.cmp(right))),
            _ => match (self.as_f64(), rhs.as_f64()) {
                (Some(left), Some(right)) => Ok(left.partial_cmp(&right)),
                _ => Err(self.incompatible(op, rhs)),
            },
        }
    }

    fn incompatible(&self, op: BinaryOperator, rhs: &Value) -> ValueError {
        ValueError::IncompatibleOperands {
            op: op.symbol(),
            left: self.type_name(),
            right: rhs.type_name(),
        }
    }
}
