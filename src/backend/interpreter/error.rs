use thiserror::Error;

use crate::ast::TypeTag;
use crate::symbols::SymbolError;
use crate::value::ValueError;

/// Typed errors produced by the tree-walking interpreter backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpreterError {
    #[error("Variable '{name}' is not defined")]
    NotDefined { name: String },
    #[error("Variable '{name}' is not declared")]
    NotDeclared { name: String },
    #[error("Function '{name}' is not defined")]
    UndefinedFunction { name: String },
    #[error("Variable {name} must be of type {expected}")]
    TypeMismatch { name: String, expected: TypeTag },
    #[error("Function '{function}' must return {expected}, got {found}")]
    ReturnTypeMismatch {
        function: String,
        expected: TypeTag,
        found: &'static str,
    },
    #[error("'{name}' is not an array")]
    NotAnArray { name: String },
    #[error("Array index must be an integer, got {found}")]
    InvalidIndex { found: &'static str },
    #[error("Index {index} out of bounds for array '{name}' of length {len}")]
    IndexOutOfBounds { name: String, index: i64, len: usize },
    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Return outside of function")]
    ReturnOutsideFunction,
    #[error("Maximum call depth of {limit} exceeded")]
    CallDepthExceeded { limit: usize },
    #[error(transparent)]
    Declaration(#[from] SymbolError),
    #[error(transparent)]
    Value(#[from] ValueError),
}
