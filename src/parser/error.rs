use thiserror::Error;

use crate::lexer::LexError;
use crate::value::MAX_ARRAY_LEN;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Syntax error: expected {expected}, found {found} at line {line}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
    },
    #[error("Syntax error: expected {expected}, found end of input")]
    UnexpectedEof { expected: String },
    #[error(
        "Syntax error: array size must be an integer from 0 to {max}, found {found} at line {line}",
        max = MAX_ARRAY_LEN
    )]
    InvalidArraySize { found: String, line: usize },
    #[error("Syntax error: nesting deeper than {limit} levels at line {line}")]
    NestingTooDeep { limit: usize, line: usize },
    #[error(transparent)]
    Lex(#[from] LexError),
}

pub type ParseResult<T> = Result<T, ParseError>;
