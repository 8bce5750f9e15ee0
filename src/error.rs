use thiserror::Error;

use crate::backend::interpreter::InterpreterError;
use crate::lexer::LexError;
use crate::parser::ParseError;

/// Everything [`crate::interpret`] can fail with, one variant per stage.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(ParseError),
    #[error(transparent)]
    Runtime(#[from] InterpreterError),
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        // The parser pulls tokens lazily, so lexing failures arrive wrapped.
        match error {
            ParseError::Lex(error) => Error::Lex(error),
            other => Error::Parse(other),
        }
    }
}

/// Front-end failure reported by [`crate::compile`].
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Compilation error: {0}")]
pub struct CompilationError(#[from] pub ParseError);
