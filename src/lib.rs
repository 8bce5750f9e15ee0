//! Rexi: lexer, parser, tree-walking interpreter and three-address code
//! generator for a small statically-tagged scripting language.

use serde::Serialize;

pub mod ast;
pub mod backend;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod symbols;
pub mod token;
pub mod value;

pub use backend::interpreter::{Interpretation, Interpreter, InterpreterConfig};
pub use backend::ir::{CodeGenerator, Instruction};
pub use error::{CompilationError, Error};

/// Lexes, parses and runs `source` with the default interpreter settings.
pub fn interpret(source: &str) -> Result<Interpretation, Error> {
    interpret_with_config(source, InterpreterConfig::default())
}

pub fn interpret_with_config(
    source: &str,
    config: InterpreterConfig,
) -> Result<Interpretation, Error> {
    let program = parser::parse(source)?;
    Ok(Interpreter::with_config(config).interpret(&program)?)
}

/// Lowers `source` to quadruples without running it.
pub fn compile(source: &str) -> Result<Vec<Instruction>, CompilationError> {
    let program = parser::parse(source)?;
    Ok(CodeGenerator::new().generate(&program))
}

/// Serializable outcome of [`interpret`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    Success(Interpretation),
    Failure { error: String },
}

impl From<Result<Interpretation, Error>> for Report {
    fn from(result: Result<Interpretation, Error>) -> Self {
        match result {
            Ok(interpretation) => Report::Success(interpretation),
            Err(error) => Report::Failure {
                error: error.to_string(),
            },
        }
    }
}
