pub mod cli;
pub use cli::Command;

use crate::codegen::{self, CodegenError, EvalError, Machine, Unit};
use crate::sem::{self, SemanticError};
use crate::syntax::{ParseError, Parser, Tokenizer};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error(transparent)]
    InputSourceError(#[from] io::Error),

    #[error(transparent)]
    ParseError(#[from] ParseError),

    #[error(transparent)]
    SemanticError(#[from] SemanticError),

    #[error(transparent)]
    CodegenError(#[from] CodegenError),

    #[error(transparent)]
    EvalError(#[from] EvalError),
}

impl From<String> for CompilerError {
    fn from(message: String) -> Self {
        CompilerError::InvalidOption(message)
    }
}

/// Parses, analyzes and compiles a source text into units named under
/// `name`. Every pass runs to completion before the next starts; the
/// first error aborts the pipeline.
pub fn compile<S: AsRef<str>>(src: S, name: &str) -> Result<Vec<Unit>, CompilerError> {
    let mut tokenizer = Tokenizer::from_string(src.as_ref());
    let program = Parser::new().parse(&mut tokenizer)?;

    sem::analyze(&program)?;

    let units = codegen::compile(&program, name)?;
    Ok(units)
}

/// Compiles and executes a source text, returning the printed lines.
pub fn run<S: AsRef<str>>(src: S) -> Result<Vec<String>, CompilerError> {
    let units = compile(src, "Main")?;
    let mut machine = Machine::new();

    machine.run(&units)?;
    Ok(machine.into_output())
}
