//! Errors for reading instruction scripts

use thiserror::Error;

/// Result type for parsing
pub type Result<T> = std::result::Result<T, ParseError>;

/// A script line that is not a valid instruction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: unknown instruction '{text}'")]
    UnknownInstruction { line: usize, text: String },

    #[error("line {line}: malformed instruction '{text}'")]
    Malformed { line: usize, text: String },

    #[error("line {line}: expected {expected} argument(s) in '{text}'")]
    Arity {
        line: usize,
        text: String,
        expected: usize,
    },

    #[error("line {line}: {reason}")]
    InvalidArgument { line: usize, reason: String },
}

impl ParseError {
    /// Line number (1-based) the error refers to
    pub fn line(&self) -> usize {
        match self {
            ParseError::UnknownInstruction { line, .. }
            | ParseError::Malformed { line, .. }
            | ParseError::Arity { line, .. }
            | ParseError::InvalidArgument { line, .. } => *line,
        }
    }
}
