//! Compile-time error type.

use thiserror::Error;

use crate::bytecode::chunk::JumpOutOfRange;

/// A semantic error raised during type walking or bytecode emission.
///
/// A single flat kind: the message carries everything. Errors unwind the
/// whole compile; no partial chunk survives one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CompileError {
    message: String,
}

impl CompileError {
    /// Build an error from a preformatted message.
    pub fn new(message: impl Into<String>) -> CompileError {
        CompileError {
            message: message.into(),
        }
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<JumpOutOfRange> for CompileError {
    fn from(_: JumpOutOfRange) -> CompileError {
        CompileError::new("Jump displacement out of signed 16-bit range")
    }
}

/// Result alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
