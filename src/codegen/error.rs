//! Code generation error type.

use std::fmt;

/// Errors raised while lowering an optimised IR program to MIPS text.
///
/// These are internal-invariant violations, not user-facing mistakes, by
/// the time codegen runs, lexing/parsing/semantic analysis have already
/// rejected anything wrong with the source program.
#[derive(Debug)]
pub enum CodegenError {
    /// A 32-bit two's-complement integer literal didn't fit after parsing
    /// (lexing accepts an unbounded digit run; codegen is where it's
    /// finally narrowed to `i32`).
    IntegerOutOfRange(String),
    /// An internal invariant the rest of the pipeline is supposed to
    /// guarantee turned out false (e.g. a dispatch target with no
    /// corresponding `Proc`).
    Invariant(String),
    /// Writing into the in-memory assembly buffer failed.
    Format(fmt::Error),
}

impl CodegenError {
    /// Stable diagnostic code, matching the `E04xx` family used by the
    /// other stages. Codegen errors don't carry a source `Span`, the IR is
    /// deliberately span-erased (see `ir` module docs), and by this point
    /// reaching one at all means an earlier stage's invariant broke, not
    /// that the user's program is at fault.
    pub fn code(&self) -> &'static str {
        match self {
            CodegenError::IntegerOutOfRange(_) => "E0401",
            CodegenError::Invariant(_) => "E0402",
            CodegenError::Format(_) => "E0403",
        }
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenError::IntegerOutOfRange(lit) => {
                write!(f, "integer literal `{lit}` does not fit in a 32-bit Int")
            }
            CodegenError::Invariant(msg) => write!(f, "internal codegen invariant violated: {msg}"),
            CodegenError::Format(e) => write!(f, "assembly buffer write failed: {e}"),
        }
    }
}

impl std::error::Error for CodegenError {}

impl From<fmt::Error> for CodegenError {
    fn from(e: fmt::Error) -> Self {
        CodegenError::Format(e)
    }
}
