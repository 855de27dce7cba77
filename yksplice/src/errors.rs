//! Errors that can occur when splicing a trace into a program.

use thiserror::Error;

/// A failure to splice a trace into a program.
///
/// Any of these aborts the splice as a whole: nothing is partially applied.
#[derive(Error, Debug, PartialEq)]
pub enum SpliceError {
    #[error("malformed trace: {0}")]
    /// The trace is missing required fields or has an empty instruction sequence.
    MalformedTrace(String),
    #[error("function {0} not found in program")]
    /// No function in the program has the trace's owner name.
    FunctionNotFound(String),
    #[error("function {func} has a malformed body: {reason}")]
    /// The target function's instruction sequence is not a well-formed instruction sequence.
    MalformedFunctionBody { func: String, reason: String },
    #[error("label {label} already exists in function {func}")]
    /// A label the splice needs to introduce is already defined in the target function.
    LabelCollision { func: String, label: String },
    #[error("malformed program: {0}")]
    /// The program is missing its function list or a function is missing its name.
    MalformedProgram(String),
}
