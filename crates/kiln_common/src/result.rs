//! Common result and error types for the kiln middle-end.

/// The standard result type for operations that can only fail through a bug.
///
/// `Err` indicates an internal consistency violation (a defect in kiln), not
/// a problem with the input design. Input problems are reported through the
/// per-crate error enums and a `DiagnosticSink`.
pub type KilnResult<T> = Result<T, InternalError>;

/// An internal compiler error indicating a defect in kiln, not a user input problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("internal compiler error: {message}")]
pub struct InternalError {
    /// Description of the violated invariant.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
