//! Error taxonomy for the evaluation core.
//!
//! Lock contention is not an error (it surfaces as `None` or
//! [`crate::EvalAttempt::Contended`]) and domain failures are stored as data in
//! [`crate::EvalRecord::error`]. What remains are infrastructure failures.

/// Errors produced by evaluation states.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// The state was closed while an evaluation still held its token.
    #[error("evaluation state {id} closed while an evaluation was in progress")]
    EvaluationInProgress { id: String },
}

/// Result type for evaluation core operations.
pub type Result<T> = std::result::Result<T, EvalError>;
