//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;

/// Errors emitted by quiz sessions and the services that drive them.
///
/// Every variant except `Submission` and `Storage` is returned before any
/// state change, so the session is left exactly as it was.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("quiz has no questions")]
    InvalidQuiz,
    #[error("attempt duration must be at least one second")]
    InvalidDuration,
    #[error("no answer selected for question {index}")]
    NoAnswerSelected { index: usize },
    #[error("answer for question {index} is not locked in")]
    NotLocked { index: usize },
    #[error("option {option} does not exist (question has {len} options)")]
    OptionOutOfRange { option: usize, len: usize },
    #[error("attempt already completed")]
    Completed,
    #[error("attempt is still in progress")]
    NotCompleted,
    #[error("result submission failed: {0}")]
    Submission(#[source] StorageError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
