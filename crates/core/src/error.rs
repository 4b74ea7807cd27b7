use thiserror::Error;

use crate::model::{ExamConfigError, ExamError, ExamResultError, QuestionError, UnknownModeError};
use crate::session_clock::ClockError;

/// Umbrella error for callers that do not care which domain rule failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Exam(#[from] ExamError),
    #[error(transparent)]
    ExamConfig(#[from] ExamConfigError),
    #[error(transparent)]
    ExamResult(#[from] ExamResultError),
    #[error(transparent)]
    UnknownMode(#[from] UnknownModeError),
    #[error(transparent)]
    Clock(#[from] ClockError),
}
