//! Shared error types for the services crate.

use thiserror::Error;

use backend::{ApiError, ConfigError};
use exam_core::ClockError;
use exam_core::model::{ExamConfigError, ExamError, QuestionId};

use crate::sessions::SessionState;

/// Errors emitted by the exam session controller and service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("exam has no questions")]
    Empty,
    #[error("no failed questions to practise")]
    NoFailedQuestions,
    #[error("session has no exam loaded")]
    NotInitialized,
    #[error("cannot {action} while session is {state}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },
    #[error("session is not active (state: {0})")]
    NotActive(SessionState),
    #[error("session is paused")]
    Paused,
    #[error("session is not completed")]
    NotCompleted,
    #[error("unknown question {0}")]
    UnknownQuestion(QuestionId),
    #[error("option {index} out of range for question {question_id} ({len} options)")]
    OptionOutOfRange {
        question_id: QuestionId,
        index: usize,
        len: usize,
    },
    #[error("question index {index} out of range (0..{len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{0} is not allowed in this exam mode")]
    CapabilityDenied(&'static str),
    #[error("this session cannot be saved for later")]
    SaveNotAllowed,
    #[error("session was closed")]
    Closed,
    #[error(transparent)]
    Config(#[from] ExamConfigError),
    #[error(transparent)]
    Exam(#[from] ExamError),
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
}
