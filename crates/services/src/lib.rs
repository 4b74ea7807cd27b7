#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod retry;
pub mod sessions;

pub use exam_core::Clock;
pub use sessions as session;

pub use app_services::AppServices;
pub use error::{AppServicesError, SessionError};
pub use retry::RetryConfig;

pub use sessions::{
    AnswerChange, ExamSessionController, ExamSessionService, ResultStatus, ReviewPayload,
    SessionAnswerResult, SessionProgress, SessionState, SharedSession, TickOutcome,
};
