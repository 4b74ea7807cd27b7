mod controller;
mod progress;
mod queries;
mod review;
mod submissions;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{
    AnswerChange, CheckTicket, CompletionTicket, EXPLANATION_UNAVAILABLE, ExamSessionController,
    FAILED_QUESTION_SECONDS, FAILED_QUESTIONS_MIN_SECONDS, NO_EXPLANATION, ResultStatus,
    SessionContext, SessionState, TickOutcome, session_duration,
};
pub use progress::SessionProgress;
pub use review::{FailedQuestionsProgress, ReviewPayload, ReviewQuestion};
pub use workflow::{ExamSessionService, SessionAnswerResult, SharedSession, lock_session};
