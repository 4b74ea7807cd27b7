use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use exam_core::model::{
    AnswerValue, Exam, ExamConfig, ExamId, ExamResult, QuestionId, QuestionOption,
};

use crate::config::ApiConfig;
use crate::http::HttpBackend;
use crate::identity::SessionIdentity;
use crate::memory::InMemoryBackend;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Errors surfaced by backend adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("backend sent invalid data: {0}")]
    Invalid(#[from] exam_core::Error),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    /// Whether retrying the same request may succeed (timeouts, connection drops, 5xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Timeout | ApiError::Connection(_) | ApiError::Unavailable(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ApiError::Connection(err.to_string())
        }
    }
}

//
// ─── BOUNDARY SHAPES ───────────────────────────────────────────────────────────
//

/// Ground truth for one question, already normalized to an index list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleAnswer {
    pub correct_answer: Vec<usize>,
    pub explanation: Option<String>,
}

/// State handed to pause persistence on save-and-exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseSnapshot {
    pub current_index: usize,
    pub remaining_seconds: u32,
    pub answers: BTreeMap<QuestionId, AnswerValue>,
    pub marked: Vec<QuestionId>,
    pub checked: Vec<QuestionId>,
}

/// Result of the backend health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHealth {
    pub available: bool,
    pub status: String,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Creates, hydrates and cancels exams.
#[async_trait]
pub trait ExamProvider: Send + Sync {
    /// Create an exam for the user's selection.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the backend rejects the request or is unreachable.
    async fn create_exam(&self, config: &ExamConfig) -> Result<Exam, ApiError>;

    /// Start an exam and return it with its question list.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for unknown exams, or other backend errors.
    async fn start_exam(&self, exam_id: ExamId) -> Result<Exam, ApiError>;

    /// Cancel an exam the user walked away from.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on backend failures.
    async fn cancel_exam(&self, exam_id: ExamId) -> Result<(), ApiError>;
}

#[async_trait]
pub trait AnswerSink: Send + Sync {
    /// Record the current answer for a question.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on backend failures.
    async fn submit_answer(
        &self,
        exam_id: ExamId,
        question_id: QuestionId,
        answer: &AnswerValue,
    ) -> Result<(), ApiError>;
}

#[async_trait]
pub trait AnswerOracle: Send + Sync {
    /// Fetch the correct answer and explanation for a question.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on backend failures.
    async fn correct_answer(&self, question_id: QuestionId) -> Result<OracleAnswer, ApiError>;
}

#[async_trait]
pub trait GradingService: Send + Sync {
    /// Close the exam for grading.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on backend failures.
    async fn complete_exam(&self, exam_id: ExamId) -> Result<(), ApiError>;

    /// Fetch the graded result of a completed exam.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on backend failures or malformed results.
    async fn results(&self, exam_id: ExamId) -> Result<ExamResult, ApiError>;
}

#[async_trait]
pub trait QuestionProvider: Send + Sync {
    /// Load the option list of a question.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on backend failures.
    async fn question_options(&self, question_id: QuestionId)
    -> Result<Vec<QuestionOption>, ApiError>;
}

#[async_trait]
pub trait PausePersistence: Send + Sync {
    /// Persist an unfinished session so the user can come back to it.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on backend failures.
    async fn pause_exam(&self, exam_id: ExamId, snapshot: &PauseSnapshot) -> Result<(), ApiError>;
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// All backend collaborators behind trait objects for easy adapter swapping.
///
/// `pauses` is `None` for anonymous sessions, which cannot be saved.
#[derive(Clone)]
pub struct Backend {
    pub exams: Arc<dyn ExamProvider>,
    pub answers: Arc<dyn AnswerSink>,
    pub oracle: Arc<dyn AnswerOracle>,
    pub grading: Arc<dyn GradingService>,
    pub questions: Arc<dyn QuestionProvider>,
    pub pauses: Option<Arc<dyn PausePersistence>>,
}

impl Backend {
    /// Wire every contract to one in-memory backend.
    #[must_use]
    pub fn in_memory(repo: &InMemoryBackend) -> Self {
        Self {
            exams: Arc::new(repo.clone()),
            answers: Arc::new(repo.clone()),
            oracle: Arc::new(repo.clone()),
            grading: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            pauses: Some(Arc::new(repo.clone())),
        }
    }

    /// Wire every contract to the REST backend.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Connection` if the HTTP client cannot be built.
    pub fn http(config: ApiConfig, identity: SessionIdentity) -> Result<Self, ApiError> {
        let http = HttpBackend::new(config, identity)?;
        Ok(Self::from_http(&Arc::new(http)))
    }

    /// Share an existing REST adapter across every contract.
    #[must_use]
    pub fn from_http(http: &Arc<HttpBackend>) -> Self {
        let pauses: Option<Arc<dyn PausePersistence>> = if http.identity().is_authenticated() {
            Some(http.clone())
        } else {
            None
        };

        Self {
            exams: http.clone(),
            answers: http.clone(),
            oracle: http.clone(),
            grading: http.clone(),
            questions: http.clone(),
            pauses,
        }
    }

    /// Drop pause persistence, e.g. for a guest session on a shared backend.
    #[must_use]
    pub fn without_pause_persistence(mut self) -> Self {
        self.pauses = None;
        self
    }
}
