use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{ExamId, QuestionId};
use crate::model::question::{Question, QuestionError, QuestionOption};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Raised when a mode name is not one of the supported exam modes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown exam mode: {0}")]
pub struct UnknownModeError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error("passing score must be in 0..=100, got {0}")]
    InvalidPassingScore(u32),

    #[error("unknown question: {0}")]
    UnknownQuestion(QuestionId),

    #[error(transparent)]
    Question(#[from] QuestionError),
}

/// Validation failures for a session-creation request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamConfigError {
    #[error("provider is required")]
    MissingProvider,

    #[error("certification is required")]
    MissingCertification,

    #[error("question count must be > 0")]
    InvalidQuestionCount,

    #[error("time limit must be > 0 minutes")]
    InvalidTimeLimit,
}

//
// ─── MODE ──────────────────────────────────────────────────────────────────────
//

/// Policy bundle a session runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamMode {
    /// Pausable, answers can be verified one by one.
    #[default]
    Practice,
    /// Mirrors the real exam: strict timer, no verification.
    Realistic,
    /// Retry of questions the user previously failed.
    FailedQuestions,
}

impl ExamMode {
    /// Wire name of the mode (`practice`, `realistic`, `failed_questions`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExamMode::Practice => "practice",
            ExamMode::Realistic => "realistic",
            ExamMode::FailedQuestions => "failed_questions",
        }
    }

    /// Human-readable label for summaries.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            ExamMode::Practice => "Practice",
            ExamMode::Realistic => "Realistic exam",
            ExamMode::FailedQuestions => "Failed questions",
        }
    }
}

impl fmt::Display for ExamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "practice" => Ok(ExamMode::Practice),
            "realistic" => Ok(ExamMode::Realistic),
            "failed_questions" => Ok(ExamMode::FailedQuestions),
            other => Err(UnknownModeError(other.to_owned())),
        }
    }
}

//
// ─── EXAM ──────────────────────────────────────────────────────────────────────
//

pub const DEFAULT_PASSING_SCORE: u32 = 70;

/// A hydrated exam as handed out by the exam provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    id: ExamId,
    title: String,
    provider: String,
    certification: String,
    questions: Vec<Question>,
    time_limit_seconds: u32,
    passing_score: u32,
    mode: ExamMode,
}

impl Exam {
    #[must_use]
    pub fn new(
        id: ExamId,
        mode: ExamMode,
        questions: Vec<Question>,
        time_limit_seconds: u32,
    ) -> Self {
        Self {
            id,
            title: String::new(),
            provider: String::new(),
            certification: String::new(),
            questions,
            time_limit_seconds,
            passing_score: DEFAULT_PASSING_SCORE,
            mode,
        }
    }

    /// Attach provider and certification; the title defaults to `provider - certification`.
    #[must_use]
    pub fn with_certification(
        mut self,
        provider: impl Into<String>,
        certification: impl Into<String>,
    ) -> Self {
        self.provider = provider.into();
        self.certification = certification.into();
        if self.title.is_empty() {
            self.title = format!("{} - {}", self.provider, self.certification);
        }
        self
    }

    /// Override the mode, e.g. when the provider echoes an exam without one.
    #[must_use]
    pub fn with_mode(mut self, mode: ExamMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Override the passing score (percent).
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidPassingScore` if the score is above 100.
    pub fn with_passing_score(mut self, passing_score: u32) -> Result<Self, ExamError> {
        if passing_score > 100 {
            return Err(ExamError::InvalidPassingScore(passing_score));
        }
        self.passing_score = passing_score;
        Ok(self)
    }

    #[must_use]
    pub fn id(&self) -> ExamId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn certification(&self) -> &str {
        &self.certification
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn question_at(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_seconds
    }

    #[must_use]
    pub fn passing_score(&self) -> u32 {
        self.passing_score
    }

    #[must_use]
    pub fn mode(&self) -> ExamMode {
        self.mode
    }

    /// Backfill options of a question that was delivered without them.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::UnknownQuestion` for ids outside this exam and
    /// propagates `QuestionError::OptionsAlreadyLoaded`.
    pub fn backfill_options(
        &mut self,
        id: QuestionId,
        options: Vec<QuestionOption>,
    ) -> Result<(), ExamError> {
        let question = self
            .questions
            .iter_mut()
            .find(|q| q.id() == id)
            .ok_or(ExamError::UnknownQuestion(id))?;
        question.backfill_options(options)?;
        Ok(())
    }
}

//
// ─── SESSION CREATION REQUEST ──────────────────────────────────────────────────
//

pub const DEFAULT_QUESTION_COUNT: u32 = 20;
pub const DEFAULT_TIME_LIMIT_MINUTES: u32 = 60;

/// Presentation toggles forwarded to the exam provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSettings {
    pub randomize_questions: bool,
    pub randomize_answers: bool,
    pub show_explanations: bool,
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self {
            randomize_questions: true,
            randomize_answers: false,
            show_explanations: true,
        }
    }
}

/// What the user picked on the landing page: provider, certification and mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamConfig {
    pub provider: String,
    pub certification: String,
    pub mode: ExamMode,
    pub question_count: Option<u32>,
    pub time_limit_minutes: Option<u32>,
    pub difficulty: Option<String>,
    pub category: Option<String>,
    pub settings: ExamSettings,
}

impl ExamConfig {
    #[must_use]
    pub fn new(provider: impl Into<String>, certification: impl Into<String>, mode: ExamMode) -> Self {
        Self {
            provider: provider.into(),
            certification: certification.into(),
            mode,
            question_count: None,
            time_limit_minutes: None,
            difficulty: None,
            category: None,
            settings: ExamSettings::default(),
        }
    }

    #[must_use]
    pub fn with_question_count(mut self, count: u32) -> Self {
        self.question_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_time_limit_minutes(mut self, minutes: u32) -> Self {
        self.time_limit_minutes = Some(minutes);
        self
    }

    /// Question count sent to the provider, falling back to the product default.
    #[must_use]
    pub fn effective_question_count(&self) -> u32 {
        self.question_count.unwrap_or(DEFAULT_QUESTION_COUNT)
    }

    #[must_use]
    pub fn effective_time_limit_minutes(&self) -> u32 {
        self.time_limit_minutes.unwrap_or(DEFAULT_TIME_LIMIT_MINUTES)
    }

    /// Check the request before it reaches the provider.
    ///
    /// # Errors
    ///
    /// Returns `ExamConfigError` for blank provider/certification or zero limits.
    pub fn validate(&self) -> Result<(), ExamConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ExamConfigError::MissingProvider);
        }
        if self.certification.trim().is_empty() {
            return Err(ExamConfigError::MissingCertification);
        }
        if self.question_count == Some(0) {
            return Err(ExamConfigError::InvalidQuestionCount);
        }
        if self.time_limit_minutes == Some(0) {
            return Err(ExamConfigError::InvalidTimeLimit);
        }
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
