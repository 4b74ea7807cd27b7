use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("expected answers must be >= 1")]
    InvalidExpectedAnswers,

    #[error("options already loaded for question {0}")]
    OptionsAlreadyLoaded(QuestionId),
}

//
// ─── OPTIONS ───────────────────────────────────────────────────────────────────
//

/// One selectable answer of a question, e.g. `A` / `Use an S3 bucket policy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    pub text: String,
}

impl QuestionOption {
    #[must_use]
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }

    /// Letter label for a zero-based option index: `A`..`Z`, then `27`, `28`, ...
    #[must_use]
    pub fn label_for(index: usize) -> String {
        u8::try_from(index)
            .ok()
            .filter(|i| *i < 26)
            .map_or_else(|| (index + 1).to_string(), |i| char::from(b'A' + i).to_string())
    }

    /// Stand-in for an option whose text never arrived, e.g. `A` / `Option A`.
    #[must_use]
    pub fn placeholder(index: usize) -> Self {
        let label = Self::label_for(index);
        let text = format!("Option {label}");
        Self { label, text }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single- or multi-choice exam question.
///
/// Questions are immutable once loaded. The only permitted mutation is
/// [`Question::backfill_options`], for providers that hand out questions without
/// their option list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<QuestionOption>,
    category: String,
    difficulty: String,
    is_multiple_choice: bool,
    expected_answers: u32,
}

impl Question {
    /// Create a single-choice question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyText` if the text is blank.
    pub fn single_choice(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<QuestionOption>,
    ) -> Result<Self, QuestionError> {
        Self::new(id, text, options, false, 1)
    }

    /// Create a multi-choice question expecting `expected_answers` selections.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyText` if the text is blank and
    /// `QuestionError::InvalidExpectedAnswers` if `expected_answers` is 0.
    pub fn multiple_choice(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<QuestionOption>,
        expected_answers: u32,
    ) -> Result<Self, QuestionError> {
        Self::new(id, text, options, true, expected_answers)
    }

    /// Create a question with explicit choice semantics.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the text is blank or `expected_answers` is 0.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<QuestionOption>,
        is_multiple_choice: bool,
        expected_answers: u32,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if expected_answers == 0 {
            return Err(QuestionError::InvalidExpectedAnswers);
        }

        Ok(Self {
            id,
            text,
            options,
            category: "General".to_owned(),
            difficulty: "Medium".to_owned(),
            is_multiple_choice,
            expected_answers,
        })
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = difficulty.into();
        self
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[QuestionOption] {
        &self.options
    }

    #[must_use]
    pub fn has_options(&self) -> bool {
        !self.options.is_empty()
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn difficulty(&self) -> &str {
        &self.difficulty
    }

    #[must_use]
    pub fn is_multiple_choice(&self) -> bool {
        self.is_multiple_choice
    }

    /// Number of selections a complete answer needs (always 1 for single-choice).
    #[must_use]
    pub fn expected_answers(&self) -> u32 {
        self.expected_answers
    }

    /// Fill in options for a question that was loaded without them.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::OptionsAlreadyLoaded` if the question already has options.
    pub fn backfill_options(&mut self, options: Vec<QuestionOption>) -> Result<(), QuestionError> {
        if self.has_options() {
            return Err(QuestionError::OptionsAlreadyLoaded(self.id));
        }
        self.options = options;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
