use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::answer::AnswerValue;
use crate::model::ids::QuestionId;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ExamResultError {
    #[error("score must be a percentage in 0..=100, got {0}")]
    InvalidScore(f64),

    #[error("total questions ({total}) does not match answer counts ({sum})")]
    CountMismatch { total: u32, sum: u32 },
}

/// Aggregated counts of a graded exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExamStatistics {
    pub total_questions: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub unanswered: u32,
}

impl ExamStatistics {
    /// Derive `unanswered` from the other counts.
    #[must_use]
    pub fn from_counts(total_questions: u32, correct: u32, incorrect: u32) -> Self {
        Self {
            total_questions,
            correct,
            incorrect,
            unanswered: total_questions.saturating_sub(correct.saturating_add(incorrect)),
        }
    }
}

/// Grading outcome for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub is_correct: Option<bool>,
    pub correct_answer: Option<AnswerValue>,
    pub explanation: Option<String>,
}

/// Final grading of an exam session, produced once by the grading service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    score: f64,
    passed: bool,
    time_spent_seconds: u32,
    statistics: ExamStatistics,
    question_results: Vec<QuestionResult>,
}

impl ExamResult {
    /// Assemble a result, checking score range and count consistency.
    ///
    /// # Errors
    ///
    /// Returns `ExamResultError::InvalidScore` for scores outside `0..=100` and
    /// `ExamResultError::CountMismatch` if the statistics do not add up.
    pub fn new(
        score: f64,
        passed: bool,
        time_spent_seconds: u32,
        statistics: ExamStatistics,
        question_results: Vec<QuestionResult>,
    ) -> Result<Self, ExamResultError> {
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(ExamResultError::InvalidScore(score));
        }
        let sum = statistics
            .correct
            .saturating_add(statistics.incorrect)
            .saturating_add(statistics.unanswered);
        if sum != statistics.total_questions {
            return Err(ExamResultError::CountMismatch {
                total: statistics.total_questions,
                sum,
            });
        }

        Ok(Self {
            score,
            passed,
            time_spent_seconds,
            statistics,
            question_results,
        })
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    #[must_use]
    pub fn time_spent_seconds(&self) -> u32 {
        self.time_spent_seconds
    }

    #[must_use]
    pub fn statistics(&self) -> ExamStatistics {
        self.statistics
    }

    #[must_use]
    pub fn question_results(&self) -> &[QuestionResult] {
        &self.question_results
    }

    #[must_use]
    pub fn question_result(&self, id: QuestionId) -> Option<&QuestionResult> {
        self.question_results.iter().find(|r| r.question_id == id)
    }
}
