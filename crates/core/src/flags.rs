use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AnswerValue, CheckSource, CheckedAnswer, Correctness, Question, QuestionId};

/// Marked-for-review and checked state per question.
///
/// Checked data is cached for the whole session and never invalidated: the first
/// stored correct answer and explanation win.
#[derive(Debug, Clone, Default)]
pub struct ReviewFlagRegistry {
    marked: BTreeSet<QuestionId>,
    checked: BTreeMap<QuestionId, CheckedAnswer>,
    in_flight: BTreeSet<QuestionId>,
}

impl ReviewFlagRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the marked-for-review flag and return the new value.
    pub fn toggle_mark(&mut self, question_id: QuestionId) -> bool {
        if self.marked.remove(&question_id) {
            false
        } else {
            self.marked.insert(question_id);
            true
        }
    }

    /// Reserve a check for `question_id`.
    ///
    /// Returns `false` if the question is already checked or a check is in flight,
    /// so callers never issue a second oracle request for the same question.
    pub fn begin_check(&mut self, question_id: QuestionId) -> bool {
        if self.checked.contains_key(&question_id) {
            return false;
        }
        self.in_flight.insert(question_id)
    }

    /// Release a reservation without storing anything.
    pub fn abort_check(&mut self, question_id: QuestionId) {
        self.in_flight.remove(&question_id);
    }

    /// Store the oracle's answer. Returns `false` if the question was already checked.
    pub fn check(
        &mut self,
        question: &Question,
        correct_indices: &[usize],
        explanation: impl Into<String>,
    ) -> bool {
        let correct_answer = AnswerValue::normalized(question, correct_indices);
        self.store(
            question.id(),
            CheckedAnswer {
                correct_answer,
                explanation: explanation.into(),
                source: CheckSource::Oracle,
            },
        )
    }

    /// Mark a question checked without a known correct answer.
    pub fn check_unknown(&mut self, question_id: QuestionId, explanation: impl Into<String>) -> bool {
        self.store(
            question_id,
            CheckedAnswer {
                correct_answer: None,
                explanation: explanation.into(),
                source: CheckSource::Fallback,
            },
        )
    }

    fn store(&mut self, question_id: QuestionId, answer: CheckedAnswer) -> bool {
        self.in_flight.remove(&question_id);
        if self.checked.contains_key(&question_id) {
            return false;
        }
        self.checked.insert(question_id, answer);
        true
    }

    #[must_use]
    pub fn is_checked(&self, question_id: QuestionId) -> bool {
        self.checked.contains_key(&question_id)
    }

    #[must_use]
    pub fn is_marked(&self, question_id: QuestionId) -> bool {
        self.marked.contains(&question_id)
    }

    #[must_use]
    pub fn is_pending(&self, question_id: QuestionId) -> bool {
        self.in_flight.contains(&question_id)
    }

    #[must_use]
    pub fn checked(&self, question_id: QuestionId) -> Option<&CheckedAnswer> {
        self.checked.get(&question_id)
    }

    /// Compare a user answer with the checked correct answer.
    #[must_use]
    pub fn is_correct(&self, question_id: QuestionId, user_answer: Option<&AnswerValue>) -> Correctness {
        let Some(user_answer) = user_answer else {
            return Correctness::Unknown;
        };
        let Some(correct) = self
            .checked
            .get(&question_id)
            .and_then(|c| c.correct_answer.as_ref())
        else {
            return Correctness::Unknown;
        };
        if user_answer.matches(correct) {
            Correctness::Correct
        } else {
            Correctness::Incorrect
        }
    }

    #[must_use]
    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }

    #[must_use]
    pub fn checked_count(&self) -> usize {
        self.checked.len()
    }

    #[must_use]
    pub fn marked_ids(&self) -> Vec<QuestionId> {
        self.marked.iter().copied().collect()
    }

    #[must_use]
    pub fn checked_ids(&self) -> Vec<QuestionId> {
        self.checked.keys().copied().collect()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
