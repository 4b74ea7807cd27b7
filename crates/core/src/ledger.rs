use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::{AnswerValue, Question, QuestionId};

/// The user's selections per question.
///
/// Absence of an entry means "unanswered"; there is no default value.
#[derive(Debug, Clone, Default)]
pub struct AnswerLedger {
    answers: HashMap<QuestionId, AnswerValue>,
    locked: HashSet<QuestionId>,
}

impl AnswerLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a click on `option_index` of `question`.
    ///
    /// Single-choice overwrites. Multi-choice toggles membership; a selection that
    /// would exceed `expected_answers` replaces the whole set with the new option
    /// (last selection wins). Removing the last selected option clears the answer.
    ///
    /// Returns `false` without touching anything when the question is locked.
    pub fn select(&mut self, question: &Question, option_index: usize) -> bool {
        let id = question.id();
        if self.locked.contains(&id) {
            return false;
        }

        if !question.is_multiple_choice() {
            self.answers.insert(id, AnswerValue::Single(option_index));
            return true;
        }

        let mut set = match self.answers.remove(&id) {
            Some(AnswerValue::Multiple(set)) => set,
            Some(AnswerValue::Single(i)) => BTreeSet::from([i]),
            None => BTreeSet::new(),
        };

        let expected = usize::try_from(question.expected_answers()).unwrap_or(usize::MAX);
        if !set.remove(&option_index) {
            if set.len() < expected {
                set.insert(option_index);
            } else {
                set = BTreeSet::from([option_index]);
            }
        }

        if !set.is_empty() {
            self.answers.insert(id, AnswerValue::Multiple(set));
        }
        true
    }

    /// Drop the answer for a question. Returns `false` when locked.
    pub fn clear(&mut self, question_id: QuestionId) -> bool {
        if self.locked.contains(&question_id) {
            return false;
        }
        self.answers.remove(&question_id);
        true
    }

    #[must_use]
    pub fn get(&self, question_id: QuestionId) -> Option<&AnswerValue> {
        self.answers.get(&question_id)
    }

    /// Single-choice: answered at all. Multi-choice: exactly `expected_answers` picked.
    #[must_use]
    pub fn is_complete(&self, question: &Question) -> bool {
        match self.answers.get(&question.id()) {
            None => false,
            Some(value) if question.is_multiple_choice() => {
                u32::try_from(value.len()).is_ok_and(|len| len == question.expected_answers())
            }
            Some(_) => true,
        }
    }

    pub fn lock(&mut self, question_id: QuestionId) {
        self.locked.insert(question_id);
    }

    pub fn unlock(&mut self, question_id: QuestionId) {
        self.locked.remove(&question_id);
    }

    #[must_use]
    pub fn is_locked(&self, question_id: QuestionId) -> bool {
        self.locked.contains(&question_id)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn answers(&self) -> impl Iterator<Item = (QuestionId, &AnswerValue)> {
        self.answers.iter().map(|(id, value)| (*id, value))
    }

    /// Owned copy of every answer, e.g. for pause persistence.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<QuestionId, AnswerValue> {
        self.answers.clone()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
