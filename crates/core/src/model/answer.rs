use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::model::question::Question;

//
// ─── ANSWER VALUE ──────────────────────────────────────────────────────────────
//

/// A user's (or the oracle's) selection for one question.
///
/// Serializes the way the backend expects: a bare index for single-choice and an
/// ascending index list for multi-choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Single(usize),
    Multiple(BTreeSet<usize>),
}

impl AnswerValue {
    /// Build the canonical form for `question` out of raw indices.
    ///
    /// Multi-choice questions keep the set form, single-choice questions keep the
    /// first index. Returns `None` for an empty list.
    #[must_use]
    pub fn normalized(question: &Question, indices: &[usize]) -> Option<Self> {
        if question.is_multiple_choice() {
            let set: BTreeSet<usize> = indices.iter().copied().collect();
            (!set.is_empty()).then_some(AnswerValue::Multiple(set))
        } else {
            indices.first().copied().map(AnswerValue::Single)
        }
    }

    /// The value sent when the last selected option is removed.
    #[must_use]
    pub fn cleared() -> Self {
        AnswerValue::Multiple(BTreeSet::new())
    }

    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        match self {
            AnswerValue::Single(i) => *i == index,
            AnswerValue::Multiple(set) => set.contains(&index),
        }
    }

    /// Number of selected options.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            AnswerValue::Single(_) => 1,
            AnswerValue::Multiple(set) => set.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selected indices in ascending order.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        match self {
            AnswerValue::Single(i) => vec![*i],
            AnswerValue::Multiple(set) => set.iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn max_index(&self) -> Option<usize> {
        match self {
            AnswerValue::Single(i) => Some(*i),
            AnswerValue::Multiple(set) => set.last().copied(),
        }
    }

    /// Order-independent comparison that also tolerates `Single(i)` vs `Multiple({i})`.
    #[must_use]
    pub fn matches(&self, other: &AnswerValue) -> bool {
        self.indices() == other.indices()
    }
}

//
// ─── CORRECTNESS ───────────────────────────────────────────────────────────────
//

/// Tri-state outcome of comparing a user answer with the known correct answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correctness {
    Correct,
    Incorrect,
    Unknown,
}

impl Correctness {
    #[must_use]
    pub fn from_bool(value: Option<bool>) -> Self {
        match value {
            Some(true) => Correctness::Correct,
            Some(false) => Correctness::Incorrect,
            None => Correctness::Unknown,
        }
    }

    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Correctness::Correct => Some(true),
            Correctness::Incorrect => Some(false),
            Correctness::Unknown => None,
        }
    }
}

//
// ─── CHECKED ANSWER ────────────────────────────────────────────────────────────
//

/// Where the data of a checked question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSource {
    Oracle,
    /// The oracle could not be reached; correctness stays unknown.
    Fallback,
}

/// Correct answer and explanation revealed for a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedAnswer {
    pub correct_answer: Option<AnswerValue>,
    pub explanation: String,
    pub source: CheckSource,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
