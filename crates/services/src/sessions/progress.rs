use serde::Serialize;

use exam_core::TimeUrgency;
use exam_core::model::QuestionId;

use super::controller::SessionState;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub state: SessionState,
    pub current_index: usize,
    pub total: usize,
    pub answered: usize,
    pub marked: usize,
    pub checked: usize,
    pub unanswered: Vec<QuestionId>,
    pub remaining_seconds: u32,
    pub urgency: TimeUrgency,
    pub is_paused: bool,
}

impl SessionProgress {
    /// Share of answered questions in percent, rounded down.
    #[must_use]
    pub fn percent_answered(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        u32::try_from(self.answered * 100 / self.total).unwrap_or(100)
    }
}
