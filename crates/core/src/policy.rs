use serde::{Deserialize, Serialize};

use crate::model::{ExamMode, UnknownModeError};

/// What a session is allowed to do under a given mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    pub allow_pause: bool,
    pub allow_verify: bool,
    pub show_metadata: bool,
    pub strict_timing: bool,
}

/// Pure decision table from exam mode to capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExamModePolicy;

impl ExamModePolicy {
    #[must_use]
    pub fn capabilities(mode: ExamMode) -> Capabilities {
        match mode {
            ExamMode::Practice | ExamMode::FailedQuestions => Capabilities {
                allow_pause: true,
                allow_verify: true,
                show_metadata: true,
                strict_timing: false,
            },
            ExamMode::Realistic => Capabilities {
                allow_pause: false,
                allow_verify: false,
                show_metadata: false,
                strict_timing: true,
            },
        }
    }

    /// Look up capabilities by wire name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModeError` if `mode` is not a supported mode name.
    pub fn capabilities_for(mode: &str) -> Result<Capabilities, UnknownModeError> {
        Ok(Self::capabilities(mode.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realistic_mode_is_locked_down() {
        let caps = ExamModePolicy::capabilities(ExamMode::Realistic);
        assert!(!caps.allow_pause);
        assert!(!caps.allow_verify);
        assert!(!caps.show_metadata);
        assert!(caps.strict_timing);
    }

    #[test]
    fn practice_and_failed_questions_share_capabilities() {
        assert_eq!(
            ExamModePolicy::capabilities(ExamMode::Practice),
            ExamModePolicy::capabilities(ExamMode::FailedQuestions)
        );
        assert!(ExamModePolicy::capabilities(ExamMode::Practice).allow_verify);
    }

    #[test]
    fn unknown_mode_name_fails() {
        let err = ExamModePolicy::capabilities_for("marathon").unwrap_err();
        assert_eq!(err.0, "marathon");
        assert!(ExamModePolicy::capabilities_for("realistic").unwrap().strict_timing);
    }
}
