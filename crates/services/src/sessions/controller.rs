use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use backend::{ApiError, OracleAnswer, PauseSnapshot, SessionIdentity};
use exam_core::model::{
    AnswerValue, CheckedAnswer, Correctness, Exam, ExamId, ExamMode, ExamResult, Question,
    QuestionId, QuestionOption,
};
use exam_core::{AnswerLedger, Capabilities, Clock, ExamModePolicy, ReviewFlagRegistry, SessionClock};

use super::progress::SessionProgress;
use super::review::ReviewPayload;
use crate::error::SessionError;

/// Seconds granted per question in failed-questions mode.
pub const FAILED_QUESTION_SECONDS: u32 = 90;
/// Lower bound for the failed-questions duration.
pub const FAILED_QUESTIONS_MIN_SECONDS: u32 = 600;

pub const NO_EXPLANATION: &str = "No explanation available.";
pub const EXPLANATION_UNAVAILABLE: &str = "Explanation unavailable";

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Loading,
    Active,
    Paused,
    Completed,
    /// Left via exit or save-and-exit. Terminal.
    Abandoned,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Loading => "loading",
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
            SessionState::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// Injected collaborators that are not backend calls.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub identity: SessionIdentity,
    pub clock: Clock,
}

/// Grading state once a session is completed.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultStatus {
    Pending,
    Graded(ExamResult),
    Unavailable { reason: String },
}

/// Outcome of applying a selection to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerChange {
    Updated(AnswerValue),
    /// The last selected option was removed; the question is unanswered again.
    Cleared,
    /// The question was checked and its answer can no longer change.
    Locked,
}

/// Permission to store one oracle response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTicket {
    epoch: u64,
    question_id: QuestionId,
}

impl CheckTicket {
    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }
}

/// Permission to store one grading response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionTicket {
    epoch: u64,
    exam_id: ExamId,
    forced: bool,
}

impl CompletionTicket {
    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        self.exam_id
    }

    /// Completion was triggered by the timer rather than the user.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.forced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not counting (paused, not started or already finished).
    Idle,
    Running(u32),
    /// Time ran out on this tick; grading must be requested with the ticket.
    Expired(CompletionTicket),
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Owns one exam session: navigation, answers, review flags, timer and completion.
///
/// All operations are synchronous. Backend round trips are split in two halves
/// (`begin_*` hands out a ticket, `finish_*` stores the response) so the caller can
/// release the controller while waiting; tickets from another session or for an
/// abandoned session are ignored.
#[derive(Debug)]
pub struct ExamSessionController {
    context: SessionContext,
    epoch: u64,
    state: SessionState,
    reviewing: bool,
    exam: Option<Exam>,
    capabilities: Capabilities,
    timer: SessionClock,
    ledger: AnswerLedger,
    flags: ReviewFlagRegistry,
    current_index: usize,
    result: Option<ResultStatus>,
    grading_in_flight: bool,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl ExamSessionController {
    #[must_use]
    pub fn new(context: SessionContext) -> Self {
        let capabilities = ExamModePolicy::capabilities(ExamMode::default());
        Self {
            context,
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            state: SessionState::Loading,
            reviewing: false,
            exam: None,
            capabilities,
            timer: SessionClock::new(capabilities.strict_timing),
            ledger: AnswerLedger::new(),
            flags: ReviewFlagRegistry::new(),
            current_index: 0,
            result: None,
            grading_in_flight: false,
            started_at: None,
            completed_at: None,
        }
    }

    /// Load the hydrated exam and start the countdown.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTransition` unless the session is loading,
    /// `SessionError::Empty` for an exam without questions and
    /// `SessionError::Clock` for a zero time limit.
    pub fn initialize(&mut self, exam: Exam) -> Result<(), SessionError> {
        if self.state != SessionState::Loading {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                action: "initialize",
            });
        }
        if exam.question_count() == 0 {
            return Err(SessionError::Empty);
        }

        let capabilities = ExamModePolicy::capabilities(exam.mode());
        let mut timer = SessionClock::new(capabilities.strict_timing);
        timer.start(session_duration(&exam))?;

        info!(
            exam_id = %exam.id(),
            mode = %exam.mode(),
            questions = exam.question_count(),
            seconds = timer.total(),
            "exam session started"
        );
        self.capabilities = capabilities;
        self.timer = timer;
        self.exam = Some(exam);
        self.current_index = 0;
        self.started_at = Some(self.context.clock.now());
        self.state = SessionState::Active;
        Ok(())
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[must_use]
    pub fn identity(&self) -> &SessionIdentity {
        &self.context.identity
    }

    #[must_use]
    pub fn exam(&self) -> Option<&Exam> {
        self.exam.as_ref()
    }

    fn loaded_exam(&self) -> Result<&Exam, SessionError> {
        self.exam.as_ref().ok_or(SessionError::NotInitialized)
    }

    /// # Errors
    ///
    /// Returns `SessionError::NotInitialized` before `initialize`.
    pub fn exam_id(&self) -> Result<ExamId, SessionError> {
        Ok(self.loaded_exam()?.id())
    }

    fn question(&self, question_id: QuestionId) -> Result<&Question, SessionError> {
        self.loaded_exam()?
            .question(question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.exam.as_ref()?.question_at(self.current_index)
    }

    #[must_use]
    pub fn answer(&self, question_id: QuestionId) -> Option<&AnswerValue> {
        self.ledger.get(question_id)
    }

    #[must_use]
    pub fn is_marked(&self, question_id: QuestionId) -> bool {
        self.flags.is_marked(question_id)
    }

    #[must_use]
    pub fn is_checked(&self, question_id: QuestionId) -> bool {
        self.flags.is_checked(question_id)
    }

    #[must_use]
    pub fn checked(&self, question_id: QuestionId) -> Option<&CheckedAnswer> {
        self.flags.checked(question_id)
    }

    #[must_use]
    pub fn is_correct(&self, question_id: QuestionId) -> Correctness {
        self.flags
            .is_correct(question_id, self.ledger.get(question_id))
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.timer.remaining()
    }

    #[must_use]
    pub fn result_status(&self) -> Option<&ResultStatus> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Seconds between start and completion (or now, while running).
    #[must_use]
    pub fn time_spent_seconds(&self) -> u32 {
        let Some(started) = self.started_at else {
            return 0;
        };
        let end = self.completed_at.unwrap_or_else(|| self.context.clock.now());
        exam_core::time::seconds_between(started, end)
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let questions = self.exam.as_ref().map_or(&[][..], Exam::questions);
        SessionProgress {
            state: self.state,
            current_index: self.current_index,
            total: questions.len(),
            answered: self.ledger.answered_count(),
            marked: self.flags.marked_count(),
            checked: self.flags.checked_count(),
            unanswered: questions
                .iter()
                .map(Question::id)
                .filter(|id| self.ledger.get(*id).is_none())
                .collect(),
            remaining_seconds: self.timer.remaining(),
            urgency: self.timer.urgency(),
            is_paused: self.state == SessionState::Paused,
        }
    }

    //
    // ─── ANSWERS & NAVIGATION ──────────────────────────────────────────────────
    //

    fn require_active(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Active {
            Ok(())
        } else {
            Err(SessionError::NotActive(self.state))
        }
    }

    fn require_running(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Active | SessionState::Paused => Ok(()),
            other => Err(SessionError::NotActive(other)),
        }
    }

    /// Apply a click on an option.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` unless active (paused included),
    /// `SessionError::UnknownQuestion` and `SessionError::OptionOutOfRange`.
    pub fn select_answer(
        &mut self,
        question_id: QuestionId,
        option_index: usize,
    ) -> Result<AnswerChange, SessionError> {
        self.require_active()?;
        let Some(question) = self.exam.as_ref().and_then(|e| e.question(question_id)) else {
            return Err(SessionError::UnknownQuestion(question_id));
        };
        let len = question.options().len();
        if question.has_options() && option_index >= len {
            return Err(SessionError::OptionOutOfRange {
                question_id,
                index: option_index,
                len,
            });
        }

        if !self.ledger.select(question, option_index) {
            debug!(%question_id, "answer is locked after check");
            return Ok(AnswerChange::Locked);
        }
        Ok(match self.ledger.get(question_id) {
            Some(value) => AnswerChange::Updated(value.clone()),
            None => AnswerChange::Cleared,
        })
    }

    /// Drop the answer of a question. Returns `false` when it is locked.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` or `SessionError::UnknownQuestion`.
    pub fn clear_answer(&mut self, question_id: QuestionId) -> Result<bool, SessionError> {
        self.require_active()?;
        self.question(question_id)?;
        Ok(self.ledger.clear(question_id))
    }

    /// Jump to the question at `index`. Ignored while paused.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside active/paused and
    /// `SessionError::IndexOutOfRange` for indices past the last question.
    pub fn go_to_question(&mut self, index: usize) -> Result<(), SessionError> {
        self.require_running()?;
        let len = self.loaded_exam()?.question_count();
        if index >= len {
            return Err(SessionError::IndexOutOfRange { index, len });
        }
        if self.state == SessionState::Paused {
            debug!(index, "navigation ignored while paused");
            return Ok(());
        }
        self.current_index = index;
        Ok(())
    }

    /// Move one question forward. Returns `false` on the last question or while paused.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside active/paused.
    pub fn next_question(&mut self) -> Result<bool, SessionError> {
        self.require_running()?;
        let len = self.loaded_exam()?.question_count();
        if self.state == SessionState::Paused || self.current_index + 1 >= len {
            return Ok(false);
        }
        self.current_index += 1;
        Ok(true)
    }

    /// Move one question back. Returns `false` on the first question or while paused.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside active/paused.
    pub fn previous_question(&mut self) -> Result<bool, SessionError> {
        self.require_running()?;
        if self.state == SessionState::Paused || self.current_index == 0 {
            return Ok(false);
        }
        self.current_index -= 1;
        Ok(true)
    }

    /// Flip the review mark and return the new value. Ignored while paused.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside active/paused and
    /// `SessionError::UnknownQuestion`.
    pub fn toggle_mark(&mut self, question_id: QuestionId) -> Result<bool, SessionError> {
        self.require_running()?;
        self.question(question_id)?;
        if self.state == SessionState::Paused {
            debug!(%question_id, "mark ignored while paused");
            return Ok(self.flags.is_marked(question_id));
        }
        Ok(self.flags.toggle_mark(question_id))
    }

    //
    // ─── CHECK ─────────────────────────────────────────────────────────────────
    //

    /// Reserve an oracle request for `question_id` and lock its answer.
    ///
    /// Returns `None` when the question is already checked or a check is in flight.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::CapabilityDenied` in modes without verification,
    /// `SessionError::NotActive` unless active and `SessionError::UnknownQuestion`.
    pub fn begin_check(&mut self, question_id: QuestionId) -> Result<Option<CheckTicket>, SessionError> {
        if !self.capabilities.allow_verify {
            return Err(SessionError::CapabilityDenied("checking answers"));
        }
        self.require_active()?;
        self.question(question_id)?;

        if !self.flags.begin_check(question_id) {
            debug!(%question_id, "check already done or in flight");
            return Ok(None);
        }
        self.ledger.lock(question_id);
        Ok(Some(CheckTicket {
            epoch: self.epoch,
            question_id,
        }))
    }

    /// Store the oracle response for a ticket. Returns `true` if something was stored.
    ///
    /// An oracle failure still marks the question checked, with an unknown correct
    /// answer and a fallback explanation.
    pub fn finish_check(
        &mut self,
        ticket: CheckTicket,
        outcome: Result<OracleAnswer, ApiError>,
    ) -> bool {
        let question_id = ticket.question_id;
        if ticket.epoch != self.epoch || self.state == SessionState::Abandoned {
            debug!(%question_id, "ignoring stale check response");
            return false;
        }
        let Some(question) = self.exam.as_ref().and_then(|e| e.question(question_id)) else {
            return false;
        };

        match outcome {
            Ok(answer) => {
                let explanation = answer
                    .explanation
                    .unwrap_or_else(|| NO_EXPLANATION.to_owned());
                self.flags
                    .check(question, &answer.correct_answer, explanation)
            }
            Err(err) => {
                warn!(%question_id, error = %err, "answer oracle failed; showing fallback");
                self.flags
                    .check_unknown(question_id, EXPLANATION_UNAVAILABLE)
            }
        }
    }

    //
    // ─── PAUSE & TIMER ─────────────────────────────────────────────────────────
    //

    /// Toggle pause and return the new paused flag.
    ///
    /// In modes without pause (realistic) this is a no-op returning `false`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside active/paused.
    pub fn toggle_pause(&mut self) -> Result<bool, SessionError> {
        self.require_running()?;
        if !self.capabilities.allow_pause {
            debug!("pause ignored in strict mode");
            return Ok(false);
        }
        if self.state == SessionState::Paused {
            self.timer.resume()?;
            self.state = SessionState::Active;
            info!("exam session resumed");
            Ok(false)
        } else {
            self.timer.pause()?;
            self.state = SessionState::Paused;
            info!(remaining = self.timer.remaining(), "exam session paused");
            Ok(true)
        }
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != SessionState::Active {
            return TickOutcome::Idle;
        }
        if !self.timer.tick() {
            return TickOutcome::Running(self.timer.remaining());
        }
        info!("time is up; completing exam");
        self.force_completion()
            .map_or(TickOutcome::Idle, TickOutcome::Expired)
    }

    //
    // ─── COMPLETION ────────────────────────────────────────────────────────────
    //

    /// User-requested completion. Returns `None` if already completed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Paused` while paused and `SessionError::NotActive`
    /// when loading or abandoned.
    pub fn begin_completion(&mut self) -> Result<Option<CompletionTicket>, SessionError> {
        match self.state {
            SessionState::Active => Ok(self.complete(false)),
            SessionState::Paused => Err(SessionError::Paused),
            SessionState::Completed => Ok(None),
            other => Err(SessionError::NotActive(other)),
        }
    }

    /// Completion that ignores pause, used on timeout. Returns `None` when the
    /// session is not running.
    pub fn force_completion(&mut self) -> Option<CompletionTicket> {
        match self.state {
            SessionState::Active | SessionState::Paused => self.complete(true),
            _ => None,
        }
    }

    fn complete(&mut self, forced: bool) -> Option<CompletionTicket> {
        let exam_id = self.exam.as_ref()?.id();
        self.state = SessionState::Completed;
        self.completed_at = Some(self.context.clock.now());
        self.result = Some(ResultStatus::Pending);
        self.grading_in_flight = true;
        info!(%exam_id, forced, answered = self.ledger.answered_count(), "exam completed");
        Some(CompletionTicket {
            epoch: self.epoch,
            exam_id,
            forced,
        })
    }

    /// Store the grading response. Returns `true` if it was accepted.
    pub fn finish_completion(
        &mut self,
        ticket: CompletionTicket,
        outcome: Result<ExamResult, ApiError>,
    ) -> bool {
        if ticket.epoch != self.epoch || self.state != SessionState::Completed {
            debug!(exam_id = %ticket.exam_id, "ignoring stale grading response");
            return false;
        }
        if matches!(self.result, Some(ResultStatus::Graded(_))) {
            return false;
        }

        self.grading_in_flight = false;
        self.result = Some(match outcome {
            Ok(result) => {
                info!(score = result.score(), passed = result.passed(), "exam graded");
                ResultStatus::Graded(result)
            }
            Err(err) => {
                warn!(exam_id = %ticket.exam_id, error = %err, "grading unavailable");
                ResultStatus::Unavailable {
                    reason: err.to_string(),
                }
            }
        });
        true
    }

    /// New grading ticket after a failed attempt. Returns `None` if grading is not
    /// in the unavailable state.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` before completion.
    pub fn begin_grading_retry(&mut self) -> Result<Option<CompletionTicket>, SessionError> {
        if self.state != SessionState::Completed {
            return Err(SessionError::NotCompleted);
        }
        if self.grading_in_flight || !matches!(self.result, Some(ResultStatus::Unavailable { .. })) {
            return Ok(None);
        }
        self.grading_in_flight = true;
        self.result = Some(ResultStatus::Pending);
        Ok(Some(CompletionTicket {
            epoch: self.epoch,
            exam_id: self.loaded_exam()?.id(),
            forced: false,
        }))
    }

    //
    // ─── LEAVING ───────────────────────────────────────────────────────────────
    //

    /// State to persist for save-and-exit.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SaveNotAllowed` for anonymous users or modes without
    /// pause, and `SessionError::NotActive` outside active/paused.
    pub fn save_snapshot(&self) -> Result<PauseSnapshot, SessionError> {
        if !self.context.identity.is_authenticated() || !self.capabilities.allow_pause {
            return Err(SessionError::SaveNotAllowed);
        }
        self.require_running()?;

        let answers: BTreeMap<QuestionId, AnswerValue> = self
            .ledger
            .answers()
            .map(|(id, value)| (id, value.clone()))
            .collect();
        Ok(PauseSnapshot {
            current_index: self.current_index,
            remaining_seconds: self.timer.remaining(),
            answers,
            marked: self.flags.marked_ids(),
            checked: self.flags.checked_ids(),
        })
    }

    /// Leave the session. Returns `true` when the backend exam should be cancelled,
    /// i.e. it was started but never completed.
    pub fn exit(&mut self) -> bool {
        let needs_cancel = matches!(self.state, SessionState::Active | SessionState::Paused);
        if self.state != SessionState::Abandoned {
            info!(from = %self.state, "exam session abandoned");
        }
        self.state = SessionState::Abandoned;
        self.reviewing = false;
        needs_cancel
    }

    //
    // ─── REVIEW ────────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` before completion.
    pub fn open_review(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Completed {
            return Err(SessionError::NotCompleted);
        }
        self.reviewing = true;
        Ok(())
    }

    pub fn close_review(&mut self) {
        self.reviewing = false;
    }

    #[must_use]
    pub fn is_reviewing(&self) -> bool {
        self.reviewing
    }

    /// Questions that arrived without options.
    #[must_use]
    pub fn missing_options(&self) -> Vec<QuestionId> {
        self.exam
            .as_ref()
            .map(|exam| {
                exam.questions()
                    .iter()
                    .filter(|q| !q.has_options())
                    .map(Question::id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// # Errors
    ///
    /// Returns `SessionError::NotInitialized` or `SessionError::Exam` for unknown
    /// questions and questions that already have options.
    pub fn backfill_options(
        &mut self,
        question_id: QuestionId,
        options: Vec<QuestionOption>,
    ) -> Result<(), SessionError> {
        self.exam
            .as_mut()
            .ok_or(SessionError::NotInitialized)?
            .backfill_options(question_id, options)?;
        Ok(())
    }

    /// Merge exam, answers, flags and grading into one review document.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` before completion.
    pub fn assemble_review_payload(&self) -> Result<ReviewPayload, SessionError> {
        if self.state != SessionState::Completed {
            return Err(SessionError::NotCompleted);
        }
        let exam = self.loaded_exam()?;
        Ok(ReviewPayload::assemble(
            exam,
            &self.ledger,
            &self.flags,
            self.result.as_ref(),
            self.time_spent_seconds(),
        ))
    }
}

/// Timer budget for an exam.
#[must_use]
pub fn session_duration(exam: &Exam) -> u32 {
    if exam.mode() == ExamMode::FailedQuestions {
        let count = u32::try_from(exam.question_count()).unwrap_or(u32::MAX);
        count
            .saturating_mul(FAILED_QUESTION_SECONDS)
            .max(FAILED_QUESTIONS_MIN_SECONDS)
    } else {
        exam.time_limit_seconds()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{ExamStatistics, QuestionOption};
    use exam_core::time::fixed_clock;

    fn options(n: usize) -> Vec<QuestionOption> {
        (0..n).map(QuestionOption::placeholder).collect()
    }

    fn exam(mode: ExamMode, count: u64, seconds: u32) -> Exam {
        let questions = (1..=count)
            .map(|id| {
                let question = if id % 2 == 0 {
                    Question::multiple_choice(QuestionId::new(id), format!("Q{id}"), options(5), 2)
                } else {
                    Question::single_choice(QuestionId::new(id), format!("Q{id}"), options(4))
                };
                question.unwrap()
            })
            .collect();
        Exam::new(ExamId::new(77), mode, questions, seconds)
    }

    fn context(authenticated: bool) -> SessionContext {
        SessionContext {
            identity: if authenticated {
                SessionIdentity::authenticated("token")
            } else {
                SessionIdentity::anonymous()
            },
            clock: fixed_clock(),
        }
    }

    fn started(mode: ExamMode, count: u64, seconds: u32) -> ExamSessionController {
        let mut controller = ExamSessionController::new(context(true));
        controller.initialize(exam(mode, count, seconds)).unwrap();
        controller
    }

    fn q(id: u64) -> QuestionId {
        QuestionId::new(id)
    }

    #[test]
    fn initialize_moves_loading_to_active() {
        let controller = started(ExamMode::Practice, 3, 1800);
        assert_eq!(controller.state(), SessionState::Active);
        assert_eq!(controller.remaining_seconds(), 1800);
        assert!(controller.started_at().is_some());
    }

    #[test]
    fn initialize_twice_is_an_invalid_transition() {
        let mut controller = started(ExamMode::Practice, 3, 1800);
        let err = controller
            .initialize(exam(ExamMode::Practice, 3, 1800))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[test]
    fn empty_exam_is_rejected() {
        let mut controller = ExamSessionController::new(context(true));
        let err = controller
            .initialize(exam(ExamMode::Practice, 0, 60))
            .unwrap_err();
        assert!(matches!(err, SessionError::Empty));
        assert_eq!(controller.state(), SessionState::Loading);
    }

    #[test]
    fn failed_questions_duration_has_a_floor() {
        assert_eq!(session_duration(&exam(ExamMode::FailedQuestions, 3, 60)), 600);
        assert_eq!(session_duration(&exam(ExamMode::FailedQuestions, 10, 60)), 900);
        assert_eq!(session_duration(&exam(ExamMode::Realistic, 10, 5400)), 5400);
    }

    #[test]
    fn option_index_is_bounds_checked() {
        let mut controller = started(ExamMode::Practice, 2, 600);
        let err = controller.select_answer(q(1), 4).unwrap_err();
        assert!(matches!(err, SessionError::OptionOutOfRange { len: 4, .. }));
        assert!(matches!(
            controller.select_answer(q(99), 0),
            Err(SessionError::UnknownQuestion(_))
        ));
    }

    #[test]
    fn multi_choice_overflow_resets_selection() {
        let mut controller = started(ExamMode::Practice, 2, 600);
        controller.select_answer(q(2), 0).unwrap();
        controller.select_answer(q(2), 1).unwrap();
        let change = controller.select_answer(q(2), 2).unwrap();
        assert_eq!(
            change,
            AnswerChange::Updated(AnswerValue::Multiple([2].into_iter().collect()))
        );
        assert_eq!(controller.select_answer(q(2), 2).unwrap(), AnswerChange::Cleared);
    }

    #[test]
    fn go_to_question_bounds_and_pause() {
        let mut controller = started(ExamMode::Practice, 3, 600);
        controller.go_to_question(2).unwrap();
        assert_eq!(controller.current_index(), 2);
        assert!(matches!(
            controller.go_to_question(3),
            Err(SessionError::IndexOutOfRange { index: 3, len: 3 })
        ));

        controller.toggle_pause().unwrap();
        controller.go_to_question(0).unwrap();
        assert_eq!(controller.current_index(), 2);
        assert!(!controller.next_question().unwrap());
    }

    #[test]
    fn pause_blocks_answers_and_ticks() {
        let mut controller = started(ExamMode::Practice, 2, 600);
        assert!(controller.toggle_pause().unwrap());
        assert!(matches!(
            controller.select_answer(q(1), 0),
            Err(SessionError::NotActive(SessionState::Paused))
        ));
        assert_eq!(controller.tick(), TickOutcome::Idle);
        assert_eq!(controller.remaining_seconds(), 600);
        assert!(!controller.toggle_pause().unwrap());
        assert_eq!(controller.tick(), TickOutcome::Running(599));
    }

    #[test]
    fn realistic_mode_cannot_pause_or_check() {
        let mut controller = started(ExamMode::Realistic, 2, 600);
        assert!(!controller.toggle_pause().unwrap());
        assert_eq!(controller.state(), SessionState::Active);
        assert!(matches!(
            controller.begin_check(q(1)),
            Err(SessionError::CapabilityDenied(_))
        ));
    }

    #[test]
    fn check_locks_answer_and_first_response_wins() {
        let mut controller = started(ExamMode::Practice, 2, 600);
        controller.select_answer(q(1), 1).unwrap();
        let ticket = controller.begin_check(q(1)).unwrap().unwrap();
        assert_eq!(controller.begin_check(q(1)).unwrap(), None);
        assert_eq!(controller.select_answer(q(1), 2).unwrap(), AnswerChange::Locked);

        let stored = controller.finish_check(
            ticket,
            Ok(OracleAnswer {
                correct_answer: vec![1],
                explanation: None,
            }),
        );
        assert!(stored);
        assert_eq!(controller.is_correct(q(1)), Correctness::Correct);
        assert_eq!(controller.checked(q(1)).unwrap().explanation, NO_EXPLANATION);
        assert!(!controller.finish_check(ticket, Err(ApiError::Timeout)));
    }

    #[test]
    fn oracle_failure_checks_with_unknown_correctness() {
        let mut controller = started(ExamMode::Practice, 2, 600);
        controller.select_answer(q(1), 0).unwrap();
        let ticket = controller.begin_check(q(1)).unwrap().unwrap();
        assert!(controller.finish_check(ticket, Err(ApiError::Timeout)));
        assert!(controller.is_checked(q(1)));
        assert_eq!(controller.is_correct(q(1)), Correctness::Unknown);
        assert_eq!(
            controller.checked(q(1)).unwrap().explanation,
            EXPLANATION_UNAVAILABLE
        );
    }

    #[test]
    fn tickets_from_other_sessions_are_ignored() {
        let mut first = started(ExamMode::Practice, 2, 600);
        let mut second = started(ExamMode::Practice, 2, 600);
        let ticket = first.begin_check(q(1)).unwrap().unwrap();
        assert!(!second.finish_check(
            ticket,
            Ok(OracleAnswer {
                correct_answer: vec![0],
                explanation: None,
            })
        ));
        assert!(!second.is_checked(q(1)));
    }

    #[test]
    fn expiry_forces_completion_once() {
        let mut controller = started(ExamMode::Practice, 1, 2);
        assert_eq!(controller.tick(), TickOutcome::Running(1));
        let TickOutcome::Expired(ticket) = controller.tick() else {
            panic!("expected expiry");
        };
        assert!(ticket.is_forced());
        assert_eq!(controller.state(), SessionState::Completed);
        assert_eq!(controller.tick(), TickOutcome::Idle);
        assert_eq!(controller.begin_completion().unwrap(), None);
        assert_eq!(controller.result_status(), Some(&ResultStatus::Pending));
    }

    #[test]
    fn completion_rejected_while_paused_but_forced_ignores_pause() {
        let mut controller = started(ExamMode::Practice, 1, 60);
        controller.toggle_pause().unwrap();
        assert!(matches!(controller.begin_completion(), Err(SessionError::Paused)));
        assert!(controller.force_completion().is_some());
        assert!(controller.force_completion().is_none());
        assert!(matches!(
            controller.select_answer(q(1), 0),
            Err(SessionError::NotActive(SessionState::Completed))
        ));
    }

    #[test]
    fn grading_failure_keeps_completed_and_can_retry() {
        let mut controller = started(ExamMode::Practice, 1, 60);
        let ticket = controller.begin_completion().unwrap().unwrap();
        assert!(controller.finish_completion(ticket, Err(ApiError::Timeout)));
        assert_eq!(controller.state(), SessionState::Completed);
        assert!(matches!(
            controller.result_status(),
            Some(ResultStatus::Unavailable { .. })
        ));

        let retry = controller.begin_grading_retry().unwrap().unwrap();
        assert_eq!(controller.begin_grading_retry().unwrap(), None);
        let result = ExamResult::new(
            100.0,
            true,
            30,
            ExamStatistics::from_counts(1, 1, 0),
            Vec::new(),
        )
        .unwrap();
        assert!(controller.finish_completion(retry, Ok(result)));
        assert!(matches!(controller.result_status(), Some(ResultStatus::Graded(_))));
    }

    #[test]
    fn save_snapshot_requires_login_and_pausable_mode() {
        let mut anonymous = ExamSessionController::new(context(false));
        anonymous.initialize(exam(ExamMode::Practice, 2, 60)).unwrap();
        assert!(matches!(anonymous.save_snapshot(), Err(SessionError::SaveNotAllowed)));

        let realistic = started(ExamMode::Realistic, 2, 60);
        assert!(matches!(realistic.save_snapshot(), Err(SessionError::SaveNotAllowed)));

        let mut practice = started(ExamMode::Practice, 2, 60);
        practice.select_answer(q(1), 3).unwrap();
        practice.toggle_mark(q(2)).unwrap();
        practice.go_to_question(1).unwrap();
        let snapshot = practice.save_snapshot().unwrap();
        assert_eq!(snapshot.current_index, 1);
        assert_eq!(snapshot.remaining_seconds, 60);
        assert_eq!(snapshot.answers.get(&q(1)), Some(&AnswerValue::Single(3)));
        assert_eq!(snapshot.marked, vec![q(2)]);
    }

    #[test]
    fn exit_cancels_only_unfinished_sessions() {
        let mut running = started(ExamMode::Practice, 1, 60);
        assert!(running.exit());
        assert_eq!(running.state(), SessionState::Abandoned);
        assert!(!running.exit());

        let mut done = started(ExamMode::Practice, 1, 60);
        let ticket = done.begin_completion().unwrap().unwrap();
        assert!(!done.exit());
        assert!(!done.finish_completion(ticket, Err(ApiError::Timeout)));
    }

    #[test]
    fn review_requires_completion() {
        let mut controller = started(ExamMode::Practice, 1, 60);
        assert!(matches!(controller.open_review(), Err(SessionError::NotCompleted)));
        assert!(matches!(
            controller.assemble_review_payload(),
            Err(SessionError::NotCompleted)
        ));
        controller.begin_completion().unwrap();
        controller.open_review().unwrap();
        assert!(controller.is_reviewing());
        assert!(controller.assemble_review_payload().is_ok());
    }
}
