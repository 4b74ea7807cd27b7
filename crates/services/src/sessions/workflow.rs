use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::join_all;
use tracing::{debug, info, warn};

use backend::{ApiError, Backend, SessionIdentity};
use exam_core::Clock;
use exam_core::model::{AnswerValue, Exam, ExamConfig, ExamId, ExamResult, QuestionId};

use super::controller::{
    AnswerChange, CompletionTicket, ExamSessionController, SessionContext, SessionState,
    TickOutcome,
};
use super::queries::SessionQueries;
use super::review::ReviewPayload;
use super::submissions::SubmissionQueue;
use crate::error::SessionError;
use crate::retry::RetryConfig;

/// One controller shared between the driver and in-flight backend calls.
pub type SharedSession = Arc<Mutex<ExamSessionController>>;

/// Lock a shared session.
///
/// # Errors
///
/// Returns `SessionError::Closed` if a previous holder panicked.
pub fn lock_session(
    session: &SharedSession,
) -> Result<MutexGuard<'_, ExamSessionController>, SessionError> {
    session.lock().map_err(|_| SessionError::Closed)
}

/// Result of clicking an option.
#[derive(Debug)]
pub struct SessionAnswerResult {
    pub change: AnswerChange,
    /// The new value was queued for background submission.
    pub queued: bool,
}

/// Drives an [`ExamSessionController`] against the backend contracts.
///
/// The controller is never locked across an await. Methods that wait on the
/// backend take the session handle by value and keep only a [`Weak`] reference
/// while the request is in flight, so a session dropped by the driver turns the
/// late response into a no-op.
///
/// Answer submissions run in the background, one worker per question. Grading
/// and saving wait for them so the backend sees what the ledger holds.
#[derive(Clone)]
pub struct ExamSessionService {
    clock: Clock,
    identity: SessionIdentity,
    backend: Backend,
    retry: RetryConfig,
    submissions: Arc<SubmissionQueue>,
}

impl ExamSessionService {
    #[must_use]
    pub fn new(clock: Clock, identity: SessionIdentity, backend: Backend) -> Self {
        Self {
            clock,
            identity,
            backend,
            retry: RetryConfig::default(),
            submissions: Arc::new(SubmissionQueue::default()),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    #[must_use]
    pub fn can_save(&self) -> bool {
        self.identity.is_authenticated() && self.backend.pauses.is_some()
    }

    /// Create, start and initialize a session for `config`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` when the request is invalid, the provider fails or
    /// the exam comes back empty.
    pub async fn start_session(&self, config: &ExamConfig) -> Result<SharedSession, SessionError> {
        let exam = SessionQueries::start_from_provider(config, self.backend.exams.as_ref()).await?;
        let mut controller = ExamSessionController::new(SessionContext {
            identity: self.identity.clone(),
            clock: self.clock,
        });
        controller.initialize(exam)?;
        Ok(Arc::new(Mutex::new(controller)))
    }

    /// Apply a selection and submit the new answer in the background.
    ///
    /// Submission is best-effort: transient failures are retried, the rest are
    /// logged. A cleared question is submitted as an empty answer. Locked
    /// questions submit nothing.
    ///
    /// # Errors
    ///
    /// Returns the controller's `SessionError` for the selection itself.
    pub fn select_answer(
        &self,
        session: &SharedSession,
        question_id: QuestionId,
        option_index: usize,
    ) -> Result<SessionAnswerResult, SessionError> {
        let (change, exam_id) = {
            let mut controller = lock_session(session)?;
            let change = controller.select_answer(question_id, option_index)?;
            (change, controller.exam_id()?)
        };

        let answer = match &change {
            AnswerChange::Updated(answer) => Some(answer.clone()),
            AnswerChange::Cleared => Some(AnswerValue::cleared()),
            AnswerChange::Locked => None,
        };
        let queued = answer.is_some_and(|answer| {
            self.submissions.enqueue(
                &self.backend.answers,
                self.retry,
                exam_id,
                question_id,
                answer,
            )
        });
        Ok(SessionAnswerResult { change, queued })
    }

    /// Drop the answer of a question and submit the cleared value.
    ///
    /// Returns `false` when the question is locked.
    ///
    /// # Errors
    ///
    /// Returns the controller's `SessionError`.
    pub fn clear_answer(
        &self,
        session: &SharedSession,
        question_id: QuestionId,
    ) -> Result<bool, SessionError> {
        let (cleared, exam_id) = {
            let mut controller = lock_session(session)?;
            (controller.clear_answer(question_id)?, controller.exam_id()?)
        };
        if cleared {
            self.submissions.enqueue(
                &self.backend.answers,
                self.retry,
                exam_id,
                question_id,
                AnswerValue::cleared(),
            );
        }
        Ok(cleared)
    }

    /// Wait for every queued answer of this session to reach the backend or fail.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` before the session was initialized.
    pub async fn flush_submissions(&self, session: &SharedSession) -> Result<(), SessionError> {
        let exam_id = lock_session(session)?.exam_id()?;
        self.submissions.settle(exam_id).await;
        Ok(())
    }

    /// Ask the oracle for the correct answer of `question_id`.
    ///
    /// Returns `false` when nothing was stored: the question was already checked,
    /// a check was in flight, or the session went away meanwhile.
    ///
    /// # Errors
    ///
    /// Returns the controller's `SessionError` from `begin_check`.
    pub async fn request_check(
        &self,
        session: SharedSession,
        question_id: QuestionId,
    ) -> Result<bool, SessionError> {
        let ticket = lock_session(&session)?.begin_check(question_id)?;
        let Some(ticket) = ticket else {
            return Ok(false);
        };
        let weak = Arc::downgrade(&session);
        drop(session);

        let outcome = self.backend.oracle.correct_answer(question_id).await;

        let Some(session) = weak.upgrade() else {
            debug!(%question_id, "session dropped before oracle response");
            return Ok(false);
        };
        let stored = lock_session(&session)?.finish_check(ticket, outcome);
        Ok(stored)
    }

    /// User-requested completion followed by grading.
    ///
    /// Returns `false` if the session was already completed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Paused` while paused and `SessionError::NotActive`
    /// when the session is not running.
    pub async fn request_completion(&self, session: SharedSession) -> Result<bool, SessionError> {
        let ticket = lock_session(&session)?.begin_completion()?;
        let Some(ticket) = ticket else {
            return Ok(false);
        };
        let weak = Arc::downgrade(&session);
        drop(session);
        self.grade(weak, ticket).await?;
        Ok(true)
    }

    /// Completion that ignores pause, then grading.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the session lock is poisoned.
    pub async fn force_completion(&self, session: SharedSession) -> Result<bool, SessionError> {
        let ticket = lock_session(&session)?.force_completion();
        let Some(ticket) = ticket else {
            return Ok(false);
        };
        let weak = Arc::downgrade(&session);
        drop(session);
        self.grade(weak, ticket).await?;
        Ok(true)
    }

    /// One scheduler tick. On expiry the exam is graded before returning.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the session lock is poisoned.
    pub async fn tick(&self, session: SharedSession) -> Result<TickOutcome, SessionError> {
        let outcome = lock_session(&session)?.tick();
        if let TickOutcome::Expired(ticket) = outcome {
            let weak = Arc::downgrade(&session);
            drop(session);
            self.grade(weak, ticket).await?;
        }
        Ok(outcome)
    }

    /// Ask for grading again after it came back unavailable.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` before completion.
    pub async fn retry_grading(&self, session: SharedSession) -> Result<bool, SessionError> {
        let ticket = lock_session(&session)?.begin_grading_retry()?;
        let Some(ticket) = ticket else {
            return Ok(false);
        };
        info!(exam_id = %ticket.exam_id(), "retrying grading");
        let weak = Arc::downgrade(&session);
        drop(session);
        self.grade(weak, ticket).await
    }

    async fn grade(
        &self,
        session: Weak<Mutex<ExamSessionController>>,
        ticket: CompletionTicket,
    ) -> Result<bool, SessionError> {
        self.submissions.settle(ticket.exam_id()).await;
        let outcome = self.fetch_result(ticket.exam_id()).await;
        let Some(session) = session.upgrade() else {
            debug!(exam_id = %ticket.exam_id(), "session dropped before grading response");
            return Ok(false);
        };
        let accepted = lock_session(&session)?.finish_completion(ticket, outcome);
        Ok(accepted)
    }

    async fn fetch_result(&self, exam_id: ExamId) -> Result<ExamResult, ApiError> {
        if let Err(err) = self.backend.grading.complete_exam(exam_id).await {
            warn!(%exam_id, error = %err, "complete request failed; asking for results anyway");
        }
        self.backend.grading.results(exam_id).await
    }

    /// Persist a pause snapshot and leave the session.
    ///
    /// On a backend failure the session stays as it was so the user can retry or
    /// exit.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SaveNotAllowed` for anonymous sessions and modes
    /// without pause, and `SessionError::Api` when persistence fails.
    pub async fn save_and_exit(&self, session: SharedSession) -> Result<(), SessionError> {
        let Some(pauses) = self.backend.pauses.as_ref() else {
            return Err(SessionError::SaveNotAllowed);
        };
        let (exam_id, snapshot) = {
            let controller = lock_session(&session)?;
            (controller.exam_id()?, controller.save_snapshot()?)
        };
        let weak = Arc::downgrade(&session);
        drop(session);

        self.submissions.settle(exam_id).await;
        pauses.pause_exam(exam_id, &snapshot).await?;
        info!(%exam_id, remaining = snapshot.remaining_seconds, "exam saved for later");

        if let Some(session) = weak.upgrade() {
            lock_session(&session)?.exit();
        }
        Ok(())
    }

    /// Leave the session, cancelling the backend exam if it was never completed.
    ///
    /// Cancellation is best-effort.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the session lock is poisoned.
    pub async fn exit(&self, session: SharedSession) -> Result<(), SessionError> {
        let (needs_cancel, exam_id) = {
            let mut controller = lock_session(&session)?;
            let exam_id = controller.exam().map(Exam::id);
            (controller.exit(), exam_id)
        };
        drop(session);

        let Some(exam_id) = exam_id.filter(|_| needs_cancel) else {
            return Ok(());
        };
        match self.backend.exams.cancel_exam(exam_id).await {
            Ok(()) => info!(%exam_id, "exam cancelled"),
            Err(err) => warn!(%exam_id, error = %err, "exam cancellation failed"),
        }
        Ok(())
    }

    /// Fetch options for questions that arrived without them, then assemble the
    /// review payload. Options that cannot be fetched fall back to placeholders.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` before completion.
    pub async fn review_payload(&self, session: SharedSession) -> Result<ReviewPayload, SessionError> {
        let missing = {
            let controller = lock_session(&session)?;
            if controller.state() != SessionState::Completed {
                return Err(SessionError::NotCompleted);
            }
            controller.missing_options()
        };
        let weak = Arc::downgrade(&session);
        drop(session);

        let fetched = join_all(missing.into_iter().map(|question_id| async move {
            let options = self.backend.questions.question_options(question_id).await;
            (question_id, options)
        }))
        .await;

        let session = weak.upgrade().ok_or(SessionError::Closed)?;
        let mut controller = lock_session(&session)?;
        for (question_id, options) in fetched {
            match options {
                Ok(options) if options.is_empty() => {
                    debug!(%question_id, "backend has no options either");
                }
                Ok(options) => {
                    if let Err(err) = controller.backfill_options(question_id, options) {
                        warn!(%question_id, error = %err, "could not backfill options");
                    }
                }
                Err(err) => warn!(%question_id, error = %err, "option backfill failed"),
            }
        }
        controller.assemble_review_payload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use backend::InMemoryBackend;
    use exam_core::model::{ExamMode, Question, QuestionOption};
    use exam_core::time::fixed_clock;

    fn question(id: u64) -> Question {
        Question::single_choice(
            QuestionId::new(id),
            format!("Q{id}"),
            (0..4).map(QuestionOption::placeholder).collect(),
        )
        .unwrap()
    }

    fn service(repo: &InMemoryBackend) -> ExamSessionService {
        ExamSessionService::new(
            fixed_clock(),
            SessionIdentity::authenticated("token"),
            Backend::in_memory(repo),
        )
        .with_retry(RetryConfig::none())
    }

    #[tokio::test]
    async fn locked_answers_are_not_submitted() {
        let repo = InMemoryBackend::new()
            .with_questions(vec![question(1)])
            .with_answer(QuestionId::new(1), vec![0], None);
        let service = service(&repo);
        let session = service
            .start_session(&ExamConfig::new("AWS", "SAA-C03", ExamMode::Practice))
            .await
            .unwrap();

        assert!(service.select_answer(&session, QuestionId::new(1), 0).unwrap().queued);
        service.flush_submissions(&session).await.unwrap();

        let again = service.select_answer(&session, QuestionId::new(1), 0).unwrap();
        assert_eq!(again.change, AnswerChange::Updated(AnswerValue::Single(0)));
        service.flush_submissions(&session).await.unwrap();

        assert!(service
            .request_check(Arc::clone(&session), QuestionId::new(1))
            .await
            .unwrap());
        let locked = service.select_answer(&session, QuestionId::new(1), 2).unwrap();
        assert_eq!(locked.change, AnswerChange::Locked);
        assert!(!locked.queued);
        service.flush_submissions(&session).await.unwrap();
        assert_eq!(repo.calls().submit, 2);
    }

    #[tokio::test]
    async fn clearing_a_question_submits_an_empty_answer() {
        let multi = Question::multiple_choice(
            QuestionId::new(7),
            "Pick two",
            (0..4).map(QuestionOption::placeholder).collect(),
            2,
        )
        .unwrap();
        let repo = InMemoryBackend::new().with_questions(vec![multi]);
        let service = service(&repo);
        let session = service
            .start_session(&ExamConfig::new("AWS", "SAA-C03", ExamMode::Practice))
            .await
            .unwrap();

        service.select_answer(&session, QuestionId::new(7), 1).unwrap();
        let cleared = service.select_answer(&session, QuestionId::new(7), 1).unwrap();
        assert_eq!(cleared.change, AnswerChange::Cleared);
        assert!(cleared.queued);
        service.flush_submissions(&session).await.unwrap();

        let last = repo.submissions().pop().map(|(_, _, answer)| answer);
        assert_eq!(last, Some(AnswerValue::cleared()));

        service.select_answer(&session, QuestionId::new(7), 2).unwrap();
        assert!(service.clear_answer(&session, QuestionId::new(7)).unwrap());
        service.flush_submissions(&session).await.unwrap();
        let last = repo.submissions().pop().map(|(_, _, answer)| answer);
        assert_eq!(last, Some(AnswerValue::cleared()));
        assert_eq!(lock_session(&session).unwrap().answer(QuestionId::new(7)), None);
    }

    #[test]
    fn selection_without_runtime_skips_submission() {
        let repo = InMemoryBackend::new();
        let service = service(&repo);
        let mut controller = ExamSessionController::new(SessionContext {
            identity: SessionIdentity::anonymous(),
            clock: fixed_clock(),
        });
        controller
            .initialize(Exam::new(ExamId::new(1), ExamMode::Practice, vec![question(1)], 60))
            .unwrap();
        let session = Arc::new(Mutex::new(controller));

        let result = service.select_answer(&session, QuestionId::new(1), 3).unwrap();
        assert_eq!(result.change, AnswerChange::Updated(AnswerValue::Single(3)));
        assert!(!result.queued);
    }

    #[tokio::test]
    async fn dropped_session_ignores_late_oracle_response() {
        let repo = InMemoryBackend::new()
            .with_questions(vec![question(1)])
            .with_answer(QuestionId::new(1), vec![0], None);
        let service = service(&repo);
        let session = service
            .start_session(&ExamConfig::new("AWS", "SAA-C03", ExamMode::Practice))
            .await
            .unwrap();

        let mut check = Box::pin(service.request_check(Arc::clone(&session), QuestionId::new(1)));
        assert!(futures::poll!(&mut check).is_pending());
        drop(session);

        assert!(!check.await.unwrap());
        assert_eq!(repo.calls().oracle, 1);
    }
}
