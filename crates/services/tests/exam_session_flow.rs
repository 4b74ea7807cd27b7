use std::sync::Arc;
use std::time::Duration;

use backend::{FailureSwitches, InMemoryBackend, SessionIdentity};
use exam_core::model::{
    AnswerValue, Correctness, ExamConfig, ExamMode, ExamResult, Question, QuestionId,
    QuestionOption,
};
use exam_core::time::fixed_clock;
use services::session::{NO_EXPLANATION, lock_session};
use services::{
    AppServices, ExamSessionService, ResultStatus, RetryConfig, SessionError, SessionState,
    SharedSession, TickOutcome,
};

fn q(id: u64) -> QuestionId {
    QuestionId::new(id)
}

fn with_options(id: u64) -> Question {
    Question::single_choice(
        q(id),
        format!("Question {id}"),
        (0..4).map(QuestionOption::placeholder).collect(),
    )
    .unwrap()
}

fn without_options(id: u64) -> Question {
    Question::single_choice(q(id), format!("Question {id}"), Vec::new()).unwrap()
}

fn repo() -> InMemoryBackend {
    InMemoryBackend::new()
        .with_questions(vec![with_options(1), without_options(2), with_options(3)])
        .with_failed_questions(vec![with_options(11), with_options(12)])
        .with_answer(q(1), vec![2], Some("C is the managed option"))
        .with_answer(q(2), vec![1], None)
        .with_answer(q(3), vec![0], None)
        .with_hidden_options(
            q(2),
            vec![
                QuestionOption::new("A", "Cloud Storage"),
                QuestionOption::new("B", "BigQuery"),
            ],
        )
}

fn service(repo: &InMemoryBackend, identity: SessionIdentity) -> ExamSessionService {
    AppServices::in_memory(repo, identity, fixed_clock())
        .sessions()
        .as_ref()
        .clone()
        .with_retry(RetryConfig {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            jitter_max: None,
        })
}

async fn start(service: &ExamSessionService, mode: ExamMode) -> SharedSession {
    service
        .start_session(&ExamConfig::new("GCP", "ACE", mode).with_time_limit_minutes(1))
        .await
        .unwrap()
}

async fn answer(service: &ExamSessionService, session: &SharedSession, id: u64, option: usize) {
    service.select_answer(session, q(id), option).unwrap();
    service.flush_submissions(session).await.unwrap();
}

fn graded(session: &SharedSession) -> ExamResult {
    match lock_session(session).unwrap().result_status() {
        Some(ResultStatus::Graded(result)) => result.clone(),
        other => panic!("expected a graded result, got {other:?}"),
    }
}

fn state(session: &SharedSession) -> SessionState {
    lock_session(session).unwrap().state()
}

#[tokio::test]
async fn practice_session_runs_to_review() {
    let repo = repo();
    let service = service(&repo, SessionIdentity::authenticated("token"));
    let session = start(&service, ExamMode::Practice).await;

    answer(&service, &session, 1, 2).await;
    answer(&service, &session, 2, 0).await;
    assert!(service.request_check(Arc::clone(&session), q(1)).await.unwrap());
    lock_session(&session).unwrap().toggle_mark(q(3)).unwrap();

    assert!(service.request_completion(Arc::clone(&session)).await.unwrap());
    assert!(!service.request_completion(Arc::clone(&session)).await.unwrap());

    let payload = service.review_payload(Arc::clone(&session)).await.unwrap();
    assert_eq!(payload.answered, 2);
    assert_eq!(payload.marked, 1);
    assert_eq!(payload.checked, 1);
    assert_eq!(payload.passed, Some(false));

    let first = payload.question(q(1)).unwrap();
    assert_eq!(first.correctness, Correctness::Correct);
    assert_eq!(first.explanation.as_deref(), Some("C is the managed option"));

    let second = payload.question(q(2)).unwrap();
    assert!(!second.placeholder_options);
    assert_eq!(second.options.len(), 2);
    assert_eq!(second.correctness, Correctness::Incorrect);

    let third = payload.question(q(3)).unwrap();
    assert!(third.was_marked);
    assert!(!third.is_answered);
    assert_eq!(third.correctness, Correctness::Unknown);

    assert_eq!(repo.calls().options, 1);
    assert_eq!(repo.calls().complete, 1);
}

#[tokio::test]
async fn concurrent_checks_hit_the_oracle_once() {
    let repo = repo();
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::Practice).await;
    answer(&service, &session, 1, 0).await;

    let (first, second) = tokio::join!(
        service.request_check(Arc::clone(&session), q(1)),
        service.request_check(Arc::clone(&session), q(1)),
    );
    assert_ne!(first.unwrap(), second.unwrap());
    assert_eq!(repo.calls().oracle, 1);

    let controller = lock_session(&session).unwrap();
    assert!(controller.is_checked(q(1)));
    assert_eq!(controller.is_correct(q(1)), Correctness::Incorrect);
}

#[tokio::test]
async fn oracle_failure_marks_checked_with_unknown_correctness() {
    let repo = repo();
    repo.set_failures(FailureSwitches {
        oracle: true,
        ..FailureSwitches::default()
    });
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::Practice).await;
    answer(&service, &session, 3, 0).await;

    assert!(service.request_check(Arc::clone(&session), q(3)).await.unwrap());
    let controller = lock_session(&session).unwrap();
    assert!(controller.is_checked(q(3)));
    assert_eq!(controller.is_correct(q(3)), Correctness::Unknown);
}

#[tokio::test]
async fn unexplained_answers_get_the_default_text() {
    let repo = repo();
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::Practice).await;

    assert!(service.request_check(Arc::clone(&session), q(3)).await.unwrap());
    let controller = lock_session(&session).unwrap();
    assert_eq!(controller.checked(q(3)).unwrap().explanation, NO_EXPLANATION);
}

#[tokio::test]
async fn realistic_mode_refuses_checks() {
    let repo = repo();
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::Realistic).await;

    let err = service
        .request_check(Arc::clone(&session), q(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::CapabilityDenied(_)));
    assert_eq!(repo.calls().oracle, 0);
}

#[tokio::test]
async fn grading_failure_completes_and_can_be_retried() {
    let repo = repo();
    repo.set_failures(FailureSwitches {
        grading: true,
        ..FailureSwitches::default()
    });
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::Practice).await;
    answer(&service, &session, 1, 2).await;

    assert!(service.request_completion(Arc::clone(&session)).await.unwrap());
    assert_eq!(state(&session), SessionState::Completed);
    assert!(matches!(
        lock_session(&session).unwrap().result_status(),
        Some(ResultStatus::Unavailable { .. })
    ));
    let payload = service.review_payload(Arc::clone(&session)).await.unwrap();
    assert!(payload.result_unavailable.is_some());
    assert_eq!(payload.score, None);

    repo.set_failures(FailureSwitches::default());
    assert!(service.retry_grading(Arc::clone(&session)).await.unwrap());
    assert_eq!(graded(&session).statistics().correct, 1);
}

#[tokio::test]
async fn timer_expiry_completes_exactly_once() {
    let repo = repo();
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::Practice).await;
    answer(&service, &session, 1, 2).await;

    let mut ticks = 0;
    loop {
        ticks += 1;
        match service.tick(Arc::clone(&session)).await.unwrap() {
            TickOutcome::Running(_) => {}
            TickOutcome::Expired(ticket) => {
                assert!(ticket.is_forced());
                break;
            }
            TickOutcome::Idle => panic!("session stopped counting"),
        }
    }
    assert_eq!(ticks, 60);
    assert_eq!(
        service.tick(Arc::clone(&session)).await.unwrap(),
        TickOutcome::Idle
    );
    assert!(!service.force_completion(Arc::clone(&session)).await.unwrap());

    assert_eq!(state(&session), SessionState::Completed);
    assert_eq!(graded(&session).statistics().correct, 1);
    assert_eq!(repo.calls().complete, 1);

    let payload = service.review_payload(Arc::clone(&session)).await.unwrap();
    assert_eq!(payload.answered, 1);
    assert!(payload.question(q(1)).unwrap().is_answered);
    for unanswered in [q(2), q(3)] {
        let question = payload.question(unanswered).unwrap();
        assert!(!question.is_answered);
        assert_eq!(question.correctness, Correctness::Unknown);
    }
}

#[tokio::test]
async fn paused_sessions_are_force_completed_on_timeout() {
    let repo = repo();
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::Practice).await;

    assert!(lock_session(&session).unwrap().toggle_pause().unwrap());
    let err = service
        .request_completion(Arc::clone(&session))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Paused));

    assert!(service.force_completion(Arc::clone(&session)).await.unwrap());
    assert_eq!(state(&session), SessionState::Completed);
}

#[tokio::test]
async fn transient_submission_failures_are_retried() {
    let repo = repo();
    repo.set_failures(FailureSwitches {
        submit: true,
        ..FailureSwitches::default()
    });
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::Practice).await;

    answer(&service, &session, 1, 1).await;
    assert_eq!(repo.calls().submit, 3);
    assert!(repo.submissions().is_empty());
    assert_eq!(
        lock_session(&session).unwrap().answer(q(1)),
        Some(&AnswerValue::Single(1))
    );
}

#[tokio::test]
async fn completion_waits_for_answers_still_being_submitted() {
    let repo = repo();
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::Practice).await;

    let result = service.select_answer(&session, q(1), 2).unwrap();
    assert!(result.queued);
    assert!(service.request_completion(Arc::clone(&session)).await.unwrap());

    let statistics = graded(&session).statistics();
    assert_eq!(statistics.correct, 1);
    assert_eq!(statistics.unanswered, 2);
}

#[tokio::test]
async fn cleared_multi_choice_answer_is_graded_unanswered() {
    let pick_two = Question::multiple_choice(
        q(4),
        "Pick two",
        (0..4).map(QuestionOption::placeholder).collect(),
        2,
    )
    .unwrap();
    let repo = InMemoryBackend::new()
        .with_questions(vec![pick_two])
        .with_answer(q(4), vec![0, 1], None);
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::Practice).await;

    service.select_answer(&session, q(4), 0).unwrap();
    service.select_answer(&session, q(4), 0).unwrap();
    assert!(service.request_completion(Arc::clone(&session)).await.unwrap());

    let statistics = graded(&session).statistics();
    assert_eq!(statistics.correct, 0);
    assert_eq!(statistics.incorrect, 0);
    assert_eq!(statistics.unanswered, 1);
    let payload = service.review_payload(Arc::clone(&session)).await.unwrap();
    assert_eq!(payload.answered, 0);
}

#[tokio::test]
async fn backend_ends_on_the_latest_answer_after_a_retry() {
    let repo = repo();
    let service = service(&repo, SessionIdentity::anonymous()).with_retry(RetryConfig {
        max_attempts: 3,
        base_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(20),
        jitter_max: None,
    });
    let session = start(&service, ExamMode::Practice).await;

    repo.fail_next_submits(1);
    service.select_answer(&session, q(1), 0).unwrap();
    tokio::task::yield_now().await;
    service.select_answer(&session, q(1), 2).unwrap();
    assert!(service.request_completion(Arc::clone(&session)).await.unwrap());

    let sent: Vec<AnswerValue> = repo
        .submissions()
        .into_iter()
        .map(|(_, _, answer)| answer)
        .collect();
    assert_eq!(sent, vec![AnswerValue::Single(2)]);
    assert_eq!(graded(&session).statistics().correct, 1);
}

#[tokio::test]
async fn save_and_exit_needs_login_and_pausable_mode() {
    let repo = repo();

    let guest = service(&repo, SessionIdentity::anonymous());
    let session = start(&guest, ExamMode::Practice).await;
    let err = guest.save_and_exit(Arc::clone(&session)).await.unwrap_err();
    assert!(matches!(err, SessionError::SaveNotAllowed));
    assert_eq!(state(&session), SessionState::Active);

    let user = service(&repo, SessionIdentity::authenticated("token"));
    let realistic = start(&user, ExamMode::Realistic).await;
    let err = user.save_and_exit(Arc::clone(&realistic)).await.unwrap_err();
    assert!(matches!(err, SessionError::SaveNotAllowed));

    let practice = start(&user, ExamMode::Practice).await;
    answer(&user, &practice, 1, 3).await;
    lock_session(&practice).unwrap().go_to_question(2).unwrap();
    user.save_and_exit(Arc::clone(&practice)).await.unwrap();

    assert_eq!(state(&practice), SessionState::Abandoned);
    let pauses = repo.pauses();
    assert_eq!(pauses.len(), 1);
    assert_eq!(pauses[0].1.current_index, 2);
    assert_eq!(pauses[0].1.answers.get(&q(1)), Some(&AnswerValue::Single(3)));
    assert!(repo.cancelled().is_empty());
}

#[tokio::test]
async fn exit_cancels_only_unfinished_exams() {
    let repo = repo();
    let service = service(&repo, SessionIdentity::anonymous());

    let running = start(&service, ExamMode::Practice).await;
    let running_id = lock_session(&running).unwrap().exam_id().unwrap();
    service.exit(Arc::clone(&running)).await.unwrap();
    assert_eq!(state(&running), SessionState::Abandoned);

    let finished = start(&service, ExamMode::Practice).await;
    service.request_completion(Arc::clone(&finished)).await.unwrap();
    service.exit(Arc::clone(&finished)).await.unwrap();

    assert_eq!(repo.cancelled(), vec![running_id]);
}

#[tokio::test]
async fn unavailable_options_fall_back_to_placeholders() {
    let repo = repo();
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::Practice).await;
    answer(&service, &session, 2, 5).await;
    service.request_completion(Arc::clone(&session)).await.unwrap();

    repo.set_failures(FailureSwitches {
        options: true,
        ..FailureSwitches::default()
    });
    let payload = service.review_payload(Arc::clone(&session)).await.unwrap();
    let bare = payload.question(q(2)).unwrap();
    assert!(bare.placeholder_options);
    assert_eq!(bare.options.len(), 6);
    assert_eq!(bare.options[5].label, "F");
}

#[tokio::test]
async fn failed_questions_mode_uses_its_own_bank_and_duration() {
    let repo = repo();
    let service = service(&repo, SessionIdentity::anonymous());
    let session = start(&service, ExamMode::FailedQuestions).await;
    {
        let controller = lock_session(&session).unwrap();
        assert_eq!(controller.exam().unwrap().question_count(), 2);
        assert_eq!(controller.remaining_seconds(), 600);
    }
    answer(&service, &session, 11, 0).await;
    service.request_completion(Arc::clone(&session)).await.unwrap();
    let payload = service.review_payload(Arc::clone(&session)).await.unwrap();
    assert!(payload.failed_questions.is_some());

    let empty = InMemoryBackend::new().with_questions(vec![with_options(1)]);
    let service = self::service(&empty, SessionIdentity::anonymous());
    let err = service
        .start_session(&ExamConfig::new("GCP", "ACE", ExamMode::FailedQuestions))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NoFailedQuestions));
}
