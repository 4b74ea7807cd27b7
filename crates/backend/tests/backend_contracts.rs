use std::time::Duration;

use backend::{ApiConfig, ApiError, Backend, InMemoryBackend, PauseSnapshot, SessionIdentity};
use exam_core::model::{
    AnswerValue, ExamConfig, ExamMode, Question, QuestionId, QuestionOption,
};

fn question(id: u64, options: usize) -> Question {
    let options = (0..options)
        .map(|i| QuestionOption::new(format!("{i}"), format!("answer {i}")))
        .collect();
    Question::single_choice(QuestionId::new(id), format!("Question {id}"), options).unwrap()
}

#[tokio::test]
async fn in_memory_backend_serves_every_contract() {
    let repo = InMemoryBackend::new()
        .with_questions(vec![question(1, 4), question(2, 0)])
        .with_failed_questions(vec![question(9, 3)])
        .with_answer(QuestionId::new(1), vec![3], Some("D is right"))
        .with_hidden_options(
            QuestionId::new(2),
            vec![QuestionOption::new("A", "late"), QuestionOption::new("B", "loaded")],
        );
    let backend = Backend::in_memory(&repo);

    let exam = backend
        .exams
        .create_exam(&ExamConfig::new("GCP", "ACE", ExamMode::Practice))
        .await
        .unwrap();
    let started = backend.exams.start_exam(exam.id()).await.unwrap();
    assert_eq!(started.question_count(), 2);

    let oracle = backend.oracle.correct_answer(QuestionId::new(1)).await.unwrap();
    assert_eq!(oracle.correct_answer, vec![3]);
    assert_eq!(oracle.explanation.as_deref(), Some("D is right"));

    let options = backend
        .questions
        .question_options(QuestionId::new(2))
        .await
        .unwrap();
    assert_eq!(options.len(), 2);

    backend
        .answers
        .submit_answer(exam.id(), QuestionId::new(1), &AnswerValue::Single(3))
        .await
        .unwrap();
    backend.grading.complete_exam(exam.id()).await.unwrap();
    let result = backend.grading.results(exam.id()).await.unwrap();
    assert_eq!(result.statistics().correct, 1);

    let snapshot = PauseSnapshot {
        current_index: 1,
        remaining_seconds: 42,
        answers: Default::default(),
        marked: vec![QuestionId::new(2)],
        checked: Vec::new(),
    };
    backend
        .pauses
        .as_ref()
        .unwrap()
        .pause_exam(exam.id(), &snapshot)
        .await
        .unwrap();
    assert_eq!(repo.pauses(), vec![(exam.id(), snapshot)]);
}

#[tokio::test]
async fn failed_questions_mode_draws_from_failed_bank() {
    let repo = InMemoryBackend::new()
        .with_questions(vec![question(1, 2)])
        .with_failed_questions(vec![question(7, 2), question(8, 2)]);
    let backend = Backend::in_memory(&repo);

    let exam = backend
        .exams
        .create_exam(&ExamConfig::new("AWS", "DVA-C02", ExamMode::FailedQuestions))
        .await
        .unwrap();
    let ids: Vec<u64> = exam.questions().iter().map(|q| q.id().value()).collect();
    assert_eq!(ids, vec![7, 8]);
}

#[tokio::test]
async fn unknown_exam_is_not_found() {
    let repo = InMemoryBackend::new();
    let backend = Backend::in_memory(&repo);
    let err = backend
        .exams
        .start_exam(exam_core::model::ExamId::new(404))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound));
}

#[test]
fn anonymous_http_backend_has_no_pause_persistence() {
    let config = ApiConfig::new(
        "http://127.0.0.1:9/api",
        Duration::from_secs(1),
        1,
        Duration::ZERO,
    )
    .unwrap();

    let guest = Backend::http(config.clone(), SessionIdentity::anonymous()).unwrap();
    assert!(guest.pauses.is_none());

    let user = Backend::http(config, SessionIdentity::authenticated("token")).unwrap();
    assert!(user.pauses.is_some());
}
