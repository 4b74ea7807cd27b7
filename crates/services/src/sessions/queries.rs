use tracing::{debug, info};

use backend::ExamProvider;
use exam_core::model::{Exam, ExamConfig, ExamMode};

use crate::error::SessionError;

/// Backend-backed session start helpers.
pub(crate) struct SessionQueries;

impl SessionQueries {
    /// Create and start an exam for `config`, returning the hydrated exam.
    ///
    /// The mode requested by the user wins over whatever the start response
    /// carries, since some backends omit it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Config` for an invalid request,
    /// `SessionError::NoFailedQuestions` when a failed-questions exam comes back
    /// empty, `SessionError::Empty` for any other empty exam and
    /// `SessionError::Api` when the provider fails.
    pub async fn start_from_provider(
        config: &ExamConfig,
        provider: &dyn ExamProvider,
    ) -> Result<Exam, SessionError> {
        config.validate()?;

        let created = provider.create_exam(config).await?;
        debug!(exam_id = %created.id(), "exam created");
        if created.question_count() == 0 {
            return Err(empty_error(config.mode));
        }

        let mut exam = provider.start_exam(created.id()).await?;
        if exam.question_count() == 0 {
            return Err(empty_error(config.mode));
        }
        if exam.mode() != config.mode {
            debug!(wire = %exam.mode(), requested = %config.mode, "overriding exam mode");
            exam = exam.with_mode(config.mode);
        }

        info!(
            exam_id = %exam.id(),
            provider = %config.provider,
            certification = %config.certification,
            "exam ready"
        );
        Ok(exam)
    }
}

fn empty_error(mode: ExamMode) -> SessionError {
    if mode == ExamMode::FailedQuestions {
        SessionError::NoFailedQuestions
    } else {
        SessionError::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use backend::{ApiError, FailureSwitches, InMemoryBackend};
    use exam_core::model::{Question, QuestionId, QuestionOption};

    fn question(id: u64) -> Question {
        Question::single_choice(
            QuestionId::new(id),
            format!("Q{id}"),
            (0..4).map(QuestionOption::placeholder).collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn starts_exam_with_requested_mode() {
        let repo = InMemoryBackend::new().with_questions(vec![question(1), question(2)]);
        let config = ExamConfig::new("AWS", "SAA-C03", ExamMode::Realistic);

        let exam = SessionQueries::start_from_provider(&config, &repo)
            .await
            .unwrap();
        assert_eq!(exam.mode(), ExamMode::Realistic);
        assert_eq!(exam.question_count(), 2);
    }

    #[tokio::test]
    async fn empty_failed_bank_is_reported() {
        let repo = InMemoryBackend::new().with_questions(vec![question(1)]);
        let config = ExamConfig::new("AWS", "SAA-C03", ExamMode::FailedQuestions);

        let err = SessionQueries::start_from_provider(&config, &repo)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoFailedQuestions));

        let practice = ExamConfig::new("AWS", "SAA-C03", ExamMode::Practice);
        let err = SessionQueries::start_from_provider(&practice, &InMemoryBackend::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Empty));
    }

    #[tokio::test]
    async fn invalid_config_never_reaches_provider() {
        let repo = InMemoryBackend::new().with_questions(vec![question(1)]);
        let config = ExamConfig::new(" ", "SAA-C03", ExamMode::Practice);

        let err = SessionQueries::start_from_provider(&config, &repo)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert_eq!(repo.calls().create, 0);
    }

    #[tokio::test]
    async fn provider_failure_is_propagated() {
        let repo = InMemoryBackend::new().with_questions(vec![question(1)]);
        repo.set_failures(FailureSwitches {
            provider: true,
            ..FailureSwitches::default()
        });
        let config = ExamConfig::new("GCP", "ACE", ExamMode::Practice);

        let err = SessionQueries::start_from_provider(&config, &repo)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Api(ApiError::Unavailable(_))));
    }
}
