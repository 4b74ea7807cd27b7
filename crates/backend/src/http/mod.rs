mod mapping;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use exam_core::model::{
    AnswerValue, Exam, ExamConfig, ExamId, ExamMode, ExamResult, QuestionId, QuestionOption,
};

use crate::config::ApiConfig;
use crate::gateway::{
    AnswerOracle, AnswerSink, ApiError, BackendHealth, ExamProvider, GradingService,
    OracleAnswer, PausePersistence, PauseSnapshot, QuestionProvider,
};
use crate::identity::SessionIdentity;

use mapping::{
    CreateExamRequest, ErrorBody, PauseRequest, SubmitAnswerRequest, WireExam, WireHealth,
    WireQuestionDetails, WireResults, decode_body,
};

/// REST adapter for every backend contract.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: ApiConfig,
    identity: SessionIdentity,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns `ApiError::Connection` if the TLS backend cannot be initialised.
    pub fn new(config: ApiConfig, identity: SessionIdentity) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            config,
            identity,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    #[must_use]
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let (name, value) = self.identity.header();
        self.client
            .request(method, self.config.endpoint(path))
            .header(name, value)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "backend response");

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.or(body.message))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = response.json().await?;
        decode_body(body)
    }

    /// Send a request whose response body carries no data we need.
    async fn send_unit(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        match self.send::<serde_json::Value>(builder).await {
            Ok(_) | Err(ApiError::Decode(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn question_details(
        &self,
        question_id: QuestionId,
        with_answers: bool,
    ) -> Result<WireQuestionDetails, ApiError> {
        let mut builder = self.request(Method::GET, &format!("/questions/{question_id}"));
        builder = if with_answers {
            builder.header("X-Include-Answers", "true")
        } else {
            builder.query(&[("includeAnswers", "true")])
        };
        self.send(builder).await
    }

    /// Call `GET /questions/health`. Never fails: an unreachable backend is reported
    /// as unavailable.
    pub async fn health(&self) -> BackendHealth {
        match self
            .send::<WireHealth>(self.request(Method::GET, "/questions/health"))
            .await
        {
            Ok(health) => BackendHealth {
                available: true,
                status: health.status.unwrap_or_else(|| "healthy".to_owned()),
            },
            Err(err) => {
                warn!(error = %err, "backend health check failed");
                BackendHealth {
                    available: false,
                    status: "unhealthy".to_owned(),
                }
            }
        }
    }
}

#[async_trait]
impl ExamProvider for HttpBackend {
    async fn create_exam(&self, config: &ExamConfig) -> Result<Exam, ApiError> {
        let path = if config.mode == ExamMode::FailedQuestions {
            "/exams/failed-questions"
        } else {
            "/exams"
        };
        let body = CreateExamRequest::from(config);
        let wire: WireExam = self
            .send(self.request(Method::POST, path).json(&body))
            .await?;
        Exam::try_from(wire)
    }

    async fn start_exam(&self, exam_id: ExamId) -> Result<Exam, ApiError> {
        let wire: WireExam = self
            .send(self.request(Method::POST, &format!("/exams/{exam_id}/start")))
            .await?;
        Exam::try_from(wire)
    }

    async fn cancel_exam(&self, exam_id: ExamId) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::POST, &format!("/exams/{exam_id}/cancel")))
            .await
    }
}

#[async_trait]
impl AnswerSink for HttpBackend {
    async fn submit_answer(
        &self,
        exam_id: ExamId,
        question_id: QuestionId,
        answer: &AnswerValue,
    ) -> Result<(), ApiError> {
        let body = SubmitAnswerRequest {
            question_id,
            answer,
        };
        self.send_unit(
            self.request(Method::POST, &format!("/exams/{exam_id}/answer"))
                .json(&body),
        )
        .await
    }
}

#[async_trait]
impl AnswerOracle for HttpBackend {
    async fn correct_answer(&self, question_id: QuestionId) -> Result<OracleAnswer, ApiError> {
        self.question_details(question_id, true)
            .await?
            .into_oracle_answer()
    }
}

#[async_trait]
impl GradingService for HttpBackend {
    async fn complete_exam(&self, exam_id: ExamId) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::POST, &format!("/exams/{exam_id}/complete")))
            .await
    }

    async fn results(&self, exam_id: ExamId) -> Result<ExamResult, ApiError> {
        let wire: WireResults = self
            .send(self.request(Method::GET, &format!("/exams/{exam_id}/results")))
            .await?;
        ExamResult::try_from(wire)
    }
}

#[async_trait]
impl QuestionProvider for HttpBackend {
    async fn question_options(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<QuestionOption>, ApiError> {
        Ok(self.question_details(question_id, false).await?.into_options())
    }
}

#[async_trait]
impl PausePersistence for HttpBackend {
    async fn pause_exam(&self, exam_id: ExamId, snapshot: &PauseSnapshot) -> Result<(), ApiError> {
        let body = PauseRequest::from(snapshot);
        self.send_unit(
            self.request(Method::POST, &format!("/exams/{exam_id}/pause"))
                .json(&body),
        )
        .await
    }
}
