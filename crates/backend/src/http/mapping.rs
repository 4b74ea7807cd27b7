//! Wire DTOs of the REST backend and their conversion into core types.
//!
//! The backend is loose about field names and shapes; everything is normalized
//! here so the rest of the workspace only sees canonical core types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use exam_core::model::{
    AnswerValue, DEFAULT_TIME_LIMIT_MINUTES, Exam, ExamConfig, ExamId, ExamMode, ExamResult,
    ExamStatistics, Question, QuestionId, QuestionOption, QuestionResult,
};

use crate::gateway::{ApiError, OracleAnswer, PauseSnapshot};

//
// ─── ENVELOPE ──────────────────────────────────────────────────────────────────
//

/// `{success, data, error}` wrapper around most response bodies.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    error: Option<String>,
}

fn default_true() -> bool {
    true
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Payload of a 2xx body, wrapped in an envelope or sent bare.
///
/// A body without a non-null `data` field is read as the payload itself.
pub(crate) fn decode_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    match Envelope::deserialize(&body).ok() {
        Some(Envelope {
            success: false,
            error,
            ..
        }) => Err(ApiError::Status {
            status: 200,
            message: error.unwrap_or_else(|| "request failed".to_owned()),
        }),
        Some(Envelope {
            data: Some(data), ..
        }) => decode(data),
        _ => decode(body),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}

//
// ─── SHARED SHAPES ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Number(u64),
    Text(String),
}

impl WireId {
    fn value(&self) -> Result<u64, ApiError> {
        match self {
            WireId::Number(n) => Ok(*n),
            WireId::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ApiError::Decode(format!("non-numeric id `{s}`"))),
        }
    }
}

/// A correct answer sent either as one index or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    One(usize),
    Many(Vec<usize>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<usize> {
        match self {
            OneOrMany::One(i) => vec![i],
            OneOrMany::Many(list) => list,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireOption {
    Labeled { label: Option<String>, text: String },
    Plain(String),
}

fn map_options(options: Vec<WireOption>) -> Vec<QuestionOption> {
    options
        .into_iter()
        .enumerate()
        .map(|(index, option)| match option {
            WireOption::Labeled { label, text } => {
                QuestionOption::new(label.unwrap_or_else(|| QuestionOption::label_for(index)), text)
            }
            WireOption::Plain(text) => QuestionOption::new(QuestionOption::label_for(index), text),
        })
        .collect()
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireQuestion {
    pub id: WireId,
    #[serde(alias = "question", alias = "questionText")]
    pub text: String,
    #[serde(default)]
    pub options: Vec<WireOption>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    #[serde(alias = "is_multiple_choice")]
    pub is_multiple_choice: Option<bool>,
    #[serde(alias = "question_type")]
    pub question_type: Option<String>,
    #[serde(alias = "expected_answers")]
    pub expected_answers: Option<u32>,
}

fn is_multi(flag: Option<bool>, question_type: Option<&str>) -> bool {
    flag.unwrap_or(false) || question_type == Some("multiple_answer")
}

impl TryFrom<WireQuestion> for Question {
    type Error = ApiError;

    fn try_from(wire: WireQuestion) -> Result<Self, Self::Error> {
        let multi = is_multi(wire.is_multiple_choice, wire.question_type.as_deref());
        let expected = wire.expected_answers.unwrap_or(if multi { 2 } else { 1 });
        let mut question = Question::new(
            QuestionId::new(wire.id.value()?),
            wire.text,
            map_options(wire.options),
            multi,
            expected,
        )
        .map_err(exam_core::Error::from)?;
        if let Some(category) = wire.category {
            question = question.with_category(category);
        }
        if let Some(difficulty) = wire.difficulty {
            question = question.with_difficulty(difficulty);
        }
        Ok(question)
    }
}

/// `GET /questions/{id}` body; with answers included it doubles as the oracle response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireQuestionDetails {
    #[serde(default)]
    pub options: Vec<WireOption>,
    #[serde(
        alias = "correctAnswers",
        alias = "correct_answer",
        alias = "correct_answers"
    )]
    pub correct_answer: Option<OneOrMany>,
    pub explanation: Option<String>,
}

impl WireQuestionDetails {
    pub(crate) fn into_options(self) -> Vec<QuestionOption> {
        map_options(self.options)
    }

    pub(crate) fn into_oracle_answer(self) -> Result<OracleAnswer, ApiError> {
        let correct_answer = self
            .correct_answer
            .map(OneOrMany::into_vec)
            .ok_or_else(|| ApiError::Decode("question has no correct answer".to_owned()))?;
        Ok(OracleAnswer {
            correct_answer,
            explanation: self.explanation.filter(|e| !e.trim().is_empty()),
        })
    }
}

//
// ─── EXAMS ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireExam {
    pub id: WireId,
    pub title: Option<String>,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub certification: String,
    #[serde(default)]
    pub questions: Vec<WireQuestion>,
    /// Minutes.
    pub time_limit: Option<u32>,
    pub passing_score: Option<u32>,
    pub mode: Option<String>,
}

impl TryFrom<WireExam> for Exam {
    type Error = ApiError;

    fn try_from(wire: WireExam) -> Result<Self, Self::Error> {
        let mode = match wire.mode.as_deref() {
            Some(raw) => raw.parse::<ExamMode>().map_err(exam_core::Error::from)?,
            None => ExamMode::default(),
        };
        let questions = wire
            .questions
            .into_iter()
            .map(Question::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let seconds = wire
            .time_limit
            .unwrap_or(DEFAULT_TIME_LIMIT_MINUTES)
            .saturating_mul(60);

        let mut exam = Exam::new(ExamId::new(wire.id.value()?), mode, questions, seconds)
            .with_certification(wire.provider, wire.certification);
        if let Some(title) = wire.title.filter(|t| !t.trim().is_empty()) {
            exam = exam.with_title(title);
        }
        if let Some(score) = wire.passing_score {
            exam = exam
                .with_passing_score(score)
                .map_err(exam_core::Error::from)?;
        }
        Ok(exam)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct WireSettings {
    pub randomize_questions: bool,
    pub randomize_answers: bool,
    pub show_explanations: bool,
    pub allow_pause: bool,
    pub allow_review: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failed_questions_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateExamRequest<'a> {
    pub provider: &'a str,
    pub certification: &'a str,
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'a str>,
    pub settings: WireSettings,
}

impl<'a> From<&'a ExamConfig> for CreateExamRequest<'a> {
    fn from(config: &'a ExamConfig) -> Self {
        let failed = config.mode == ExamMode::FailedQuestions;
        let pausable = config.mode != ExamMode::Realistic;
        Self {
            provider: &config.provider,
            certification: &config.certification,
            mode: config.mode.as_str(),
            question_source: failed.then_some("failed_questions"),
            question_count: config.question_count,
            time_limit: config.time_limit_minutes,
            difficulty: config.difficulty.as_deref(),
            category: config.category.as_deref(),
            settings: WireSettings {
                randomize_questions: config.settings.randomize_questions,
                randomize_answers: config.settings.randomize_answers,
                show_explanations: config.settings.show_explanations,
                allow_pause: pausable,
                allow_review: pausable,
                failed_questions_only: failed,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitAnswerRequest<'a> {
    pub question_id: QuestionId,
    pub answer: &'a AnswerValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PauseRequest<'a> {
    pub current_question_index: usize,
    pub time_left: u32,
    pub answers: &'a BTreeMap<QuestionId, AnswerValue>,
    pub marked_for_review: &'a [QuestionId],
    pub checked_questions: &'a [QuestionId],
}

impl<'a> From<&'a PauseSnapshot> for PauseRequest<'a> {
    fn from(snapshot: &'a PauseSnapshot) -> Self {
        Self {
            current_question_index: snapshot.current_index,
            time_left: snapshot.remaining_seconds,
            answers: &snapshot.answers,
            marked_for_review: &snapshot.marked,
            checked_questions: &snapshot.checked,
        }
    }
}

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireStatistics {
    pub total_questions: u32,
    #[serde(default)]
    pub correct_answers: u32,
    #[serde(default)]
    pub incorrect_answers: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireExamSummary {
    pub score: f64,
    /// Minutes.
    pub time_spent: Option<f64>,
    pub statistics: WireStatistics,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireQuestionResult {
    pub question_id: WireId,
    pub is_correct: Option<bool>,
    #[serde(
        alias = "correctAnswers",
        alias = "correct_answer",
        alias = "correct_answers"
    )]
    pub correct_answer: Option<OneOrMany>,
    pub explanation: Option<String>,
    pub question_type: Option<String>,
}

impl TryFrom<WireQuestionResult> for QuestionResult {
    type Error = ApiError;

    fn try_from(wire: WireQuestionResult) -> Result<Self, Self::Error> {
        let multi = wire.question_type.as_deref() == Some("multiple_answer");
        let correct_answer = wire.correct_answer.and_then(|raw| {
            let indices = raw.into_vec();
            match indices.as_slice() {
                [] => None,
                [single] if !multi => Some(AnswerValue::Single(*single)),
                _ => Some(AnswerValue::Multiple(indices.into_iter().collect())),
            }
        });
        Ok(QuestionResult {
            question_id: QuestionId::new(wire.question_id.value()?),
            is_correct: wire.is_correct,
            correct_answer,
            explanation: wire.explanation,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireResults {
    #[serde(default)]
    pub passed: bool,
    pub exam_summary: WireExamSummary,
    #[serde(default)]
    pub question_results: Vec<WireQuestionResult>,
}

// Range and sign are checked before the cast.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn minutes_to_seconds(minutes: f64) -> u32 {
    if !minutes.is_finite() || minutes <= 0.0 {
        return 0;
    }
    (minutes * 60.0).round().min(f64::from(u32::MAX)) as u32
}

impl TryFrom<WireResults> for ExamResult {
    type Error = ApiError;

    fn try_from(wire: WireResults) -> Result<Self, Self::Error> {
        let summary = wire.exam_summary;
        let statistics = ExamStatistics::from_counts(
            summary.statistics.total_questions,
            summary.statistics.correct_answers,
            summary.statistics.incorrect_answers,
        );
        let question_results = wire
            .question_results
            .into_iter()
            .map(QuestionResult::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        ExamResult::new(
            summary.score,
            wire.passed,
            summary.time_spent.map_or(0, minutes_to_seconds),
            statistics,
            question_results,
        )
        .map_err(|e| ApiError::Invalid(e.into()))
    }
}

//
// ─── HEALTH ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireHealth {
    pub status: Option<String>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
