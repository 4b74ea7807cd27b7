use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use exam_core::model::{
    AnswerValue, Exam, ExamConfig, ExamId, ExamMode, ExamResult, ExamStatistics, Question,
    QuestionId, QuestionOption, QuestionResult,
};

use crate::gateway::{
    AnswerOracle, AnswerSink, ApiError, ExamProvider, GradingService, OracleAnswer,
    PausePersistence, PauseSnapshot, QuestionProvider,
};

/// Which contracts should fail on their next calls.
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct FailureSwitches {
    pub provider: bool,
    pub submit: bool,
    pub oracle: bool,
    pub grading: bool,
    pub options: bool,
    pub pause: bool,
}

/// How often each contract was hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: usize,
    pub start: usize,
    pub cancel: usize,
    pub submit: usize,
    pub oracle: usize,
    pub complete: usize,
    pub results: usize,
    pub options: usize,
    pub pause: usize,
}

#[derive(Debug, Default)]
struct State {
    question_bank: Vec<Question>,
    failed_bank: Vec<Question>,
    hidden_options: HashMap<QuestionId, Vec<QuestionOption>>,
    answer_key: HashMap<QuestionId, OracleAnswer>,
    exams: HashMap<ExamId, Exam>,
    next_exam_id: u64,
    submissions: Vec<(ExamId, QuestionId, AnswerValue)>,
    completed: Vec<ExamId>,
    cancelled: Vec<ExamId>,
    pauses: Vec<(ExamId, PauseSnapshot)>,
    failures: FailureSwitches,
    /// Submissions that time out before `failures.submit` is consulted.
    submit_timeouts: usize,
    calls: CallCounts,
}

/// Backend double holding everything in process memory.
///
/// Grades by comparing the latest submission per question with the answer key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ApiError> {
        self.state
            .lock()
            .map_err(|e| ApiError::Connection(e.to_string()))
    }

    fn lock_for_setup(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Questions handed out for practice and realistic exams.
    #[must_use]
    pub fn with_questions(self, questions: Vec<Question>) -> Self {
        self.lock_for_setup().question_bank = questions;
        self
    }

    /// Questions handed out for failed-questions exams.
    #[must_use]
    pub fn with_failed_questions(self, questions: Vec<Question>) -> Self {
        self.lock_for_setup().failed_bank = questions;
        self
    }

    /// Store the correct answer the oracle and the grader use.
    #[must_use]
    pub fn with_answer(
        self,
        question_id: QuestionId,
        correct_answer: Vec<usize>,
        explanation: Option<&str>,
    ) -> Self {
        self.lock_for_setup().answer_key.insert(
            question_id,
            OracleAnswer {
                correct_answer,
                explanation: explanation.map(str::to_owned),
            },
        );
        self
    }

    /// Options served by the question provider for a question delivered without them.
    #[must_use]
    pub fn with_hidden_options(self, question_id: QuestionId, options: Vec<QuestionOption>) -> Self {
        self.lock_for_setup()
            .hidden_options
            .insert(question_id, options);
        self
    }

    pub fn set_failures(&self, failures: FailureSwitches) {
        self.lock_for_setup().failures = failures;
    }

    /// Time out the next `count` answer submissions, then accept again.
    pub fn fail_next_submits(&self, count: usize) {
        self.lock_for_setup().submit_timeouts = count;
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.lock_for_setup().calls
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<(ExamId, QuestionId, AnswerValue)> {
        self.lock_for_setup().submissions.clone()
    }

    #[must_use]
    pub fn cancelled(&self) -> Vec<ExamId> {
        self.lock_for_setup().cancelled.clone()
    }

    #[must_use]
    pub fn pauses(&self) -> Vec<(ExamId, PauseSnapshot)> {
        self.lock_for_setup().pauses.clone()
    }
}

fn grade(state: &State, exam: &Exam) -> Result<ExamResult, ApiError> {
    let mut latest: HashMap<QuestionId, &AnswerValue> = HashMap::new();
    for (exam_id, question_id, answer) in &state.submissions {
        if *exam_id == exam.id() {
            latest.insert(*question_id, answer);
        }
    }
    latest.retain(|_, answer| !answer.is_empty());

    let mut correct = 0_u32;
    let mut incorrect = 0_u32;
    let mut question_results = Vec::with_capacity(exam.question_count());
    for question in exam.questions() {
        let key = state.answer_key.get(&question.id());
        let correct_answer = key.and_then(|k| AnswerValue::normalized(question, &k.correct_answer));
        let is_correct = match (latest.get(&question.id()), &correct_answer) {
            (Some(given), Some(expected)) => Some(given.matches(expected)),
            (Some(_), None) => Some(false),
            (None, _) => None,
        };
        match is_correct {
            Some(true) => correct += 1,
            Some(false) => incorrect += 1,
            None => {}
        }
        question_results.push(QuestionResult {
            question_id: question.id(),
            is_correct,
            correct_answer,
            explanation: key.and_then(|k| k.explanation.clone()),
        });
    }

    let total = u32::try_from(exam.question_count()).unwrap_or(u32::MAX);
    let score = if total == 0 {
        0.0
    } else {
        f64::from(correct) * 100.0 / f64::from(total)
    };
    let passed = score >= f64::from(exam.passing_score());
    ExamResult::new(
        score,
        passed,
        0,
        ExamStatistics::from_counts(total, correct, incorrect),
        question_results,
    )
    .map_err(|e| ApiError::Invalid(e.into()))
}

#[async_trait]
impl ExamProvider for InMemoryBackend {
    async fn create_exam(&self, config: &ExamConfig) -> Result<Exam, ApiError> {
        let mut state = self.lock()?;
        state.calls.create += 1;
        if state.failures.provider {
            return Err(ApiError::Unavailable("exam provider switched off".into()));
        }

        let bank = if config.mode == ExamMode::FailedQuestions {
            &state.failed_bank
        } else {
            &state.question_bank
        };
        let count = usize::try_from(config.effective_question_count()).unwrap_or(usize::MAX);
        let questions: Vec<Question> = bank.iter().take(count).cloned().collect();

        state.next_exam_id += 1;
        let exam = Exam::new(
            ExamId::new(state.next_exam_id),
            config.mode,
            questions,
            config.effective_time_limit_minutes().saturating_mul(60),
        )
        .with_certification(config.provider.clone(), config.certification.clone());
        state.exams.insert(exam.id(), exam.clone());
        Ok(exam)
    }

    async fn start_exam(&self, exam_id: ExamId) -> Result<Exam, ApiError> {
        let mut state = self.lock()?;
        state.calls.start += 1;
        if state.failures.provider {
            return Err(ApiError::Unavailable("exam provider switched off".into()));
        }
        state.exams.get(&exam_id).cloned().ok_or(ApiError::NotFound)
    }

    async fn cancel_exam(&self, exam_id: ExamId) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        state.calls.cancel += 1;
        if !state.exams.contains_key(&exam_id) {
            return Err(ApiError::NotFound);
        }
        state.cancelled.push(exam_id);
        Ok(())
    }
}

#[async_trait]
impl AnswerSink for InMemoryBackend {
    async fn submit_answer(
        &self,
        exam_id: ExamId,
        question_id: QuestionId,
        answer: &AnswerValue,
    ) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        state.calls.submit += 1;
        if state.submit_timeouts > 0 {
            state.submit_timeouts -= 1;
            return Err(ApiError::Timeout);
        }
        if state.failures.submit {
            return Err(ApiError::Timeout);
        }
        state.submissions.push((exam_id, question_id, answer.clone()));
        Ok(())
    }
}

#[async_trait]
impl AnswerOracle for InMemoryBackend {
    async fn correct_answer(&self, question_id: QuestionId) -> Result<OracleAnswer, ApiError> {
        {
            let mut state = self.lock()?;
            state.calls.oracle += 1;
        }
        // Let concurrent callers interleave like a real round trip would.
        tokio::task::yield_now().await;

        let state = self.lock()?;
        if state.failures.oracle {
            return Err(ApiError::Unavailable("oracle switched off".into()));
        }
        state
            .answer_key
            .get(&question_id)
            .cloned()
            .ok_or(ApiError::NotFound)
    }
}

#[async_trait]
impl GradingService for InMemoryBackend {
    async fn complete_exam(&self, exam_id: ExamId) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        state.calls.complete += 1;
        if state.failures.grading {
            return Err(ApiError::Status {
                status: 503,
                message: "grading switched off".into(),
            });
        }
        if !state.exams.contains_key(&exam_id) {
            return Err(ApiError::NotFound);
        }
        if !state.completed.contains(&exam_id) {
            state.completed.push(exam_id);
        }
        Ok(())
    }

    async fn results(&self, exam_id: ExamId) -> Result<ExamResult, ApiError> {
        let mut state = self.lock()?;
        state.calls.results += 1;
        if state.failures.grading {
            return Err(ApiError::Status {
                status: 503,
                message: "grading switched off".into(),
            });
        }
        if !state.completed.contains(&exam_id) {
            return Err(ApiError::NotFound);
        }
        let exam = state.exams.get(&exam_id).ok_or(ApiError::NotFound)?;
        grade(&state, exam)
    }
}

#[async_trait]
impl QuestionProvider for InMemoryBackend {
    async fn question_options(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<QuestionOption>, ApiError> {
        let mut state = self.lock()?;
        state.calls.options += 1;
        if state.failures.options {
            return Err(ApiError::Timeout);
        }
        state
            .hidden_options
            .get(&question_id)
            .cloned()
            .ok_or(ApiError::NotFound)
    }
}

#[async_trait]
impl PausePersistence for InMemoryBackend {
    async fn pause_exam(&self, exam_id: ExamId, snapshot: &PauseSnapshot) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        state.calls.pause += 1;
        if state.failures.pause {
            return Err(ApiError::Timeout);
        }
        state.pauses.push((exam_id, snapshot.clone()));
        Ok(())
    }
}
