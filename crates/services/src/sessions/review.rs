use serde::Serialize;

use exam_core::model::{
    AnswerValue, Correctness, Exam, ExamId, ExamMode, ExamResult, ExamStatistics, Question,
    QuestionId, QuestionOption, QuestionResult,
};
use exam_core::{AnswerLedger, ReviewFlagRegistry};

use super::controller::ResultStatus;

/// Minimum number of placeholder options (`A`..`D`).
const MIN_PLACEHOLDER_OPTIONS: usize = 4;

/// One question as shown on the review screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewQuestion {
    pub question_id: QuestionId,
    pub text: String,
    pub category: String,
    pub difficulty: String,
    pub options: Vec<QuestionOption>,
    /// Options were never delivered and have been synthesized.
    pub placeholder_options: bool,
    pub is_multiple_choice: bool,
    pub expected_answers: u32,
    pub user_answer: Option<AnswerValue>,
    pub is_answered: bool,
    pub correct_answer: Option<AnswerValue>,
    pub correctness: Correctness,
    pub explanation: Option<String>,
    pub was_marked: bool,
    pub was_checked: bool,
}

/// Progress on a failed-questions retry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FailedQuestionsProgress {
    pub improved: usize,
    pub still_struggling: usize,
    /// Percent of questions now answered correctly.
    pub improvement_rate: f64,
}

impl FailedQuestionsProgress {
    // Question counts convert to f64 exactly.
    #[allow(clippy::cast_precision_loss)]
    fn from_questions(questions: &[ReviewQuestion]) -> Self {
        let improved = questions
            .iter()
            .filter(|q| q.correctness == Correctness::Correct)
            .count();
        let total = questions.len();
        let improvement_rate = if total == 0 {
            0.0
        } else {
            improved as f64 * 100.0 / total as f64
        };
        Self {
            improved,
            still_struggling: total - improved,
            improvement_rate,
        }
    }

    /// More questions improved than remain difficult.
    #[must_use]
    pub fn is_improving(&self) -> bool {
        self.improved > self.still_struggling
    }
}

/// Everything the review screen needs, merged from exam, answers, flags and grading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewPayload {
    pub exam_id: ExamId,
    pub title: String,
    pub mode: ExamMode,
    pub passing_score: u32,
    pub questions: Vec<ReviewQuestion>,
    pub answered: usize,
    pub marked: usize,
    pub checked: usize,
    pub time_spent_seconds: u32,
    /// Grading data; `None` while pending or unavailable.
    pub score: Option<f64>,
    pub passed: Option<bool>,
    pub statistics: Option<ExamStatistics>,
    pub result_unavailable: Option<String>,
    pub failed_questions: Option<FailedQuestionsProgress>,
}

impl ReviewPayload {
    pub(crate) fn assemble(
        exam: &Exam,
        ledger: &AnswerLedger,
        flags: &ReviewFlagRegistry,
        result: Option<&ResultStatus>,
        local_time_spent: u32,
    ) -> Self {
        let graded = match result {
            Some(ResultStatus::Graded(result)) => Some(result),
            _ => None,
        };

        let questions: Vec<ReviewQuestion> = exam
            .questions()
            .iter()
            .map(|question| {
                let graded_question = graded.and_then(|r| r.question_result(question.id()));
                review_question(question, ledger, flags, graded_question)
            })
            .collect();

        let failed_questions = (exam.mode() == ExamMode::FailedQuestions)
            .then(|| FailedQuestionsProgress::from_questions(&questions));

        let time_spent_seconds = graded
            .map(ExamResult::time_spent_seconds)
            .filter(|seconds| *seconds > 0)
            .unwrap_or(local_time_spent);

        Self {
            exam_id: exam.id(),
            title: exam.title().to_owned(),
            mode: exam.mode(),
            passing_score: exam.passing_score(),
            answered: questions.iter().filter(|q| q.is_answered).count(),
            marked: questions.iter().filter(|q| q.was_marked).count(),
            checked: questions.iter().filter(|q| q.was_checked).count(),
            questions,
            time_spent_seconds,
            score: graded.map(ExamResult::score),
            passed: graded.map(ExamResult::passed),
            statistics: graded.map(ExamResult::statistics),
            result_unavailable: match result {
                Some(ResultStatus::Unavailable { reason }) => Some(reason.clone()),
                _ => None,
            },
            failed_questions,
        }
    }

    #[must_use]
    pub fn question(&self, question_id: QuestionId) -> Option<&ReviewQuestion> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }
}

fn review_question(
    question: &Question,
    ledger: &AnswerLedger,
    flags: &ReviewFlagRegistry,
    graded: Option<&QuestionResult>,
) -> ReviewQuestion {
    let id = question.id();
    let user_answer = ledger.get(id).cloned();
    let checked = flags.checked(id);

    let checked_answer = checked.and_then(|c| c.correct_answer.clone());
    let correct_answer = checked_answer
        .clone()
        .or_else(|| graded.and_then(|g| g.correct_answer.clone()));

    let correctness = match (&user_answer, &checked_answer) {
        (None, _) => Correctness::Unknown,
        (Some(_), Some(_)) => flags.is_correct(id, user_answer.as_ref()),
        (Some(_), None) => graded.map_or(Correctness::Unknown, |g| Correctness::from_bool(g.is_correct)),
    };

    let explanation = checked
        .map(|c| c.explanation.clone())
        .or_else(|| graded.and_then(|g| g.explanation.clone()));

    let (options, placeholder_options) = if question.has_options() {
        (question.options().to_vec(), false)
    } else {
        (
            placeholder_options(user_answer.as_ref(), correct_answer.as_ref()),
            true,
        )
    };

    ReviewQuestion {
        question_id: id,
        text: question.text().to_owned(),
        category: question.category().to_owned(),
        difficulty: question.difficulty().to_owned(),
        options,
        placeholder_options,
        is_multiple_choice: question.is_multiple_choice(),
        expected_answers: question.expected_answers(),
        is_answered: user_answer.is_some(),
        user_answer,
        correct_answer,
        correctness,
        explanation,
        was_marked: flags.is_marked(id),
        was_checked: checked.is_some(),
    }
}

/// `A, B, C, D, ...` covering every index referenced by either answer.
fn placeholder_options(
    user_answer: Option<&AnswerValue>,
    correct_answer: Option<&AnswerValue>,
) -> Vec<QuestionOption> {
    let count = [user_answer, correct_answer]
        .into_iter()
        .flatten()
        .filter_map(AnswerValue::max_index)
        .map(|max| max + 1)
        .fold(MIN_PLACEHOLDER_OPTIONS, usize::max);
    (0..count).map(QuestionOption::placeholder).collect()
}
