mod answer;
mod exam;
mod ids;
mod question;
mod result;

pub use ids::{ExamId, ParseIdError, QuestionId};

pub use answer::{AnswerValue, CheckSource, CheckedAnswer, Correctness};
pub use exam::{
    DEFAULT_PASSING_SCORE, DEFAULT_QUESTION_COUNT, DEFAULT_TIME_LIMIT_MINUTES, Exam, ExamConfig,
    ExamConfigError, ExamError, ExamMode, ExamSettings, UnknownModeError,
};
pub use question::{Question, QuestionError, QuestionOption};
pub use result::{ExamResult, ExamResultError, ExamStatistics, QuestionResult};
