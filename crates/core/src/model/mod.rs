mod attempt;
mod ids;
mod quiz;

pub use ids::{AttemptId, ParseIdError, QuestionId, QuizId};

pub use attempt::{
    AnswerFeedback, AttemptError, AttemptResult, AttemptStatus, AttemptSubmission,
    CompletionReason, SubmissionReceipt, earned_points,
};
pub use quiz::{Difficulty, MIN_OPTIONS, Question, Quiz, QuizError, QuizSummary};
