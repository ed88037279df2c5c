use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::model::ids::{AttemptId, QuizId};
use crate::model::quiz::Quiz;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("correct count ({correct}) exceeds answered count ({answered})")]
    CorrectExceedsAnswered { correct: u32, answered: u32 },

    #[error("answered count ({answered}) exceeds question count ({total})")]
    AnsweredExceedsTotal { answered: u32, total: u32 },

    #[error("locked count ({locked}) exceeds answered count ({answered})")]
    LockedExceedsAnswered { locked: u32, answered: u32 },

    #[error("unknown completion reason: {0}")]
    UnknownReason(String),
}

/// Lifecycle of one attempt. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Active,
    Completed,
}

/// What drove the attempt into `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Advanced past the last question.
    Finished,
    /// Countdown reached zero.
    TimeExpired,
    /// Caller ended the attempt early.
    Forced,
}

impl CompletionReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionReason::Finished => "finished",
            CompletionReason::TimeExpired => "time_expired",
            CompletionReason::Forced => "forced",
        }
    }

    /// Parse the persisted label.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::UnknownReason` for labels not produced by `as_str`.
    pub fn from_label(label: &str) -> Result<Self, AttemptError> {
        match label {
            "finished" => Ok(Self::Finished),
            "time_expired" => Ok(Self::TimeExpired),
            "forced" => Ok(Self::Forced),
            other => Err(AttemptError::UnknownReason(other.to_owned())),
        }
    }
}

//
// ─── RESULT ────────────────────────────────────────────────────────────────────
//

/// Final tally of an attempt, computed once at completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResult {
    correct_count: u32,
    earned_points: u32,
    total_questions: u32,
    answered_count: u32,
    locked_count: u32,
}

impl AttemptResult {
    /// Score the given selections against `quiz`.
    ///
    /// Every recorded selection is scored, locked or not. Selections keyed by
    /// an index outside the quiz are ignored.
    #[must_use]
    pub fn score(
        quiz: &Quiz,
        selected: &BTreeMap<usize, usize>,
        locked: &BTreeSet<usize>,
    ) -> Self {
        let questions = quiz.questions();
        let correct = questions
            .iter()
            .enumerate()
            .filter(|(index, question)| {
                selected
                    .get(index)
                    .is_some_and(|option| question.is_correct(*option))
            })
            .count();
        let answered = selected.keys().filter(|i| **i < questions.len()).count();
        let locked = locked.iter().filter(|i| selected.contains_key(*i)).count();

        let total = saturating_u32(questions.len());
        let correct = saturating_u32(correct);
        Self {
            correct_count: correct,
            earned_points: earned_points(correct, total, quiz.points()),
            total_questions: total,
            answered_count: saturating_u32(answered),
            locked_count: saturating_u32(locked),
        }
    }

    /// Rehydrate a result from storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the counts are inconsistent with each other.
    pub fn from_persisted(
        correct_count: u32,
        earned_points: u32,
        total_questions: u32,
        answered_count: u32,
        locked_count: u32,
    ) -> Result<Self, AttemptError> {
        if answered_count > total_questions {
            return Err(AttemptError::AnsweredExceedsTotal {
                answered: answered_count,
                total: total_questions,
            });
        }
        if correct_count > answered_count {
            return Err(AttemptError::CorrectExceedsAnswered {
                correct: correct_count,
                answered: answered_count,
            });
        }
        if locked_count > answered_count {
            return Err(AttemptError::LockedExceedsAnswered {
                locked: locked_count,
                answered: answered_count,
            });
        }

        Ok(Self {
            correct_count,
            earned_points,
            total_questions,
            answered_count,
            locked_count,
        })
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn earned_points(&self) -> u32 {
        self.earned_points
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    /// Questions with a recorded selection, locked or not.
    #[must_use]
    pub fn answered_count(&self) -> u32 {
        self.answered_count
    }

    #[must_use]
    pub fn locked_count(&self) -> u32 {
        self.locked_count
    }
}

/// `round(correct / total * points)` with ties rounding up, in integer math.
#[must_use]
pub fn earned_points(correct: u32, total: u32, points: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let numerator = 2 * u64::from(correct) * u64::from(points) + u64::from(total);
    let denominator = 2 * u64::from(total);
    u32::try_from(numerator / denominator).unwrap_or(u32::MAX)
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

//
// ─── FEEDBACK / SUBMISSION ─────────────────────────────────────────────────────
//

/// Outcome shown to the user right after locking in an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerFeedback {
    pub question_index: usize,
    pub selected_option: usize,
    pub correct_option: usize,
    pub is_correct: bool,
}

/// Payload handed to a result submitter once an attempt completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSubmission {
    pub attempt_id: AttemptId,
    pub quiz_id: QuizId,
    /// Question index to chosen option index.
    pub answers: BTreeMap<usize, usize>,
    pub result: AttemptResult,
    pub reason: CompletionReason,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Acknowledgement returned by a result submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub accepted_at: DateTime<Utc>,
    /// Score reported back by the remote side, if it sent one.
    pub remote_score: Option<u32>,
    pub message: Option<String>,
}

impl SubmissionReceipt {
    #[must_use]
    pub fn accepted(at: DateTime<Utc>) -> Self {
        Self {
            accepted_at: at,
            remote_score: None,
            message: None,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::QuestionId;
    use crate::model::quiz::Question;

    fn quiz_with_answers(correct: &[usize], points: u32) -> Quiz {
        let questions = correct
            .iter()
            .enumerate()
            .map(|(i, answer)| {
                Question::new(
                    QuestionId::new(format!("q{i}")),
                    format!("Question {i}"),
                    vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    *answer,
                )
                .unwrap()
            })
            .collect();
        Quiz::new(QuizId::new("quiz"), "Quiz", points, questions).unwrap()
    }

    #[test]
    fn scores_three_of_four() {
        let quiz = quiz_with_answers(&[1, 0, 2, 3], 100);
        let selected: BTreeMap<usize, usize> = [(0, 1), (1, 0), (2, 2), (3, 1)].into();
        let locked: BTreeSet<usize> = [0, 1, 2, 3].into();

        let result = AttemptResult::score(&quiz, &selected, &locked);
        assert_eq!(result.correct_count(), 3);
        assert_eq!(result.earned_points(), 75);
        assert_eq!(result.total_questions(), 4);
        assert_eq!(result.answered_count(), 4);
        assert_eq!(result.locked_count(), 4);
    }

    #[test]
    fn unanswered_questions_never_count() {
        let quiz = quiz_with_answers(&[0, 0, 0], 30);
        let selected: BTreeMap<usize, usize> = [(1, 0)].into();
        let result = AttemptResult::score(&quiz, &selected, &BTreeSet::new());
        assert_eq!(result.correct_count(), 1);
        assert_eq!(result.earned_points(), 10);
        assert_eq!(result.answered_count(), 1);
        assert_eq!(result.locked_count(), 0);
    }

    #[test]
    fn rounding_ties_go_up() {
        assert_eq!(earned_points(1, 2, 5), 3);
        assert_eq!(earned_points(1, 3, 100), 33);
        assert_eq!(earned_points(2, 3, 100), 67);
        assert_eq!(earned_points(0, 4, 100), 0);
        assert_eq!(earned_points(4, 4, 100), 100);
        assert_eq!(earned_points(0, 0, 100), 0);
    }

    #[test]
    fn from_persisted_rejects_inconsistent_counts() {
        assert!(matches!(
            AttemptResult::from_persisted(3, 0, 4, 2, 2),
            Err(AttemptError::CorrectExceedsAnswered { .. })
        ));
        assert!(matches!(
            AttemptResult::from_persisted(0, 0, 1, 2, 0),
            Err(AttemptError::AnsweredExceedsTotal { .. })
        ));
        assert!(matches!(
            AttemptResult::from_persisted(0, 0, 3, 1, 2),
            Err(AttemptError::LockedExceedsAnswered { .. })
        ));
    }

    #[test]
    fn completion_reason_labels_roundtrip() {
        for reason in [
            CompletionReason::Finished,
            CompletionReason::TimeExpired,
            CompletionReason::Forced,
        ] {
            assert_eq!(CompletionReason::from_label(reason.as_str()).unwrap(), reason);
        }
        assert!(CompletionReason::from_label("paused").is_err());
    }
}
