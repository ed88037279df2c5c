use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{QuestionId, QuizId};

/// Smallest number of options a question may offer.
pub const MIN_OPTIONS: usize = 2;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz title cannot be empty")]
    EmptyTitle,

    #[error("question {question} has empty text")]
    EmptyQuestionText { question: QuestionId },

    #[error("question {question} needs at least {MIN_OPTIONS} options, got {len}")]
    TooFewOptions { question: QuestionId, len: usize },

    #[error("question {question} marks option {index} as correct but only has {len} options")]
    CorrectOptionOutOfRange {
        question: QuestionId,
        index: usize,
        len: usize,
    },
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Difficulty label attached to a quiz by its author.
///
/// The backend treats this as free text, so unknown labels are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Other(String),
}

impl Difficulty {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
            Difficulty::Other(label) => label,
        }
    }
}

impl FromStr for Difficulty {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "medium" => Difficulty::Medium,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Other(trimmed.to_owned()),
        })
    }
}

impl From<String> for Difficulty {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(difficulty) => difficulty,
            Err(never) => match never {},
        }
    }
}

impl From<Difficulty> for String {
    fn from(value: Difficulty) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question with exactly one correct option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<String>,
    correct_option: usize,
}

impl Question {
    /// Build a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` if the text is blank, fewer than two options are
    /// given, or `correct_option` is out of range. Option text is not checked.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<String>,
        correct_option: usize,
    ) -> Result<Self, QuizError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuizError::EmptyQuestionText { question: id });
        }
        if options.len() < MIN_OPTIONS {
            return Err(QuizError::TooFewOptions {
                question: id,
                len: options.len(),
            });
        }
        if correct_option >= options.len() {
            return Err(QuizError::CorrectOptionOutOfRange {
                question: id,
                index: correct_option,
                len: options.len(),
            });
        }

        Ok(Self {
            id,
            text,
            options,
            correct_option,
        })
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub fn correct_option(&self) -> usize {
        self.correct_option
    }

    #[must_use]
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct_option
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// Quiz definition as loaded from a repository. Immutable once built.
///
/// An empty question list is representable here; sessions refuse to start on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    id: QuizId,
    title: String,
    description: Option<String>,
    difficulty: Option<Difficulty>,
    points: u32,
    questions: Vec<Question>,
}

impl Quiz {
    /// Build a quiz from already validated questions.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyTitle` if the title is blank.
    pub fn new(
        id: QuizId,
        title: impl Into<String>,
        points: u32,
        questions: Vec<Question>,
    ) -> Result<Self, QuizError> {
        let title = title.into();
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(QuizError::EmptyTitle);
        }

        Ok(Self {
            id,
            title: trimmed.to_owned(),
            description: None,
            difficulty: None,
            points,
            questions,
        })
    }

    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());
        self
    }

    #[must_use]
    pub fn with_difficulty(mut self, difficulty: Option<Difficulty>) -> Self {
        self.difficulty = difficulty;
        self
    }

    #[must_use]
    pub fn id(&self) -> &QuizId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn difficulty(&self) -> Option<&Difficulty> {
        self.difficulty.as_ref()
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn summary(&self) -> QuizSummary {
        QuizSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            difficulty: self.difficulty.clone(),
            points: self.points,
            question_count: self.questions.len(),
        }
    }
}

/// Dashboard listing entry for a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSummary {
    pub id: QuizId,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub points: u32,
    pub question_count: usize,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn options(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn question_requires_two_options() {
        let err = Question::new(QuestionId::new("q1"), "Pick", options(&["only"]), 0).unwrap_err();
        assert!(matches!(err, QuizError::TooFewOptions { len: 1, .. }));
    }

    #[test]
    fn question_rejects_out_of_range_answer() {
        let err =
            Question::new(QuestionId::new("q1"), "Pick", options(&["a", "b"]), 2).unwrap_err();
        assert!(matches!(
            err,
            QuizError::CorrectOptionOutOfRange { index: 2, len: 2, .. }
        ));
    }

    #[test]
    fn question_rejects_blank_text() {
        let err = Question::new(QuestionId::new("q1"), "  ", options(&["a", "b"]), 0).unwrap_err();
        assert!(matches!(err, QuizError::EmptyQuestionText { .. }));
    }

    #[test]
    fn question_accepts_blank_option_text() {
        let question =
            Question::new(QuestionId::new("q1"), "Pick", options(&["", "b"]), 1).unwrap();
        assert_eq!(question.options()[0], "");
        assert_eq!(question.correct_option(), 1);
    }

    #[test]
    fn quiz_allows_empty_question_list() {
        let quiz = Quiz::new(QuizId::new("empty"), "Nothing here", 10, Vec::new()).unwrap();
        assert_eq!(quiz.question_count(), 0);
    }

    #[test]
    fn quiz_rejects_blank_title() {
        let err = Quiz::new(QuizId::new("x"), "   ", 10, Vec::new()).unwrap_err();
        assert_eq!(err, QuizError::EmptyTitle);
    }

    #[test]
    fn summary_counts_questions() {
        let q = Question::new(QuestionId::new("q1"), "2+2?", options(&["3", "4"]), 1).unwrap();
        let quiz = Quiz::new(QuizId::new("math"), " Math ", 50, vec![q])
            .unwrap()
            .with_description(Some("  ".into()))
            .with_difficulty(Some(Difficulty::Easy));
        let summary = quiz.summary();
        assert_eq!(summary.title, "Math");
        assert_eq!(summary.question_count, 1);
        assert_eq!(summary.description, None);
        assert_eq!(summary.difficulty, Some(Difficulty::Easy));
    }

    #[test]
    fn difficulty_keeps_unknown_labels() {
        let parsed: Difficulty = "HARD".parse().unwrap();
        assert_eq!(parsed, Difficulty::Hard);
        let other: Difficulty = "Nightmare".parse().unwrap();
        assert_eq!(other.as_str(), "Nightmare");
    }
}
