use std::collections::BTreeMap;

use quiz_core::model::{
    AttemptId, AttemptResult, AttemptSubmission, CompletionReason, Difficulty, Question,
    QuestionId, QuizId, QuizSummary,
};
use sqlx::Row;

use crate::repository::{StorageError, SubmissionRecord};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn usize_from_i64(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn i64_from_usize(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let options: Vec<String> =
        serde_json::from_str(&row.try_get::<String, _>("options").map_err(ser)?).map_err(ser)?;
    let correct = usize_from_i64(
        "correct_option",
        row.try_get::<i64, _>("correct_option").map_err(ser)?,
    )?;

    Question::new(
        QuestionId::new(row.try_get::<String, _>("id").map_err(ser)?),
        row.try_get::<String, _>("text").map_err(ser)?,
        options,
        correct,
    )
    .map_err(ser)
}

pub(crate) fn map_summary_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuizSummary, StorageError> {
    Ok(QuizSummary {
        id: QuizId::new(row.try_get::<String, _>("id").map_err(ser)?),
        title: row.try_get("title").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        difficulty: row
            .try_get::<Option<String>, _>("difficulty")
            .map_err(ser)?
            .map(Difficulty::from),
        points: u32_from_i64("points", row.try_get::<i64, _>("points").map_err(ser)?)?,
        question_count: usize_from_i64(
            "question_count",
            row.try_get::<i64, _>("question_count").map_err(ser)?,
        )?,
    })
}

/// Answers are stored as a JSON object keyed by question index.
pub(crate) fn answers_to_json(answers: &BTreeMap<usize, usize>) -> Result<String, StorageError> {
    serde_json::to_string(answers).map_err(ser)
}

fn answers_from_json(raw: &str) -> Result<BTreeMap<usize, usize>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn map_submission_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SubmissionRecord, StorageError> {
    let count = |field: &'static str| -> Result<u32, StorageError> {
        u32_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
    };

    let result = AttemptResult::from_persisted(
        count("correct_count")?,
        count("earned_points")?,
        count("total_questions")?,
        count("answered_count")?,
        count("locked_count")?,
    )
    .map_err(ser)?;

    let attempt_id: AttemptId = row
        .try_get::<String, _>("attempt_id")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let reason =
        CompletionReason::from_label(&row.try_get::<String, _>("reason").map_err(ser)?)
            .map_err(ser)?;

    Ok(SubmissionRecord {
        id: row.try_get("id").map_err(ser)?,
        submission: AttemptSubmission {
            attempt_id,
            quiz_id: QuizId::new(row.try_get::<String, _>("quiz_id").map_err(ser)?),
            answers: answers_from_json(&row.try_get::<String, _>("answers").map_err(ser)?)?,
            result,
            reason,
            started_at: row.try_get("started_at").map_err(ser)?,
            completed_at: row.try_get("completed_at").map_err(ser)?,
        },
        recorded_at: row.try_get("recorded_at").map_err(ser)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_json_uses_string_keys() {
        let answers: BTreeMap<usize, usize> = [(0, 2), (3, 1)].into();
        let raw = answers_to_json(&answers).unwrap();
        assert_eq!(raw, r#"{"0":2,"3":1}"#);
        assert_eq!(answers_from_json(&raw).unwrap(), answers);
    }

    #[test]
    fn negative_counts_are_rejected() {
        let err = u32_from_i64("points", -1).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
