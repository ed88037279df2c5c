use chrono::Utc;
use quiz_core::model::{AttemptSubmission, QuizId, SubmissionReceipt};

use super::SqliteRepository;
use super::mapping::{answers_to_json, map_submission_row};
use crate::repository::{ResultSubmitter, StorageError, SubmissionLog, SubmissionRecord};

#[async_trait::async_trait]
impl ResultSubmitter for SqliteRepository {
    async fn submit(
        &self,
        submission: &AttemptSubmission,
    ) -> Result<SubmissionReceipt, StorageError> {
        let result = &submission.result;
        let recorded_at = Utc::now();

        let res = sqlx::query(
            r"
                INSERT INTO submissions (
                    attempt_id, quiz_id, answers,
                    correct_count, earned_points, total_questions, answered_count, locked_count,
                    reason, started_at, completed_at, recorded_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(attempt_id) DO NOTHING
            ",
        )
        .bind(submission.attempt_id.to_string())
        .bind(submission.quiz_id.as_str())
        .bind(answers_to_json(&submission.answers)?)
        .bind(i64::from(result.correct_count()))
        .bind(i64::from(result.earned_points()))
        .bind(i64::from(result.total_questions()))
        .bind(i64::from(result.answered_count()))
        .bind(i64::from(result.locked_count()))
        .bind(submission.reason.as_str())
        .bind(submission.started_at)
        .bind(submission.completed_at)
        .bind(recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            tracing::debug!(attempt_id = %submission.attempt_id, "submission already recorded");
            return Ok(SubmissionReceipt {
                message: Some("already recorded".into()),
                ..SubmissionReceipt::accepted(recorded_at)
            });
        }

        tracing::info!(
            attempt_id = %submission.attempt_id,
            quiz_id = %submission.quiz_id,
            earned_points = result.earned_points(),
            "recorded submission"
        );
        Ok(SubmissionReceipt {
            remote_score: Some(result.earned_points()),
            ..SubmissionReceipt::accepted(recorded_at)
        })
    }
}

#[async_trait::async_trait]
impl SubmissionLog for SqliteRepository {
    async fn list_submissions(
        &self,
        quiz_id: Option<&QuizId>,
        limit: u32,
    ) -> Result<Vec<SubmissionRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, attempt_id, quiz_id, answers,
                       correct_count, earned_points, total_questions, answered_count, locked_count,
                       reason, started_at, completed_at, recorded_at
                FROM submissions
                WHERE ?1 IS NULL OR quiz_id = ?1
                ORDER BY completed_at DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(quiz_id.map(QuizId::as_str))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(map_submission_row(row)?);
        }
        Ok(out)
    }
}
