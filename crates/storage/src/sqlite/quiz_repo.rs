use chrono::Utc;
use quiz_core::model::{Difficulty, Quiz, QuizId, QuizSummary};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{i64_from_usize, map_question_row, map_summary_row, ser, u32_from_i64};
use crate::repository::{QuizRepository, StorageError};

impl SqliteRepository {
    /// Insert or replace a quiz together with its questions.
    ///
    /// Existing questions for the quiz are replaced in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any statement fails.
    pub async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO quizzes (id, title, description, difficulty, points, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                difficulty = excluded.difficulty,
                points = excluded.points,
                updated_at = excluded.updated_at
            ",
        )
        .bind(quiz.id().as_str())
        .bind(quiz.title())
        .bind(quiz.description())
        .bind(quiz.difficulty().map(Difficulty::as_str))
        .bind(i64::from(quiz.points()))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM questions WHERE quiz_id = ?1")
            .bind(quiz.id().as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for (position, question) in quiz.questions().iter().enumerate() {
            let options = serde_json::to_string(question.options()).map_err(ser)?;
            sqlx::query(
                r"
                INSERT INTO questions (quiz_id, position, id, text, options, correct_option)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(quiz.id().as_str())
            .bind(i64_from_usize("position", position)?)
            .bind(question.id().as_str())
            .bind(question.text())
            .bind(options)
            .bind(i64_from_usize("correct_option", question.correct_option())?)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        tracing::debug!(
            quiz_id = %quiz.id(),
            questions = quiz.question_count(),
            "stored quiz"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn get_quiz(&self, id: &QuizId) -> Result<Quiz, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, title, description, difficulty, points
            FROM quizzes WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        let question_rows = sqlx::query(
            r"
            SELECT id, text, options, correct_option
            FROM questions
            WHERE quiz_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut questions = Vec::with_capacity(question_rows.len());
        for row in &question_rows {
            questions.push(map_question_row(row)?);
        }

        let points = u32_from_i64("points", row.try_get::<i64, _>("points").map_err(ser)?)?;
        let quiz = Quiz::new(
            QuizId::new(row.try_get::<String, _>("id").map_err(ser)?),
            row.try_get::<String, _>("title").map_err(ser)?,
            points,
            questions,
        )
        .map_err(ser)?
        .with_description(row.try_get("description").map_err(ser)?)
        .with_difficulty(
            row.try_get::<Option<String>, _>("difficulty")
                .map_err(ser)?
                .map(Difficulty::from),
        );
        Ok(quiz)
    }

    async fn list_quizzes(&self) -> Result<Vec<QuizSummary>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT q.id, q.title, q.description, q.difficulty, q.points,
                   (SELECT COUNT(*) FROM questions WHERE quiz_id = q.id) AS question_count
            FROM quizzes q
            ORDER BY q.title ASC, q.id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(map_summary_row(row)?);
        }
        Ok(out)
    }
}
