use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Applies the schema for quizzes, their questions and recorded submissions.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if is_applied(pool, 1).await? {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS quizzes (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                difficulty TEXT,
                points INTEGER NOT NULL CHECK (points >= 0),
                updated_at TEXT NOT NULL
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    // `options` holds a JSON array of strings.
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS questions (
                quiz_id TEXT NOT NULL,
                position INTEGER NOT NULL CHECK (position >= 0),
                id TEXT NOT NULL,
                text TEXT NOT NULL,
                options TEXT NOT NULL,
                correct_option INTEGER NOT NULL CHECK (correct_option >= 0),
                PRIMARY KEY (quiz_id, position),
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    // No foreign key on quiz_id: attempts may come from quizzes served remotely.
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS submissions (
                id INTEGER PRIMARY KEY,
                attempt_id TEXT NOT NULL UNIQUE,
                quiz_id TEXT NOT NULL,
                answers TEXT NOT NULL,
                correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                earned_points INTEGER NOT NULL CHECK (earned_points >= 0),
                total_questions INTEGER NOT NULL CHECK (total_questions >= 0),
                answered_count INTEGER NOT NULL CHECK (answered_count >= 0),
                locked_count INTEGER NOT NULL CHECK (locked_count >= 0),
                reason TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE INDEX IF NOT EXISTS idx_submissions_quiz_completed
                ON submissions (quiz_id, completed_at);
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(1_i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(version = 1, "applied sqlite schema migration");

    Ok(())
}
