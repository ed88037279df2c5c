use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{QuizRepository, ResultSubmitter, Storage, SubmissionLog};

mod mapping;
mod migrate;
mod quiz_repo;
mod submission_repo;

/// Quiz catalogue and local attempt history in one `SQLite` database.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Pool sizing. The terminal app and the seeder each need only a handful of
/// connections; the history writer and quiz reader share them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub busy_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolSettings {
    /// Defaults, with `QUIZ_DB_MAX_CONNECTIONS` applied when it holds a
    /// positive integer.
    #[must_use]
    pub fn from_env() -> Self {
        let max_connections = std::env::var("QUIZ_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|n| *n > 0);
        let defaults = Self::default();
        Self {
            max_connections: max_connections.unwrap_or(defaults.max_connections),
            ..defaults
        }
    }
}

impl SqliteRepository {
    /// Open the quiz database at `database_url` with settings from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL is invalid or the pool cannot
    /// open a connection.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        Self::connect_with(database_url, PoolSettings::from_env()).await
    }

    /// Open the quiz database with explicit pool settings.
    ///
    /// Foreign keys are enforced so deleting a quiz drops its questions.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL is invalid or the pool cannot
    /// open a connection.
    pub async fn connect_with(
        database_url: &str,
        settings: PoolSettings,
    ) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(settings.busy_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options)
            .await?;
        tracing::debug!(
            database_url,
            max_connections = settings.max_connections,
            "quiz database opened"
        );
        Ok(Self { pool })
    }

    /// Create the quiz, question and submission tables if missing.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Quizzes, submission and history all served from one `SQLite` file.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let repo = Arc::new(repo);
        let quizzes: Arc<dyn QuizRepository> = repo.clone();
        let submitter: Arc<dyn ResultSubmitter> = repo.clone();
        let submissions: Arc<dyn SubmissionLog> = repo;
        Ok(Self {
            quizzes,
            submitter,
            submissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteRepository>();
    }

    #[test]
    fn default_pool_is_small() {
        let settings = PoolSettings::default();
        assert_eq!(settings.max_connections, 5);
        assert_eq!(settings.busy_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn connect_with_custom_settings_and_migrate() {
        let settings = PoolSettings {
            max_connections: 1,
            ..PoolSettings::default()
        };
        let repo = SqliteRepository::connect_with(
            "sqlite:file:memdb_pool_settings?mode=memory&cache=shared",
            settings,
        )
        .await
        .unwrap();
        repo.migrate().await.unwrap();
        assert_eq!(repo.pool.size(), 1);
    }
}
