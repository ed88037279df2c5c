use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{AttemptSubmission, Quiz, QuizId, QuizSummary, SubmissionReceipt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage and remote adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("unauthorized")]
    Unauthorized,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },
}

/// Source of quiz definitions.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Fetch a full quiz by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_quiz(&self, id: &QuizId) -> Result<Quiz, StorageError>;

    /// List quizzes for a dashboard, without their questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the listing cannot be produced.
    async fn list_quizzes(&self) -> Result<Vec<QuizSummary>, StorageError>;
}

/// Receives completed attempts.
#[async_trait]
pub trait ResultSubmitter: Send + Sync {
    /// Persist or forward a completed attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt could not be accepted. Callers
    /// treat this as non-fatal for the local result.
    async fn submit(&self, submission: &AttemptSubmission)
    -> Result<SubmissionReceipt, StorageError>;
}

/// A submission as recorded by a local adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub id: i64,
    pub submission: AttemptSubmission,
    pub recorded_at: DateTime<Utc>,
}

/// Read access to locally recorded submissions (attempt history).
#[async_trait]
pub trait SubmissionLog: Send + Sync {
    /// List submissions newest first, optionally for one quiz.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the history cannot be read.
    async fn list_submissions(
        &self,
        quiz_id: Option<&QuizId>,
        limit: u32,
    ) -> Result<Vec<SubmissionRecord>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    quizzes: Arc<Mutex<HashMap<QuizId, Quiz>>>,
    submissions: Arc<Mutex<Vec<SubmissionRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a quiz definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn upsert_quiz(&self, quiz: Quiz) -> Result<(), StorageError> {
        let mut guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(quiz.id().clone(), quiz);
        Ok(())
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn get_quiz(&self, id: &QuizId) -> Result<Quiz, StorageError> {
        let guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_quizzes(&self) -> Result<Vec<QuizSummary>, StorageError> {
        let guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut out: Vec<_> = guard.values().map(Quiz::summary).collect();
        out.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}

#[async_trait]
impl ResultSubmitter for InMemoryRepository {
    async fn submit(
        &self,
        submission: &AttemptSubmission,
    ) -> Result<SubmissionReceipt, StorageError> {
        let mut guard = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let recorded_at = Utc::now();
        if guard
            .iter()
            .any(|r| r.submission.attempt_id == submission.attempt_id)
        {
            return Ok(SubmissionReceipt {
                message: Some("already recorded".into()),
                ..SubmissionReceipt::accepted(recorded_at)
            });
        }

        let id = i64::try_from(guard.len())
            .map_err(|e| StorageError::Serialization(e.to_string()))?
            + 1;
        guard.push(SubmissionRecord {
            id,
            submission: submission.clone(),
            recorded_at,
        });
        Ok(SubmissionReceipt {
            remote_score: Some(submission.result.earned_points()),
            ..SubmissionReceipt::accepted(recorded_at)
        })
    }
}

#[async_trait]
impl SubmissionLog for InMemoryRepository {
    async fn list_submissions(
        &self,
        quiz_id: Option<&QuizId>,
        limit: u32,
    ) -> Result<Vec<SubmissionRecord>, StorageError> {
        let guard = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard
            .iter()
            .rev()
            .filter(|r| quiz_id.is_none_or(|id| &r.submission.quiz_id == id))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub quizzes: Arc<dyn QuizRepository>,
    pub submitter: Arc<dyn ResultSubmitter>,
    pub submissions: Arc<dyn SubmissionLog>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(InMemoryRepository::new())
    }

    #[must_use]
    pub fn from_in_memory(repo: InMemoryRepository) -> Self {
        let quizzes: Arc<dyn QuizRepository> = Arc::new(repo.clone());
        let submitter: Arc<dyn ResultSubmitter> = Arc::new(repo.clone());
        let submissions: Arc<dyn SubmissionLog> = Arc::new(repo);
        Self {
            quizzes,
            submitter,
            submissions,
        }
    }
}
