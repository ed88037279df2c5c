use std::sync::Arc;

use quiz_core::model::{
    AttemptResult, AttemptSubmission, CompletionReason, QuizId, SubmissionReceipt,
};
use storage::repository::{QuizRepository, ResultSubmitter};

use super::engine::{Advance, QuizSession, Tick};
use crate::Clock;
use crate::error::SessionError;

/// Countdown given to a new attempt unless configured otherwise.
pub const DEFAULT_DURATION_SECS: u32 = 600;

/// How the one-time submission of a completed attempt went.
#[derive(Debug)]
pub enum SubmissionOutcome {
    Accepted(SubmissionReceipt),
    /// The local result stands; the caller may retry later.
    Failed(SessionError),
    /// The payload was already handed out by an earlier call.
    AlreadyDispatched,
}

impl SubmissionOutcome {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionOutcome::Accepted(_))
    }
}

/// Emitted by the call that completed an attempt.
#[derive(Debug)]
pub struct CompletionReport {
    pub result: AttemptResult,
    pub submission: SubmissionOutcome,
}

/// Result of `QuizSessionService::advance`.
#[derive(Debug)]
pub enum Step {
    Moved { index: usize },
    Completed(CompletionReport),
}

/// Orchestrates attempt start and submission for a single caller.
///
/// Holds no attempt state of its own: each `QuizSession` is owned by whoever
/// started it and passed back in by `&mut`.
#[derive(Clone)]
pub struct QuizSessionService {
    clock: Clock,
    quizzes: Arc<dyn QuizRepository>,
    submitter: Arc<dyn ResultSubmitter>,
    duration_secs: u32,
}

impl QuizSessionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        quizzes: Arc<dyn QuizRepository>,
        submitter: Arc<dyn ResultSubmitter>,
    ) -> Self {
        Self {
            clock,
            quizzes,
            submitter,
            duration_secs: DEFAULT_DURATION_SECS,
        }
    }

    #[must_use]
    pub fn with_duration_secs(mut self, duration_secs: u32) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Load a quiz and start an attempt on it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the quiz cannot be loaded, or the
    /// start errors of `QuizSession::start`.
    pub async fn start_attempt(&self, quiz_id: &QuizId) -> Result<QuizSession, SessionError> {
        let quiz = self.quizzes.get_quiz(quiz_id).await?;
        QuizSession::start(quiz, self.duration_secs, self.clock.now())
    }

    /// Advance the attempt, submitting it if this completes it.
    ///
    /// # Errors
    ///
    /// Returns the engine's `advance` errors. Submission failures are reported
    /// inside the returned `CompletionReport` instead.
    pub async fn advance(&self, session: &mut QuizSession) -> Result<Step, SessionError> {
        match session.advance(self.clock.now())? {
            Advance::Moved { index } => Ok(Step::Moved { index }),
            Advance::Completed(result) => Ok(Step::Completed(self.dispatch(session, result).await)),
        }
    }

    /// Feed one timer tick. Returns a report when the countdown expires.
    pub async fn tick(&self, session: &mut QuizSession) -> Option<CompletionReport> {
        match session.tick(self.clock.now()) {
            Tick::Expired(result) => Some(self.dispatch(session, result).await),
            Tick::Idle | Tick::Running { .. } => None,
        }
    }

    /// End the attempt early. Returns `None` if it was already complete.
    pub async fn finish(&self, session: &mut QuizSession) -> Option<CompletionReport> {
        let result = session.complete(CompletionReason::Forced, self.clock.now())?;
        Some(self.dispatch(session, result).await)
    }

    /// Send one submission. Never retried here.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submission` if the submitter rejects it.
    pub async fn submit(
        &self,
        submission: &AttemptSubmission,
    ) -> Result<SubmissionReceipt, SessionError> {
        self.submitter.submit(submission).await.map_err(|err| {
            tracing::warn!(
                attempt_id = %submission.attempt_id,
                quiz_id = %submission.quiz_id,
                error = %err,
                "result submission failed"
            );
            SessionError::Submission(err)
        })
    }

    /// Submit a completed attempt again after an earlier failure.
    ///
    /// Returns the stored receipt if a submission already succeeded.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` while the attempt is active, or
    /// `SessionError::Submission` if this attempt fails too.
    pub async fn retry_submission(
        &self,
        session: &mut QuizSession,
    ) -> Result<SubmissionReceipt, SessionError> {
        if let Some(receipt) = session.receipt() {
            return Ok(receipt.clone());
        }
        let payload = session.submission().ok_or(SessionError::NotCompleted)?;
        session.mark_dispatched();

        let receipt = self.submit(&payload).await?;
        session.record_receipt(receipt.clone());
        Ok(receipt)
    }

    async fn dispatch(&self, session: &mut QuizSession, result: AttemptResult) -> CompletionReport {
        let Some(payload) = session.take_submission() else {
            return CompletionReport {
                result,
                submission: SubmissionOutcome::AlreadyDispatched,
            };
        };

        let submission = match self.submit(&payload).await {
            Ok(receipt) => {
                tracing::info!(attempt_id = %payload.attempt_id, "result submitted");
                session.record_receipt(receipt.clone());
                SubmissionOutcome::Accepted(receipt)
            }
            Err(err) => SubmissionOutcome::Failed(err),
        };
        CompletionReport { result, submission }
    }
}
