use std::sync::Arc;
use std::time::Duration;

use quiz_core::model::{
    AnswerFeedback, AttemptId, AttemptResult, AttemptSubmission, CompletionReason, QuizId,
    SubmissionReceipt,
};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::{Advance, QuizSession, Selection, Tick};
use super::progress::SessionProgress;
use super::workflow::QuizSessionService;
use crate::error::SessionError;

/// Default cadence of the countdown.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Notifications published while an attempt runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Tick { remaining_secs: u32 },
    Completed {
        result: AttemptResult,
        reason: CompletionReason,
    },
    Submitted(SubmissionReceipt),
    SubmissionFailed { message: String },
}

#[derive(Clone)]
struct Shared {
    session: Arc<Mutex<QuizSession>>,
    service: QuizSessionService,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Shared {
    fn publish(&self, event: SessionEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.events.send(event);
    }

    /// Publish completion and submit the payload, if this caller got it.
    ///
    /// The session lock is not held while the submitter runs, so user input
    /// and ticks are never blocked on the network.
    async fn finalize(
        &self,
        result: AttemptResult,
        reason: CompletionReason,
        payload: Option<AttemptSubmission>,
    ) {
        self.publish(SessionEvent::Completed { result, reason });
        let Some(payload) = payload else {
            return;
        };

        match self.service.submit(&payload).await {
            Ok(receipt) => {
                self.session.lock().await.record_receipt(receipt.clone());
                tracing::info!(attempt_id = %payload.attempt_id, "result submitted");
                self.publish(SessionEvent::Submitted(receipt));
            }
            Err(err) => self.publish(SessionEvent::SubmissionFailed {
                message: err.to_string(),
            }),
        }
    }
}

/// A running attempt: the session behind one lock plus its countdown task.
///
/// Every trigger (user input or timer) goes through the same mutex, so
/// completion and submission happen at most once even when the last
/// `advance` and the final tick arrive together.
pub struct AttemptHandle {
    attempt_id: AttemptId,
    quiz_id: QuizId,
    shared: Shared,
    ticker: Option<JoinHandle<()>>,
}

impl AttemptHandle {
    /// Start the countdown for `session`, ticking once per `period`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(
        service: QuizSessionService,
        session: QuizSession,
        period: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let attempt_id = session.attempt_id();
        let quiz_id = session.quiz().id().clone();
        let shared = Shared {
            session: Arc::new(Mutex::new(session)),
            service,
            events,
        };
        let ticker = tokio::spawn(run_ticker(shared.clone(), period));

        (
            Self {
                attempt_id,
                quiz_id,
                shared,
                ticker: Some(ticker),
            },
            rx,
        )
    }

    /// Load `quiz_id` through `service` and start running it.
    ///
    /// # Errors
    ///
    /// Returns the errors of `QuizSessionService::start_attempt`.
    pub async fn start(
        service: QuizSessionService,
        quiz_id: &QuizId,
        period: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        let session = service.start_attempt(quiz_id).await?;
        Ok(Self::spawn(service, session, period))
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn quiz_id(&self) -> &QuizId {
        &self.quiz_id
    }

    /// # Errors
    ///
    /// See `QuizSession::select_answer`.
    pub async fn select_answer(&self, option: usize) -> Result<Selection, SessionError> {
        self.shared.session.lock().await.select_answer(option)
    }

    /// # Errors
    ///
    /// See `QuizSession::lock_current_answer`.
    pub async fn lock_current_answer(&self) -> Result<AnswerFeedback, SessionError> {
        self.shared.session.lock().await.lock_current_answer()
    }

    /// Advance; submits the attempt if this completes it.
    ///
    /// # Errors
    ///
    /// See `QuizSession::advance`.
    pub async fn advance(&self) -> Result<Advance, SessionError> {
        let (advance, payload) = {
            let mut session = self.shared.session.lock().await;
            let advance = session.advance(self.shared.service.clock().now())?;
            (advance, session.take_submission())
        };

        if let Advance::Completed(result) = advance {
            self.shared
                .finalize(result, CompletionReason::Finished, payload)
                .await;
        }
        Ok(advance)
    }

    /// Submit the completed attempt again after `SessionEvent::SubmissionFailed`.
    ///
    /// Publishes `Submitted` on success. Returns the stored receipt without
    /// contacting the submitter if an earlier submission already went through.
    ///
    /// # Errors
    ///
    /// See `QuizSessionService::retry_submission`.
    pub async fn retry_submission(&self) -> Result<SubmissionReceipt, SessionError> {
        let mut session = self.shared.session.lock().await;
        if let Some(receipt) = session.receipt() {
            return Ok(receipt.clone());
        }
        let receipt = self.shared.service.retry_submission(&mut session).await?;
        drop(session);

        tracing::info!(attempt_id = %self.attempt_id, "result submitted on retry");
        self.shared.publish(SessionEvent::Submitted(receipt.clone()));
        Ok(receipt)
    }

    pub async fn retreat(&self) -> bool {
        self.shared.session.lock().await.retreat()
    }

    /// End the attempt now. Returns `None` if it had already completed.
    pub async fn finish(&self) -> Option<AttemptResult> {
        let (result, payload) = {
            let mut session = self.shared.session.lock().await;
            let result = session.complete(
                CompletionReason::Forced,
                self.shared.service.clock().now(),
            )?;
            (result, session.take_submission())
        };

        self.shared
            .finalize(result, CompletionReason::Forced, payload)
            .await;
        Some(result)
    }

    pub async fn progress(&self) -> SessionProgress {
        self.shared.session.lock().await.progress()
    }

    pub async fn result(&self) -> Option<AttemptResult> {
        self.shared.session.lock().await.result()
    }

    pub async fn receipt(&self) -> Option<SubmissionReceipt> {
        self.shared.session.lock().await.receipt().cloned()
    }

    /// Read the session under its lock.
    pub async fn inspect<R>(&self, f: impl FnOnce(&QuizSession) -> R) -> R {
        f(&*self.shared.session.lock().await)
    }

    /// Stop the countdown and discard the attempt without completing it.
    ///
    /// Nothing is submitted, whatever state the attempt was in.
    pub fn abandon(mut self) {
        self.stop_ticker();
        tracing::info!(
            attempt_id = %self.attempt_id,
            quiz_id = %self.quiz_id,
            "attempt abandoned"
        );
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for AttemptHandle {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

async fn run_ticker(shared: Shared, period: Duration) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let (tick, payload) = {
            let mut session = shared.session.lock().await;
            let tick = session.tick(shared.service.clock().now());
            let payload = match tick {
                Tick::Expired(_) => session.take_submission(),
                Tick::Idle | Tick::Running { .. } => None,
            };
            (tick, payload)
        };

        match tick {
            Tick::Running { remaining_secs } => {
                shared.publish(SessionEvent::Tick { remaining_secs });
            }
            Tick::Expired(result) => {
                // Detached so that dropping the handle cannot cut the submission short.
                let shared = shared.clone();
                tokio::spawn(async move {
                    shared
                        .finalize(result, CompletionReason::TimeExpired, payload)
                        .await;
                });
                return;
            }
            Tick::Idle => return,
        }
    }
}
