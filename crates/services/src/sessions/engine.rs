use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use quiz_core::model::{
    AnswerFeedback, AttemptId, AttemptResult, AttemptStatus, AttemptSubmission,
    CompletionReason, Question, Quiz, SubmissionReceipt,
};
use quiz_core::time::LOW_TIME_SECS;

use super::progress::SessionProgress;
use crate::error::SessionError;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// What `select_answer` did with the choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The choice is now the selection for the question.
    Recorded { index: usize, option: usize },
    /// The question is locked; its selection was left untouched.
    Locked { index: usize },
}

/// Result of a successful `advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved { index: usize },
    /// Advanced past the last question; this call completed the attempt.
    Completed(AttemptResult),
}

/// Result of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The attempt was already complete; nothing changed.
    Idle,
    Running { remaining_secs: u32 },
    /// The countdown reached zero on this tick and completed the attempt.
    Expired(AttemptResult),
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One attempt at a quiz, from start to completion.
///
/// Plain data mutated through `&mut self`, so callers get single-writer
/// semantics for free. Timestamps are passed in by the caller's clock.
///
/// Invariants held between calls:
/// - `current < quiz.question_count()`
/// - every locked question has a selection
/// - `remaining_secs` never increases
/// - once `Completed`, nothing but the stored receipt changes
pub struct QuizSession {
    attempt_id: AttemptId,
    quiz: Quiz,
    duration_secs: u32,
    current: usize,
    selected: BTreeMap<usize, usize>,
    locked: BTreeSet<usize>,
    remaining_secs: u32,
    status: AttemptStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    reason: Option<CompletionReason>,
    result: Option<AttemptResult>,
    dispatched: bool,
    receipt: Option<SubmissionReceipt>,
}

impl QuizSession {
    /// Begin an attempt at `quiz` with a countdown of `duration_secs`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidQuiz` if the quiz has no questions and
    /// `SessionError::InvalidDuration` if `duration_secs` is zero.
    pub fn start(
        quiz: Quiz,
        duration_secs: u32,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if quiz.question_count() == 0 {
            return Err(SessionError::InvalidQuiz);
        }
        if duration_secs == 0 {
            return Err(SessionError::InvalidDuration);
        }

        let attempt_id = AttemptId::generate();
        tracing::info!(
            %attempt_id,
            quiz_id = %quiz.id(),
            questions = quiz.question_count(),
            duration_secs,
            "attempt started"
        );

        Ok(Self {
            attempt_id,
            quiz,
            duration_secs,
            current: 0,
            selected: BTreeMap::new(),
            locked: BTreeSet::new(),
            remaining_secs: duration_secs,
            status: AttemptStatus::Active,
            started_at,
            completed_at: None,
            reason: None,
            result: None,
            dispatched: false,
            receipt: None,
        })
    }

    // ─── Queries ───────────────────────────────────────────────────────────────

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        &self.quiz.questions()[self.current]
    }

    #[must_use]
    pub fn selected_answer(&self, index: usize) -> Option<usize> {
        self.selected.get(&index).copied()
    }

    #[must_use]
    pub fn is_locked(&self, index: usize) -> bool {
        self.locked.contains(&index)
    }

    #[must_use]
    pub fn selected_answers(&self) -> &BTreeMap<usize, usize> {
        &self.selected
    }

    #[must_use]
    pub fn locked_questions(&self) -> &BTreeSet<usize> {
        &self.locked
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == AttemptStatus::Completed
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn result(&self) -> Option<AttemptResult> {
        self.result
    }

    #[must_use]
    pub fn completion_reason(&self) -> Option<CompletionReason> {
        self.reason
    }

    #[must_use]
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    /// Returns a summary of the current attempt progress.
    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let total = self.quiz.question_count();
        let is_last_question = self.current + 1 == total;
        let is_complete = self.is_complete();
        SessionProgress {
            position: self.current + 1,
            total,
            answered: self.selected.len(),
            locked: self.locked.len(),
            remaining_secs: self.remaining_secs,
            is_time_running_out: self.remaining_secs < LOW_TIME_SECS,
            is_last_question,
            can_go_previous: self.current > 0,
            can_go_next: !is_complete && !is_last_question && self.is_locked(self.current),
            is_complete,
        }
    }

    // ─── Answering ─────────────────────────────────────────────────────────────

    /// Select `option` for the current question, replacing any earlier choice.
    ///
    /// Selecting on a locked question is a no-op reported as `Selection::Locked`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the attempt is over, and
    /// `SessionError::OptionOutOfRange` if the question has no such option.
    pub fn select_answer(&mut self, option: usize) -> Result<Selection, SessionError> {
        self.ensure_active()?;
        let index = self.current;
        if self.is_locked(index) {
            return Ok(Selection::Locked { index });
        }

        let len = self.current_question().option_count();
        if option >= len {
            return Err(SessionError::OptionOutOfRange { option, len });
        }

        self.selected.insert(index, option);
        tracing::debug!(attempt_id = %self.attempt_id, index, option, "answer selected");
        Ok(Selection::Recorded { index, option })
    }

    /// Commit the current selection so it can no longer change.
    ///
    /// Locking an already locked question returns the same feedback again.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the attempt is over, and
    /// `SessionError::NoAnswerSelected` if nothing was selected yet.
    pub fn lock_current_answer(&mut self) -> Result<AnswerFeedback, SessionError> {
        self.ensure_active()?;
        let index = self.current;
        let selected_option = self
            .selected_answer(index)
            .ok_or(SessionError::NoAnswerSelected { index })?;

        if self.locked.insert(index) {
            tracing::debug!(attempt_id = %self.attempt_id, index, "answer locked");
        }

        let question = self.current_question();
        Ok(AnswerFeedback {
            question_index: index,
            selected_option,
            correct_option: question.correct_option(),
            is_correct: question.is_correct(selected_option),
        })
    }

    // ─── Navigation ────────────────────────────────────────────────────────────

    /// Move to the next question, or complete the attempt from the last one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the attempt is over, and
    /// `SessionError::NotLocked` if the current answer is not locked in.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<Advance, SessionError> {
        self.ensure_active()?;
        let index = self.current;
        if !self.is_locked(index) {
            return Err(SessionError::NotLocked { index });
        }

        if index + 1 < self.quiz.question_count() {
            self.current = index + 1;
            tracing::debug!(attempt_id = %self.attempt_id, index = self.current, "advanced");
            return Ok(Advance::Moved { index: self.current });
        }

        self.complete(CompletionReason::Finished, now)
            .map(Advance::Completed)
            .ok_or(SessionError::Completed)
    }

    /// Step back one question. Returns `false` at the first question.
    ///
    /// Allowed after completion so finished attempts can be reviewed.
    pub fn retreat(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.current -= 1;
        tracing::debug!(attempt_id = %self.attempt_id, index = self.current, "retreated");
        true
    }

    // ─── Timer ─────────────────────────────────────────────────────────────────

    /// Count down one second; completes the attempt when time runs out.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Tick {
        if self.is_complete() {
            return Tick::Idle;
        }

        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs > 0 {
            return Tick::Running {
                remaining_secs: self.remaining_secs,
            };
        }

        match self.complete(CompletionReason::TimeExpired, now) {
            Some(result) => Tick::Expired(result),
            None => Tick::Idle,
        }
    }

    // ─── Completion ────────────────────────────────────────────────────────────

    /// Move to `Completed` and score the attempt.
    ///
    /// Returns the result only on the call that performs the transition;
    /// every later call returns `None` and changes nothing.
    pub fn complete(
        &mut self,
        reason: CompletionReason,
        now: DateTime<Utc>,
    ) -> Option<AttemptResult> {
        if self.is_complete() {
            return None;
        }

        let result = AttemptResult::score(&self.quiz, &self.selected, &self.locked);
        self.status = AttemptStatus::Completed;
        self.completed_at = Some(now);
        self.reason = Some(reason);
        self.result = Some(result);

        tracing::info!(
            attempt_id = %self.attempt_id,
            quiz_id = %self.quiz.id(),
            reason = reason.as_str(),
            correct = result.correct_count(),
            total = result.total_questions(),
            earned_points = result.earned_points(),
            "attempt completed"
        );
        Some(result)
    }

    /// Hand out the submission payload. Only the first call after completion
    /// returns `Some`, which is what keeps dispatch at most once.
    pub fn take_submission(&mut self) -> Option<AttemptSubmission> {
        if self.dispatched {
            return None;
        }
        let submission = self.submission()?;
        self.dispatched = true;
        Some(submission)
    }

    /// The submission payload, without marking it dispatched.
    #[must_use]
    pub fn submission(&self) -> Option<AttemptSubmission> {
        Some(AttemptSubmission {
            attempt_id: self.attempt_id,
            quiz_id: self.quiz.id().clone(),
            answers: self.selected.clone(),
            result: self.result?,
            reason: self.reason?,
            started_at: self.started_at,
            completed_at: self.completed_at?,
        })
    }

    /// Flag the payload as handed out, for callers that read it through
    /// `submission` instead of `take_submission`.
    pub(crate) fn mark_dispatched(&mut self) {
        self.dispatched = true;
    }

    pub(crate) fn record_receipt(&mut self, receipt: SubmissionReceipt) {
        self.receipt = Some(receipt);
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.is_complete() {
            Err(SessionError::Completed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("attempt_id", &self.attempt_id)
            .field("quiz_id", self.quiz.id())
            .field("questions_len", &self.quiz.question_count())
            .field("current", &self.current)
            .field("selected_len", &self.selected.len())
            .field("locked_len", &self.locked.len())
            .field("remaining_secs", &self.remaining_secs)
            .field("status", &self.status)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
