use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::model::{
    AttemptSubmission, CompletionReason, Question, QuestionId, Quiz, QuizId, SubmissionReceipt,
};
use quiz_core::time::fixed_now;
use services::{
    Advance, AttemptHandle, Clock, QuizSession, QuizSessionService, SessionError, SessionEvent,
    TICK_PERIOD,
};
use storage::repository::{InMemoryRepository, ResultSubmitter, StorageError};
use tokio::sync::mpsc::UnboundedReceiver;

/// Counts calls and fails while `failing` is set.
#[derive(Default)]
struct CountingSubmitter {
    calls: AtomicUsize,
    failing: AtomicBool,
}

#[async_trait]
impl ResultSubmitter for CountingSubmitter {
    async fn submit(
        &self,
        _submission: &AttemptSubmission,
    ) -> Result<SubmissionReceipt, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("backend unreachable".into()));
        }
        Ok(SubmissionReceipt::accepted(fixed_now()))
    }
}

fn build_quiz(correct: &[usize]) -> Quiz {
    let questions = correct
        .iter()
        .enumerate()
        .map(|(i, answer)| {
            Question::new(
                QuestionId::new(format!("q{i}")),
                format!("Question {i}"),
                vec!["a".into(), "b".into(), "c".into()],
                *answer,
            )
            .unwrap()
        })
        .collect();
    Quiz::new(QuizId::new("quiz"), "Quiz", 10, questions).unwrap()
}

fn spawn(
    correct: &[usize],
    duration_secs: u32,
) -> (AttemptHandle, UnboundedReceiver<SessionEvent>, Arc<CountingSubmitter>) {
    spawn_with(correct, duration_secs, Arc::new(CountingSubmitter::default()))
}

fn spawn_with(
    correct: &[usize],
    duration_secs: u32,
    submitter: Arc<CountingSubmitter>,
) -> (AttemptHandle, UnboundedReceiver<SessionEvent>, Arc<CountingSubmitter>) {
    let service = QuizSessionService::new(
        Clock::fixed(fixed_now()),
        Arc::new(InMemoryRepository::new()),
        submitter.clone(),
    );
    let session = QuizSession::start(build_quiz(correct), duration_secs, fixed_now()).unwrap();
    let (handle, rx) = AttemptHandle::spawn(service, session, TICK_PERIOD);
    (handle, rx, submitter)
}

#[tokio::test(start_paused = true)]
async fn countdown_expires_and_submits_once() {
    let (handle, mut rx, submitter) = spawn(&[0, 1], 3);
    handle.select_answer(0).await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let done = matches!(event, SessionEvent::Submitted(_));
        events.push(event);
        if done {
            break;
        }
    }

    assert_eq!(events[0], SessionEvent::Tick { remaining_secs: 2 });
    assert_eq!(events[1], SessionEvent::Tick { remaining_secs: 1 });
    let SessionEvent::Completed { result, reason } = &events[2] else {
        panic!("expected completion, got {:?}", events[2]);
    };
    assert_eq!(*reason, CompletionReason::TimeExpired);
    assert_eq!(result.correct_count(), 1);
    assert_eq!(result.locked_count(), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);
    assert!(handle.receipt().await.is_some());
    assert_eq!(handle.progress().await.remaining_secs, 0);
}

#[tokio::test(start_paused = true)]
async fn last_advance_alongside_final_tick_submits_once() {
    let (handle, mut rx, submitter) = spawn(&[1], 1);
    handle.select_answer(1).await.unwrap();
    handle.lock_current_answer().await.unwrap();

    let (advance, ()) = tokio::join!(handle.advance(), tokio::time::sleep(TICK_PERIOD));
    tokio::time::sleep(Duration::from_secs(3)).await;

    let completions = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|e| matches!(e, SessionEvent::Completed { .. }))
        .count();
    assert_eq!(completions, 1);
    assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);

    // Whichever trigger won, the other saw a completed attempt.
    match advance {
        Ok(Advance::Completed(result)) => assert_eq!(result.correct_count(), 1),
        Err(err) => assert!(matches!(err, SessionError::Completed)),
        Ok(Advance::Moved { .. }) => panic!("single question cannot move"),
    }
}

#[tokio::test(start_paused = true)]
async fn final_tick_before_last_advance_rejects_the_advance() {
    let (handle, mut rx, submitter) = spawn(&[1], 1);
    handle.select_answer(1).await.unwrap();
    handle.lock_current_answer().await.unwrap();

    tokio::time::sleep(TICK_PERIOD * 2).await;
    let err = handle.advance().await.unwrap_err();
    assert!(matches!(err, SessionError::Completed));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);
    let reasons: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|e| match e {
            SessionEvent::Completed { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, [CompletionReason::TimeExpired]);
}

#[tokio::test(start_paused = true)]
async fn failed_submission_can_be_retried_through_the_handle() {
    let submitter = Arc::new(CountingSubmitter::default());
    submitter.failing.store(true, Ordering::SeqCst);
    let (handle, mut rx, submitter) = spawn_with(&[0], 600, submitter);

    handle.select_answer(0).await.unwrap();
    handle.lock_current_answer().await.unwrap();
    assert!(matches!(handle.advance().await.unwrap(), Advance::Completed(_)));
    assert!(handle.receipt().await.is_none());
    let failed = std::iter::from_fn(|| rx.try_recv().ok())
        .any(|e| matches!(e, SessionEvent::SubmissionFailed { .. }));
    assert!(failed);

    submitter.failing.store(false, Ordering::SeqCst);
    let receipt = handle.retry_submission().await.unwrap();
    assert_eq!(handle.receipt().await, Some(receipt.clone()));
    assert!(matches!(rx.try_recv(), Ok(SessionEvent::Submitted(r)) if r == receipt));

    assert_eq!(handle.retry_submission().await.unwrap(), receipt);
    assert_eq!(submitter.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_before_completion_is_rejected() {
    let (handle, _rx, submitter) = spawn(&[0, 1], 600);
    let err = handle.retry_submission().await.unwrap_err();
    assert!(matches!(err, SessionError::NotCompleted));
    assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn user_flow_finishes_before_timer() {
    let (handle, mut rx, submitter) = spawn(&[0, 2], 600);

    handle.select_answer(0).await.unwrap();
    handle.lock_current_answer().await.unwrap();
    assert_eq!(handle.advance().await.unwrap(), Advance::Moved { index: 1 });
    assert!(handle.retreat().await);
    assert_eq!(handle.inspect(QuizSession::current_index).await, 0);
    assert_eq!(handle.advance().await.unwrap(), Advance::Moved { index: 1 });

    handle.select_answer(1).await.unwrap();
    handle.lock_current_answer().await.unwrap();
    let Advance::Completed(result) = handle.advance().await.unwrap() else {
        panic!("last advance should complete");
    };
    assert_eq!(result.correct_count(), 1);
    assert_eq!(result.earned_points(), 5);
    assert!(handle.finish().await.is_none());

    tokio::time::sleep(Duration::from_secs(700)).await;
    assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);
    let ticks_after_completion = std::iter::from_fn(|| rx.try_recv().ok())
        .skip_while(|e| !matches!(e, SessionEvent::Completed { .. }))
        .filter(|e| matches!(e, SessionEvent::Tick { .. }))
        .count();
    assert_eq!(ticks_after_completion, 0);
}

#[tokio::test(start_paused = true)]
async fn abandoned_attempt_never_submits() {
    let (handle, mut rx, submitter) = spawn(&[0, 1], 2);
    handle.select_answer(0).await.unwrap();
    handle.lock_current_answer().await.unwrap();
    handle.abandon();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
    let completed = std::iter::from_fn(|| rx.try_recv().ok())
        .any(|e| matches!(e, SessionEvent::Completed { .. }));
    assert!(!completed);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_the_countdown() {
    let (handle, mut rx, submitter) = spawn(&[0], 2);
    drop(handle);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
    assert!(rx.try_recv().is_err());
}
