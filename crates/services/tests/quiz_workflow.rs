use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use quiz_core::model::{
    AttemptStatus, AttemptSubmission, CompletionReason, Question, QuestionId, Quiz, QuizId,
    SubmissionReceipt,
};
use quiz_core::time::fixed_now;
use services::{Clock, QuizSessionService, SessionError, Step, SubmissionOutcome};
use storage::repository::{
    InMemoryRepository, ResultSubmitter, StorageError, SubmissionLog,
};

/// Counts calls and fails while `failing` is set.
#[derive(Default)]
struct FlakySubmitter {
    calls: AtomicUsize,
    failing: AtomicBool,
}

#[async_trait]
impl ResultSubmitter for FlakySubmitter {
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
                vec!["a".into(), "b".into(), "c".into(), "d".into()],
                *answer,
            )
            .unwrap()
        })
        .collect();
    Quiz::new(QuizId::new("quiz"), "Quiz", 100, questions).unwrap()
}

fn service_with(
    repo: &InMemoryRepository,
    submitter: Arc<dyn ResultSubmitter>,
) -> QuizSessionService {
    QuizSessionService::new(Clock::fixed(fixed_now()), Arc::new(repo.clone()), submitter)
}

#[tokio::test]
async fn full_attempt_scores_and_records_submission() {
    let repo = InMemoryRepository::new();
    repo.upsert_quiz(build_quiz(&[1, 0, 2, 3])).unwrap();
    let service = service_with(&repo, Arc::new(repo.clone())).with_duration_secs(120);

    let mut session = service.start_attempt(&QuizId::new("quiz")).await.unwrap();
    assert_eq!(session.remaining_secs(), 120);

    let mut report = None;
    for option in [1, 0, 2, 1] {
        session.select_answer(option).unwrap();
        session.lock_current_answer().unwrap();
        match service.advance(&mut session).await.unwrap() {
            Step::Moved { .. } => {}
            Step::Completed(r) => report = Some(r),
        }
    }

    let report = report.expect("last advance completes");
    assert_eq!(report.result.correct_count(), 3);
    assert_eq!(report.result.earned_points(), 75);
    assert!(report.submission.is_accepted());
    assert!(session.receipt().is_some());

    let history = repo.list_submissions(None, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].submission.answers.len(), 4);
    assert_eq!(history[0].submission.reason, CompletionReason::Finished);
}

#[tokio::test]
async fn missing_quiz_surfaces_storage_error() {
    let repo = InMemoryRepository::new();
    let service = service_with(&repo, Arc::new(repo.clone()));
    let err = service.start_attempt(&QuizId::new("ghost")).await.unwrap_err();
    assert!(matches!(err, SessionError::Storage(StorageError::NotFound)));
}

#[tokio::test]
async fn empty_quiz_cannot_start() {
    let repo = InMemoryRepository::new();
    repo.upsert_quiz(build_quiz(&[])).unwrap();
    let service = service_with(&repo, Arc::new(repo.clone()));
    let err = service.start_attempt(&QuizId::new("quiz")).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidQuiz));
}

#[tokio::test]
async fn expiry_and_finish_submit_exactly_once() {
    let repo = InMemoryRepository::new();
    repo.upsert_quiz(build_quiz(&[0, 1])).unwrap();
    let submitter = Arc::new(FlakySubmitter::default());
    let service = service_with(&repo, submitter.clone()).with_duration_secs(2);

    let mut session = service.start_attempt(&QuizId::new("quiz")).await.unwrap();
    session.select_answer(0).unwrap();

    assert!(service.tick(&mut session).await.is_none());
    let report = service.tick(&mut session).await.expect("expires on second tick");
    assert_eq!(report.result.correct_count(), 1);
    assert_eq!(session.completion_reason(), Some(CompletionReason::TimeExpired));

    assert!(service.tick(&mut session).await.is_none());
    assert!(service.finish(&mut session).await.is_none());
    assert!(matches!(
        service.advance(&mut session).await,
        Err(SessionError::Completed)
    ));
    assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_submission_keeps_result_and_can_be_retried() {
    let repo = InMemoryRepository::new();
    repo.upsert_quiz(build_quiz(&[2])).unwrap();
    let submitter = Arc::new(FlakySubmitter::default());
    submitter.failing.store(true, Ordering::SeqCst);
    let service = service_with(&repo, submitter.clone());

    let mut session = service.start_attempt(&QuizId::new("quiz")).await.unwrap();
    let err = service.retry_submission(&mut session).await.unwrap_err();
    assert!(matches!(err, SessionError::NotCompleted));

    session.select_answer(2).unwrap();
    let report = service.finish(&mut session).await.expect("forced completion");
    assert!(matches!(
        report.submission,
        SubmissionOutcome::Failed(SessionError::Submission(StorageError::Connection(_)))
    ));
    assert_eq!(session.status(), AttemptStatus::Completed);
    assert_eq!(session.result(), Some(report.result));
    assert!(session.receipt().is_none());

    submitter.failing.store(false, Ordering::SeqCst);
    let receipt = service.retry_submission(&mut session).await.unwrap();
    assert_eq!(session.receipt(), Some(&receipt));

    // A stored receipt short-circuits further retries.
    service.retry_submission(&mut session).await.unwrap();
    assert_eq!(submitter.calls.load(Ordering::SeqCst), 2);
}
