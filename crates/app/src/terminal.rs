//! Plain-text driver for listing, taking and reviewing quizzes.

use quiz_core::model::{AttemptResult, CompletionReason, QuizId};
use quiz_core::time::format_countdown;
use services::{
    Advance, AttemptHandle, QuizSession, QuizSessionService, Selection, SessionError,
    SessionEvent, TICK_PERIOD,
};
use storage::repository::{QuizRepository, SubmissionLog};
use tokio::io::{AsyncBufReadExt, BufReader};

type BoxError = Box<dyn std::error::Error>;

/// Remaining-time marks that get announced while an attempt runs.
const ANNOUNCE_AT: [u32; 5] = [60, 30, 10, 5, 3];

pub async fn list_quizzes(quizzes: &dyn QuizRepository) -> Result<(), BoxError> {
    let listed = quizzes.list_quizzes().await?;
    if listed.is_empty() {
        println!("No quizzes available.");
        return Ok(());
    }

    for quiz in listed {
        let difficulty = quiz
            .difficulty
            .as_ref()
            .map_or_else(String::new, |d| format!(" [{d}]"));
        println!(
            "{id}  {title}{difficulty}  {count} questions, {points} points",
            id = quiz.id,
            title = quiz.title,
            count = quiz.question_count,
            points = quiz.points,
        );
        if let Some(description) = &quiz.description {
            println!("    {description}");
        }
    }
    Ok(())
}

pub async fn print_history(
    submissions: &dyn SubmissionLog,
    quiz_id: Option<&QuizId>,
    limit: u32,
) -> Result<(), BoxError> {
    let records = submissions.list_submissions(quiz_id, limit).await?;
    if records.is_empty() {
        println!("No attempts recorded yet.");
        return Ok(());
    }

    for record in records {
        let s = &record.submission;
        println!(
            "{completed}  {quiz}  {summary}  ({reason})",
            completed = s.completed_at.format("%Y-%m-%d %H:%M"),
            quiz = s.quiz_id,
            summary = summarize(&s.result),
            reason = s.reason.as_str(),
        );
    }
    Ok(())
}

fn summarize(result: &AttemptResult) -> String {
    format!(
        "{}/{} correct, {} points, {} answered ({} locked)",
        result.correct_count(),
        result.total_questions(),
        result.earned_points(),
        result.answered_count(),
        result.locked_count(),
    )
}

fn render_question(session: &QuizSession) -> String {
    let progress = session.progress();
    let question = session.current_question();
    let index = session.current_index();
    let mut out = format!(
        "\nQuestion {}/{}  [{}]\n{}\n",
        progress.position,
        progress.total,
        progress.countdown(),
        question.text()
    );
    for (i, option) in question.options().iter().enumerate() {
        let marker = if session.selected_answer(index) == Some(i) {
            '*'
        } else {
            ' '
        };
        out.push_str(&format!(" {marker}{}) {option}\n", i + 1));
    }
    if session.is_locked(index) {
        out.push_str("(locked)\n");
    }
    out
}

fn print_help() {
    println!("Commands: <n> select option n, lock, next, prev, show, finish, quit");
}

/// What the input loop should do after a command.
enum Flow {
    Continue,
    /// The attempt completed; wait for the submission outcome.
    AwaitSubmission,
    Quit,
}

async fn handle_command(handle: &AttemptHandle, line: &str) -> Result<Flow, SessionError> {
    let command = line.trim();
    match command {
        "" => {}
        "help" | "?" => print_help(),
        "show" => println!("{}", handle.inspect(render_question).await),
        "lock" => {
            let feedback = handle.lock_current_answer().await?;
            if feedback.is_correct {
                println!("Correct!");
            } else {
                println!("Incorrect. The answer was {}.", feedback.correct_option + 1);
            }
        }
        "next" => match handle.advance().await? {
            Advance::Moved { .. } => println!("{}", handle.inspect(render_question).await),
            Advance::Completed(_) => return Ok(Flow::AwaitSubmission),
        },
        "prev" => {
            if handle.retreat().await {
                println!("{}", handle.inspect(render_question).await);
            } else {
                println!("Already at the first question.");
            }
        }
        "finish" => {
            if handle.finish().await.is_some() {
                return Ok(Flow::AwaitSubmission);
            }
        }
        "quit" | "exit" => return Ok(Flow::Quit),
        other => {
            let raw = other.strip_prefix("select").map_or(other, str::trim);
            match raw.parse::<usize>() {
                Ok(n) if n >= 1 => match handle.select_answer(n - 1).await? {
                    Selection::Recorded { option, .. } => println!("Selected {}.", option + 1),
                    Selection::Locked { .. } => println!("This answer is locked."),
                },
                _ => print_help(),
            }
        }
    }
    Ok(Flow::Continue)
}

pub async fn take_quiz(service: QuizSessionService, quiz_id: &QuizId) -> Result<(), BoxError> {
    let (handle, mut events) = AttemptHandle::start(service, quiz_id, TICK_PERIOD).await?;

    let title = handle.inspect(|s| s.quiz().title().to_owned()).await;
    println!("{title}");
    print_help();
    println!("{}", handle.inspect(render_question).await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut completed = false;
    let mut retry_pending = false;
    loop {
        tokio::select! {
            line = lines.next_line(), if !completed || retry_pending => {
                let Some(line) = line? else {
                    if !completed {
                        handle.abandon();
                        println!("\nInput closed; attempt abandoned. Nothing was submitted.");
                    }
                    return Ok(());
                };
                if retry_pending {
                    match line.trim() {
                        "retry" => {
                            retry_pending = false;
                            if let Err(err) = handle.retry_submission().await {
                                println!("Could not submit the result: {err}");
                                println!("Type `retry` to try again or `quit` to leave.");
                                retry_pending = true;
                            }
                        }
                        "quit" | "exit" => return Ok(()),
                        _ => println!("Type `retry` to try again or `quit` to leave."),
                    }
                    continue;
                }
                match handle_command(&handle, &line).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::AwaitSubmission) => completed = true,
                    Ok(Flow::Quit) => {
                        handle.abandon();
                        println!("Attempt abandoned. Nothing was submitted.");
                        return Ok(());
                    }
                    Err(err) => println!("{err}"),
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Tick { remaining_secs } => {
                        if ANNOUNCE_AT.contains(&remaining_secs) {
                            println!("{} left", format_countdown(remaining_secs));
                        }
                    }
                    SessionEvent::Completed { result, reason } => {
                        completed = true;
                        if reason == CompletionReason::TimeExpired {
                            println!("\nTime is up!");
                        }
                        println!("Finished: {}", summarize(&result));
                    }
                    SessionEvent::Submitted(receipt) => {
                        let note = receipt.message.map(|m| format!(" ({m})")).unwrap_or_default();
                        println!("Result submitted{note}.");
                        break;
                    }
                    SessionEvent::SubmissionFailed { message } => {
                        println!("Could not submit the result: {message}");
                        println!("Your score above still stands. Type `retry` to submit again or `quit` to leave.");
                        retry_pending = true;
                    }
                }
            }
        }
    }
    Ok(())
}
