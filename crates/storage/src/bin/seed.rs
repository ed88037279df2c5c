use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use quiz_core::model::{
    AttemptId, AttemptResult, AttemptSubmission, CompletionReason, Difficulty, Question,
    QuestionId, Quiz, QuizError, QuizId,
};
use storage::repository::ResultSubmitter;
use storage::sqlite::SqliteRepository;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    points: u32,
    attempts: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidPoints { raw: String },
    InvalidAttempts { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidPoints { raw } => write!(f, "invalid --points value: {raw}"),
            ArgsError::InvalidAttempts { raw } => write!(f, "invalid --attempts value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite://quiz.sqlite3".into());
        let mut points = std::env::var("QUIZ_SEED_POINTS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(100);
        let mut attempts = std::env::var("QUIZ_SEED_ATTEMPTS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(2);
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--points" => {
                    let value = require_value(&mut args, "--points")?;
                    points = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidPoints { raw: value.clone() })?;
                }
                "--attempts" => {
                    let value = require_value(&mut args, "--attempts")?;
                    attempts = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidAttempts { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            points,
            attempts,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://quiz.sqlite3)");
    eprintln!("  --points <n>              Points awarded per sample quiz (default: 100)");
    eprintln!("  --attempts <n>            Sample attempts to record per quiz (default: 2)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  QUIZ_DB_URL, QUIZ_SEED_POINTS, QUIZ_SEED_ATTEMPTS");
}

fn question(id: &str, text: &str, options: &[&str], answer: usize) -> Result<Question, QuizError> {
    Question::new(
        QuestionId::new(id),
        text,
        options.iter().map(|o| (*o).to_owned()).collect(),
        answer,
    )
}

fn sample_quizzes(points: u32) -> Result<Vec<Quiz>, QuizError> {
    let general = Quiz::new(
        QuizId::new("general-knowledge"),
        "General Knowledge",
        points,
        vec![
            question("gk-1", "What is the capital of France?", &["Berlin", "Paris", "Rome", "Madrid"], 1)?,
            question("gk-2", "How many continents are there?", &["5", "6", "7", "8"], 2)?,
            question("gk-3", "Which planet is known as the Red Planet?", &["Venus", "Mars", "Jupiter"], 1)?,
            question("gk-4", "What is the largest ocean?", &["Atlantic", "Indian", "Pacific", "Arctic"], 2)?,
        ],
    )?
    .with_description(Some("A warm-up across geography and science.".into()))
    .with_difficulty(Some(Difficulty::Easy));

    let rust = Quiz::new(
        QuizId::new("rust-basics"),
        "Rust Basics",
        points,
        vec![
            question("rb-1", "Which keyword declares a mutable binding?", &["var", "let mut", "mut let"], 1)?,
            question("rb-2", "What does `?` do on a `Result`?", &["Panics", "Ignores the error", "Returns early with the error"], 2)?,
            question("rb-3", "Which trait enables `{}` formatting?", &["Debug", "Display", "ToString"], 1)?,
        ],
    )?
    .with_description(Some("Ownership, errors and traits.".into()))
    .with_difficulty(Some(Difficulty::Medium));

    Ok(vec![general, rust])
}

/// Alternates between a perfect run and one that misses the last question.
fn sample_attempt(quiz: &Quiz, round: u32, now: DateTime<Utc>) -> AttemptSubmission {
    let total = quiz.question_count();
    let mut answers = BTreeMap::new();
    for (index, q) in quiz.questions().iter().enumerate() {
        let miss = round % 2 == 1 && index + 1 == total;
        let option = if miss {
            (q.correct_option() + 1) % q.option_count()
        } else {
            q.correct_option()
        };
        answers.insert(index, option);
    }
    let locked: BTreeSet<usize> = answers.keys().copied().collect();
    let completed_at = now - Duration::days(i64::from(round));

    AttemptSubmission {
        attempt_id: AttemptId::generate(),
        quiz_id: quiz.id().clone(),
        result: AttemptResult::score(quiz, &answers, &locked),
        answers,
        reason: CompletionReason::Finished,
        started_at: completed_at - Duration::minutes(4),
        completed_at,
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let quizzes = sample_quizzes(args.points)?;
    for quiz in &quizzes {
        repo.upsert_quiz(quiz).await?;
        for round in 0..args.attempts {
            let submission = sample_attempt(quiz, round, now);
            repo.submit(&submission).await?;
        }
    }

    println!(
        "Seeded {} quizzes with {} attempts each into {}",
        quizzes.len(),
        args.attempts,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
