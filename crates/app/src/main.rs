use std::fmt;
use std::sync::Arc;

use quiz_core::model::QuizId;
use services::{Clock, QuizSessionService};
use storage::remote::{ApiConfig, RemoteApi};
use storage::repository::{QuizRepository, ResultSubmitter, Storage};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

mod terminal;

const DEFAULT_DB_URL: &str = "sqlite://quiz.sqlite3";
const DEFAULT_HISTORY_LIMIT: u32 = 20;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingQuizId,
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidApiUrl { raw: String },
    InvalidQuizId { raw: String },
    InvalidDuration { raw: String },
    InvalidLimit { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingQuizId => write!(f, "take requires --quiz-id"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidApiUrl { raw } => write!(f, "invalid --api value: {raw}"),
            ArgsError::InvalidQuizId { raw } => write!(f, "invalid --quiz-id value: {raw}"),
            ArgsError::InvalidDuration { raw } => {
                write!(f, "invalid --duration value (seconds, > 0): {raw}")
            }
            ArgsError::InvalidLimit { raw } => write!(f, "invalid --limit value: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- list    [--db <sqlite_url>] [--api <base_url>]");
    eprintln!("  cargo run -p app -- take    --quiz-id <id> [--duration <secs>] [--db <sqlite_url>] [--api <base_url>]");
    eprintln!("  cargo run -p app -- history [--quiz-id <id>] [--limit <n>] [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db {DEFAULT_DB_URL}");
    eprintln!("  --duration 600");
    eprintln!("  --limit {DEFAULT_HISTORY_LIMIT}");
    eprintln!();
    eprintln!("Quizzes come from the HTTP API when --api or QUIZ_API_URL is set,");
    eprintln!("otherwise from the SQLite database (see `cargo run -p storage --bin seed`).");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_DB_MAX_CONNECTIONS, QUIZ_DURATION_SECS");
    eprintln!("  QUIZ_API_URL, QUIZ_API_TOKEN, QUIZ_API_TIMEOUT_SECS");
    eprintln!("  RUST_LOG (default: app=info,services=info,storage=info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    List,
    Take,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "list" => Some(Self::List),
            "take" => Some(Self::Take),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    api: Option<ApiConfig>,
    quiz_id: Option<QuizId>,
    duration_secs: u32,
    limit: u32,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("QUIZ_DB_URL")
            .ok()
            .map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url);
        let mut api = ApiConfig::from_env();
        let mut quiz_id = None;
        let mut duration_secs = std::env::var("QUIZ_DURATION_SECS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(services::sessions::DEFAULT_DURATION_SECS);
        let mut limit = DEFAULT_HISTORY_LIMIT;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--api" => {
                    let value = require_value(args, "--api")?;
                    let base_url = Url::parse(value.trim())
                        .map_err(|_| ArgsError::InvalidApiUrl { raw: value.clone() })?;
                    api = Some(match api {
                        Some(config) => ApiConfig { base_url, ..config },
                        None => ApiConfig::new(base_url)
                            .with_token(std::env::var("QUIZ_API_TOKEN").ok()),
                    });
                }
                "--quiz-id" => {
                    let value = require_value(args, "--quiz-id")?;
                    let parsed: QuizId = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidQuizId { raw: value.clone() })?;
                    quiz_id = Some(parsed);
                }
                "--duration" => {
                    let value = require_value(args, "--duration")?;
                    duration_secs = value
                        .parse::<u32>()
                        .ok()
                        .filter(|secs| *secs > 0)
                        .ok_or_else(|| ArgsError::InvalidDuration { raw: value.clone() })?;
                }
                "--limit" => {
                    let value = require_value(args, "--limit")?;
                    limit = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidLimit { raw: value.clone() })?;
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
            api,
            quiz_id,
            duration_secs,
            limit,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

/// Local SQLite storage, with quizzes and submissions routed to the HTTP API
/// when one is configured. History always reads the local log.
async fn open_storage(args: &Args) -> Result<Storage, Box<dyn std::error::Error>> {
    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;

    let Some(config) = &args.api else {
        return Ok(storage);
    };
    tracing::info!(base_url = %config.base_url, "using remote quiz api");
    let remote = Arc::new(RemoteApi::new(config.clone())?);
    let quizzes: Arc<dyn QuizRepository> = remote.clone();
    let submitter: Arc<dyn ResultSubmitter> = remote;
    Ok(Storage {
        quizzes,
        submitter,
        submissions: storage.submissions,
    })
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "app=info,services=info,storage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let storage = open_storage(&parsed).await?;

    match cmd {
        Command::List => terminal::list_quizzes(storage.quizzes.as_ref()).await,
        Command::History => {
            terminal::print_history(
                storage.submissions.as_ref(),
                parsed.quiz_id.as_ref(),
                parsed.limit,
            )
            .await
        }
        Command::Take => {
            let quiz_id = parsed.quiz_id.clone().ok_or_else(|| {
                print_usage();
                ArgsError::MissingQuizId
            })?;
            let service = QuizSessionService::new(
                Clock::system(),
                Arc::clone(&storage.quizzes),
                Arc::clone(&storage.submitter),
            )
            .with_duration_secs(parsed.duration_secs);
            terminal::take_quiz(service, &quiz_id).await
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
