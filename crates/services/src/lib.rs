#![forbid(unsafe_code)]

pub mod error;
pub mod sessions;

pub use quiz_core::Clock;

pub use error::SessionError;

pub use sessions::{
    Advance, AttemptHandle, CompletionReport, QuizSession, QuizSessionService, Selection,
    SessionEvent, SessionProgress, Step, SubmissionOutcome, TICK_PERIOD, Tick,
};
