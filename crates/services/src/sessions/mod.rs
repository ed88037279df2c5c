mod engine;
mod progress;
mod runner;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use engine::{Advance, QuizSession, Selection, Tick};
pub use progress::SessionProgress;
pub use runner::{AttemptHandle, SessionEvent, TICK_PERIOD};
pub use workflow::{
    CompletionReport, DEFAULT_DURATION_SECS, QuizSessionService, Step, SubmissionOutcome,
};
