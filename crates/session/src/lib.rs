//! Session orchestration: the turn-level state machine that sequences the
//! Observer, Interviewer and Evaluator around a single evolving
//! [`intervo_schema::InterviewState`], plus the writer for the two
//! per-session log files.

mod logger;
mod orchestrator;

pub use logger::InterviewLogWriter;
pub use orchestrator::{InterviewSession, SessionError};
