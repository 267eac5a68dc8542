//! The three LM roles that drive an interview: the Observer that
//! classifies each candidate reply, the Interviewer that produces the next
//! utterance, and the Evaluator that writes the final report.

mod common;
mod evaluator;
mod interviewer;
mod observer;
mod prompts;

pub use common::assemble_messages;
pub use evaluator::EvaluatorAgent;
pub use interviewer::{ActionCategory, InterviewerAgent, derive_action};
pub use observer::ObserverAgent;
