//! LM plumbing: chat message types, the gateway that talks to an
//! OpenAI-compatible endpoint (retries, backoff, JSON-mode capability
//! probe), the layered response parser, and model discovery.

mod error;
mod gateway;
mod message;
mod models;
mod parser;

pub use error::{GatewayError, LlmError, ParseError};
pub use gateway::{ChatBackend, CompletionRequest, GatewayOptions, LlmGateway};
pub use message::{ChatMessage, ChatRole};
pub use models::list_models;
pub use parser::{extract_reasoning, parse_structured};
