//! Error taxonomy for LM interaction.
//!
//! [`GatewayError`] covers the network/HTTP side, [`ParseError`] covers the
//! shape of the content that came back.  The two are kept distinct because
//! callers retry them differently: transport failures are retried with
//! backoff inside the gateway, content failures are retried without delay
//! by the agent that owns the schema.

use thiserror::Error;

/// Failure while talking to the LM endpoint.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("LITELLM_API_KEY is not set; cannot call the LM endpoint")]
    MissingApiKey,

    #[error("LM request timed out")]
    Timeout,

    #[error("failed to connect to the LM endpoint: {0}")]
    Connect(String),

    #[error("LM transport error: {0}")]
    Transport(String),

    #[error("LM endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("LM response had an unexpected shape: {0}")]
    Shape(String),

    #[error("LM call failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<GatewayError>,
    },
}

impl GatewayError {
    /// Whether the gateway may retry this failure with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout | GatewayError::Connect(_) => true,
            GatewayError::Http { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

/// Failure to extract a structured record from LM text.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty LM response")]
    Empty,

    #[error("no valid JSON object found in LM response (len={len}): {prefix}")]
    NoJson { len: usize, prefix: String },
}

/// Either side of an LM round trip can fail; `complete_json` returns this
/// umbrella so callers can retry parse failures while bubbling gateway ones.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}
