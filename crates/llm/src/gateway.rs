//! Gateway to an OpenAI-compatible chat endpoint.
//!
//! One gateway per session: it owns the pooled HTTP client, the retry
//! budget, and the per-gateway JSON-mode capability flag.  Every call is
//! wrapped in an observability generation so token usage lands in the
//! session metrics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use intervo_trace::{EventLevel, TokenUsage, Tracker};

use crate::error::{GatewayError, LlmError};
use crate::message::ChatMessage;
use crate::parser::parse_structured;

const COMPLETIONS_PATH: &str = "/v1/chat/completions";
const MAX_ERROR_BODY_CHARS: usize = 500;

/// One LM invocation: the message list plus generation parameters.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Name reported to the observability sink, e.g. `"observer_analysis"`.
    pub generation_name: String,
}

/// The seam agents talk through, so tests can script the LM side.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Free-form completion; returns the assistant text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, GatewayError>;

    /// Completion that must yield a JSON object.  Uses server-side JSON mode
    /// when the endpoint supports it, otherwise text mode plus the response
    /// parser.
    async fn complete_json(
        &self,
        request: CompletionRequest,
    ) -> Result<Map<String, Value>, LlmError>;
}

/// Connection settings for one gateway instance.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Endpoint root without a trailing slash, e.g. `http://localhost:4000`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    /// Additional attempts after the first one.
    pub max_retries: u32,
}

pub struct LlmGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
    json_mode_supported: AtomicBool,
    tracker: Arc<Tracker>,
    session_id: String,
}

impl LlmGateway {
    pub fn new(
        options: GatewayOptions,
        tracker: Arc<Tracker>,
        session_id: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            api_key: options.api_key,
            model: options.model,
            max_retries: options.max_retries,
            json_mode_supported: AtomicBool::new(true),
            tracker,
            session_id: session_id.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the endpoint accepted `response_format` so far.  Starts
    /// optimistic; flips to `false` permanently on the first rejection.
    pub fn json_mode_supported(&self) -> bool {
        self.json_mode_supported.load(Ordering::Relaxed)
    }

    async fn complete_inner(
        &self,
        request: &CompletionRequest,
        response_format: Option<Value>,
    ) -> Result<String, GatewayError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(GatewayError::MissingApiKey)?;

        let mut payload = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if let Some(format) = response_format {
            payload["response_format"] = format;
        }

        let generation = self.tracker.begin_generation(
            &self.session_id,
            &request.generation_name,
            &self.model,
            &payload["messages"],
        );

        let mut last_error: Option<GatewayError> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt - 1);
                debug!(
                    generation = %request.generation_name,
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "retrying LM request after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_once(api_key, &payload).await {
                Ok((content, usage)) => {
                    self.tracker.end_generation(
                        generation,
                        &content,
                        usage,
                        EventLevel::Default,
                        None,
                    );
                    return Ok(content);
                }
                Err(err) if err.is_retryable() => {
                    warn!(
                        generation = %request.generation_name,
                        attempt,
                        error = %err,
                        "retryable LM failure"
                    );
                    last_error = Some(err);
                }
                Err(err) => {
                    self.tracker
                        .end_generation_with_error(generation, &err.to_string());
                    return Err(err);
                }
            }
        }

        let err = GatewayError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last: Box::new(last_error.unwrap_or(GatewayError::Timeout)),
        };
        self.tracker
            .end_generation_with_error(generation, &err.to_string());
        Err(err)
    }

    async fn send_once(
        &self,
        api_key: &str,
        payload: &Value,
    ) -> Result<(String, Option<TokenUsage>), GatewayError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, COMPLETIONS_PATH))
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| GatewayError::Shape(format!("response body is not JSON: {err}")))?;

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| {
                GatewayError::Shape(format!(
                    "missing choices[0].message.content: {}",
                    truncate_chars(&body.to_string(), 200)
                ))
            })?
            .to_string();

        Ok((content, parse_usage(&body)))
    }
}

#[async_trait]
impl ChatBackend for LlmGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GatewayError> {
        self.complete_inner(&request, None).await
    }

    async fn complete_json(
        &self,
        request: CompletionRequest,
    ) -> Result<Map<String, Value>, LlmError> {
        if self.json_mode_supported() {
            let format = json_schema_format(&request.generation_name);
            match self.complete_inner(&request, Some(format)).await {
                Ok(text) => return Ok(parse_structured(&text)?),
                Err(err) if indicates_unsupported_format(&err) => {
                    self.json_mode_supported.store(false, Ordering::Relaxed);
                    warn!(
                        generation = %request.generation_name,
                        "endpoint rejected response_format; using text mode from now on"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        let text = self.complete_inner(&request, None).await?;
        if let Some(reasoning) = crate::parser::extract_reasoning(&text) {
            debug!(
                generation = %request.generation_name,
                reasoning_len = reasoning.len(),
                "model emitted a reasoning block before its JSON"
            );
        }
        Ok(parse_structured(&text)?)
    }
}

/// Delay before retry `attempt + 1`, capped at 30 seconds.
fn backoff_delay(attempt: u32) -> Duration {
    let secs = (0.5 * 2f64.powi(attempt.min(16) as i32)).min(30.0);
    Duration::from_secs_f64(secs)
}

/// `response_format` payload for the JSON-mode probe.  The schema only
/// demands an object; field-level coercion stays with the agents.
fn json_schema_format(name: &str) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": name,
            "schema": { "type": "object" },
        },
    })
}

/// An HTTP 400 whose body names the structured-output feature means the
/// endpoint does not support `response_format` at all.
fn indicates_unsupported_format(err: &GatewayError) -> bool {
    match err {
        GatewayError::Http { status: 400, body } => {
            let body = body.to_lowercase();
            body.contains("response_format")
                || body.contains("json_schema")
                || body.contains("structured output")
        }
        _ => false,
    }
}

fn classify_request_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else if err.is_connect() {
        GatewayError::Connect(err.to_string())
    } else {
        GatewayError::Transport(err.to_string())
    }
}

fn parse_usage(body: &Value) -> Option<TokenUsage> {
    let usage = body.get("usage")?;
    let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
    let input_tokens = field("prompt_tokens");
    let output_tokens = field("completion_tokens");
    let total = usage
        .get("total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(input_tokens + output_tokens);
    Some(TokenUsage {
        input_tokens,
        output_tokens,
        total_tokens: total,
    })
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── backoff schedule ───────────────────────────────────────────────────

    #[test]
    fn backoff_doubles_from_half_a_second() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(5), Duration::from_secs(16));
    }

    #[test]
    fn backoff_never_exceeds_thirty_seconds() {
        assert_eq!(backoff_delay(6), Duration::from_secs(30));
        assert_eq!(backoff_delay(20), Duration::from_secs(30));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_secs(30));
    }

    // ── capability probe detection ─────────────────────────────────────────

    #[test]
    fn unsupported_format_detected_on_matching_400() {
        let err = GatewayError::Http {
            status: 400,
            body: "{\"error\": \"response_format is not supported by this model\"}".into(),
        };
        assert!(indicates_unsupported_format(&err));

        let err = GatewayError::Http {
            status: 400,
            body: "Invalid parameter: json_schema".into(),
        };
        assert!(indicates_unsupported_format(&err));
    }

    #[test]
    fn ordinary_failures_do_not_flip_the_flag() {
        let err = GatewayError::Http { status: 400, body: "bad temperature".into() };
        assert!(!indicates_unsupported_format(&err));

        let err = GatewayError::Http { status: 500, body: "response_format".into() };
        assert!(!indicates_unsupported_format(&err));

        assert!(!indicates_unsupported_format(&GatewayError::Timeout));
    }

    // ── response body handling ─────────────────────────────────────────────

    #[test]
    fn usage_parsed_when_present() {
        let body = json!({
            "choices": [{"message": {"content": "hi"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15},
        });
        let usage = parse_usage(&body).unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 3);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn usage_total_derived_when_missing() {
        let body = json!({"usage": {"prompt_tokens": 7, "completion_tokens": 2}});
        let usage = parse_usage(&body).unwrap();
        assert_eq!(usage.total_tokens, 9);
    }

    #[test]
    fn missing_usage_is_none() {
        assert!(parse_usage(&json!({"choices": []})).is_none());
    }

    #[test]
    fn error_body_truncated_char_safe() {
        let body = "é".repeat(600);
        let truncated = truncate_chars(&body, MAX_ERROR_BODY_CHARS);
        assert_eq!(truncated.chars().count(), 500);
    }

    // ── construction ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn missing_api_key_is_a_hard_error_at_first_call() {
        let gateway = LlmGateway::new(
            GatewayOptions {
                base_url: "http://localhost:4000/".into(),
                api_key: None,
                model: "test-model".into(),
                timeout: Duration::from_secs(1),
                max_retries: 0,
            },
            Arc::new(Tracker::disabled()),
            "s1",
        )
        .unwrap();

        let request = CompletionRequest {
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.7,
            max_tokens: 100,
            generation_name: "healthcheck".into(),
        };
        let err = gateway.complete(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingApiKey));
    }

    #[test]
    fn base_url_trailing_slash_stripped() {
        let gateway = LlmGateway::new(
            GatewayOptions {
                base_url: "http://localhost:4000///".into(),
                api_key: Some("key".into()),
                model: "m".into(),
                timeout: Duration::from_secs(1),
                max_retries: 0,
            },
            Arc::new(Tracker::disabled()),
            "s1",
        )
        .unwrap();
        assert_eq!(gateway.base_url, "http://localhost:4000");
        assert!(gateway.json_mode_supported());
    }
}
