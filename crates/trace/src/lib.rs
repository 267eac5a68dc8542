//! Observability sink for interview sessions — traces, generations, spans,
//! scores, and per-session token metrics.
//!
//! The tracker is process-wide and shared between sessions via `Arc`; every
//! operation takes `&self` and is safe to call from any session task.  When
//! the tracker is constructed disabled, every operation is a no-op and
//! [`Tracker::session_metrics`] returns `None`.

mod metrics;

pub use metrics::{SessionMetrics, TokenUsage};

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

/// Severity attached to a finished generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventLevel {
    Default,
    Warning,
    Error,
}

/// Handle to a trace created with [`Tracker::create_trace`].
///
/// Cheap to clone; carries the ids needed to attach spans, scores and
/// generations without holding a lock.
#[derive(Debug, Clone)]
pub struct TraceHandle {
    pub trace_id: Uuid,
    pub session_id: String,
    pub name: String,
}

/// Handle to an in-flight generation.  Consumed by
/// [`Tracker::end_generation`] or [`Tracker::end_generation_with_error`].
#[derive(Debug)]
pub struct GenerationHandle {
    pub generation_id: Uuid,
    pub session_id: String,
    pub name: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct TraceEvent {
    kind: &'static str,
    name: String,
    session_id: String,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<Value>,
}

#[derive(Default)]
struct TrackerInner {
    sessions: HashMap<String, SessionMetrics>,
    events: Vec<TraceEvent>,
}

/// Process-wide observability sink.
pub struct Tracker {
    enabled: bool,
    inner: Mutex<TrackerInner>,
}

impl Tracker {
    pub fn new(enabled: bool) -> Self {
        if enabled {
            info!("observability tracker enabled");
        } else {
            debug!("observability tracker disabled; all operations are no-ops");
        }
        Self {
            enabled,
            inner: Mutex::new(TrackerInner::default()),
        }
    }

    /// Disabled tracker for tests and headless runs.
    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Registers a new trace and starts collecting metrics for `session_id`.
    pub fn create_trace(
        &self,
        name: &str,
        session_id: &str,
        user_id: Option<&str>,
        metadata: Value,
    ) -> TraceHandle {
        let handle = TraceHandle {
            trace_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            name: name.to_string(),
        };
        if !self.enabled {
            return handle;
        }

        let mut inner = self.lock();
        inner
            .sessions
            .insert(session_id.to_string(), SessionMetrics::default());
        inner.events.push(TraceEvent {
            kind: "trace",
            name: name.to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            detail: Some(serde_json::json!({
                "user_id": user_id,
                "metadata": metadata,
            })),
        });
        debug!(name, session_id, "trace created");
        handle
    }

    /// Opens a generation for one LM invocation.  The session is identified
    /// by id so the caller does not need to thread the trace handle through
    /// the gateway.
    pub fn begin_generation(
        &self,
        session_id: &str,
        name: &str,
        model: &str,
        input: &Value,
    ) -> GenerationHandle {
        let handle = GenerationHandle {
            generation_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            name: name.to_string(),
            model: model.to_string(),
            started_at: Utc::now(),
        };
        if !self.enabled {
            return handle;
        }

        let mut inner = self.lock();
        inner.events.push(TraceEvent {
            kind: "generation_start",
            name: name.to_string(),
            session_id: session_id.to_string(),
            timestamp: handle.started_at,
            detail: Some(serde_json::json!({ "model": model, "input": input })),
        });
        handle
    }

    /// Closes a generation with its output and, when the endpoint reported
    /// it, token usage.  Usage feeds the per-session metrics.
    pub fn end_generation(
        &self,
        generation: GenerationHandle,
        output: &str,
        usage: Option<TokenUsage>,
        level: EventLevel,
        message: Option<&str>,
    ) {
        if !self.enabled {
            return;
        }

        let mut inner = self.lock();
        if let (Some(metrics), Some(usage)) =
            (inner.sessions.get_mut(&generation.session_id), usage)
        {
            metrics.add_generation(&generation.name, usage.input_tokens, usage.output_tokens);
        }
        inner.events.push(TraceEvent {
            kind: "generation_end",
            name: generation.name.clone(),
            session_id: generation.session_id.clone(),
            timestamp: Utc::now(),
            detail: Some(serde_json::json!({
                "output_len": output.len(),
                "usage": usage,
                "level": level,
                "message": message,
            })),
        });
        debug!(
            name = %generation.name,
            output_len = output.len(),
            ?usage,
            "generation ended"
        );
    }

    /// Closes a generation that failed before producing output.
    pub fn end_generation_with_error(&self, generation: GenerationHandle, error: &str) {
        if !self.enabled {
            return;
        }

        let mut inner = self.lock();
        inner.events.push(TraceEvent {
            kind: "generation_error",
            name: generation.name.clone(),
            session_id: generation.session_id.clone(),
            timestamp: Utc::now(),
            detail: Some(serde_json::json!({ "error": error })),
        });
        debug!(name = %generation.name, error, "generation ended with error");
    }

    pub fn add_span(
        &self,
        trace: &TraceHandle,
        name: &str,
        input: Option<Value>,
        output: Option<Value>,
        metadata: Option<Value>,
    ) {
        if !self.enabled {
            return;
        }

        let mut inner = self.lock();
        inner.events.push(TraceEvent {
            kind: "span",
            name: name.to_string(),
            session_id: trace.session_id.clone(),
            timestamp: Utc::now(),
            detail: Some(serde_json::json!({
                "input": input,
                "output": output,
                "metadata": metadata,
            })),
        });
    }

    pub fn score_trace(&self, trace: &TraceHandle, name: &str, value: f64, comment: Option<&str>) {
        if !self.enabled {
            return;
        }

        let mut inner = self.lock();
        inner.events.push(TraceEvent {
            kind: "score",
            name: name.to_string(),
            session_id: trace.session_id.clone(),
            timestamp: Utc::now(),
            detail: Some(serde_json::json!({ "value": value, "comment": comment })),
        });
        debug!(name, value, "trace scored");
    }

    /// Bumps the per-session turn counter used for the tokens-per-turn
    /// average.
    pub fn increment_turn(&self, session_id: &str) {
        if !self.enabled {
            return;
        }

        let mut inner = self.lock();
        if let Some(metrics) = inner.sessions.get_mut(session_id) {
            metrics.increment_turn();
        }
    }

    /// Snapshot of the metrics collected for a session so far.
    pub fn session_metrics(&self, session_id: &str) -> Option<SessionMetrics> {
        if !self.enabled {
            return None;
        }
        self.lock().sessions.get(session_id).cloned()
    }

    /// Drains the buffered events, logging a submission summary.  The
    /// summary is what an external dashboard would ingest; metrics stay
    /// available until the tracker is dropped.
    pub fn flush(&self) {
        if !self.enabled {
            return;
        }

        let events = {
            let mut inner = self.lock();
            std::mem::take(&mut inner.events)
        };
        if events.is_empty() {
            return;
        }

        let mut by_kind: HashMap<&'static str, usize> = HashMap::new();
        for event in &events {
            *by_kind.entry(event.kind).or_default() += 1;
        }
        info!(total = events.len(), ?by_kind, "observability events flushed");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerInner> {
        // A poisoned lock means another session task panicked while holding
        // it; the buffered events are still structurally sound.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
        }
    }

    #[test]
    fn disabled_tracker_is_noop() {
        let tracker = Tracker::disabled();
        let trace = tracker.create_trace("t", "s1", None, Value::Null);
        let generation = tracker.begin_generation("s1", "observer_analysis", "m", &Value::Null);
        tracker.end_generation(generation, "out", Some(usage(10, 5)), EventLevel::Default, None);
        tracker.add_span(&trace, "turn", None, None, None);
        tracker.score_trace(&trace, "confidence", 80.0, None);
        tracker.increment_turn("s1");
        tracker.flush();
        assert!(tracker.session_metrics("s1").is_none());
    }

    #[test]
    fn generation_usage_feeds_session_metrics() {
        let tracker = Tracker::new(true);
        tracker.create_trace("interview_session", "s1", None, Value::Null);

        let generation = tracker.begin_generation("s1", "observer_analysis", "m", &Value::Null);
        tracker.end_generation(generation, "out", Some(usage(100, 40)), EventLevel::Default, None);
        let generation = tracker.begin_generation("s1", "interviewer_response", "m", &Value::Null);
        tracker.end_generation(generation, "out", Some(usage(200, 60)), EventLevel::Default, None);
        tracker.increment_turn("s1");

        let metrics = tracker.session_metrics("s1").expect("metrics");
        assert_eq!(metrics.total_usage.total_tokens, 400);
        assert_eq!(metrics.observer_usage.total_tokens, 140);
        assert_eq!(metrics.interviewer_usage.total_tokens, 260);
        assert_eq!(metrics.observer_calls, 1);
        assert_eq!(metrics.interviewer_calls, 1);
        assert_eq!(metrics.turn_count, 1);
        assert!((metrics.average_tokens_per_turn() - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn generation_without_usage_counts_no_tokens() {
        let tracker = Tracker::new(true);
        tracker.create_trace("interview_session", "s1", None, Value::Null);
        let generation = tracker.begin_generation("s1", "evaluator_feedback", "m", &Value::Null);
        tracker.end_generation(generation, "out", None, EventLevel::Default, None);

        let metrics = tracker.session_metrics("s1").expect("metrics");
        assert_eq!(metrics.total_usage.total_tokens, 0);
        // The call itself is not attributed without usage data.
        assert_eq!(metrics.evaluator_calls, 0);
    }

    #[test]
    fn unknown_session_generation_is_ignored() {
        let tracker = Tracker::new(true);
        let generation = tracker.begin_generation("nope", "observer_analysis", "m", &Value::Null);
        tracker.end_generation(generation, "out", Some(usage(1, 1)), EventLevel::Default, None);
        assert!(tracker.session_metrics("nope").is_none());
    }

    #[test]
    fn flush_drains_event_buffer() {
        let tracker = Tracker::new(true);
        let trace = tracker.create_trace("t", "s1", None, Value::Null);
        tracker.add_span(&trace, "turn", None, None, None);
        tracker.flush();
        // Second flush has nothing left to submit; must not panic.
        tracker.flush();
        // Metrics survive the flush.
        assert!(tracker.session_metrics("s1").is_some());
    }
}
