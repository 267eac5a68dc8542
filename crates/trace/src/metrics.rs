//! Token accounting for a session — totals plus a per-agent breakdown.

use serde::Serialize;
use serde_json::{Value, json};

/// Token counts reported by the LM endpoint for one or more generations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
        self.total_tokens += input_tokens + output_tokens;
    }
}

/// Accumulated statistics for one interview session.
///
/// Generations are attributed to an agent by the generation-name prefix
/// ("observer_…", "interviewer_…", "evaluator_…"); anything else only
/// counts toward the totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    pub total_usage: TokenUsage,
    pub generation_count: u64,
    pub turn_count: u64,

    pub observer_usage: TokenUsage,
    pub observer_calls: u64,
    pub interviewer_usage: TokenUsage,
    pub interviewer_calls: u64,
    pub evaluator_usage: TokenUsage,
    pub evaluator_calls: u64,
}

impl SessionMetrics {
    pub fn add_generation(&mut self, generation_name: &str, input_tokens: u64, output_tokens: u64) {
        self.total_usage.add(input_tokens, output_tokens);
        self.generation_count += 1;

        let name = generation_name.to_lowercase();
        if name.contains("observer") {
            self.observer_usage.add(input_tokens, output_tokens);
            self.observer_calls += 1;
        } else if name.contains("interviewer") {
            self.interviewer_usage.add(input_tokens, output_tokens);
            self.interviewer_calls += 1;
        } else if name.contains("evaluator") {
            self.evaluator_usage.add(input_tokens, output_tokens);
            self.evaluator_calls += 1;
        }
    }

    pub fn increment_turn(&mut self) {
        self.turn_count += 1;
    }

    pub fn average_tokens_per_turn(&self) -> f64 {
        if self.turn_count == 0 {
            return 0.0;
        }
        self.total_usage.total_tokens as f64 / self.turn_count as f64
    }

    pub fn average_tokens_per_generation(&self) -> f64 {
        if self.generation_count == 0 {
            return 0.0;
        }
        self.total_usage.total_tokens as f64 / self.generation_count as f64
    }

    /// JSON shape embedded under `token_metrics` in the detailed session log.
    pub fn to_value(&self) -> Value {
        json!({
            "total": self.total_usage,
            "generation_count": self.generation_count,
            "turn_count": self.turn_count,
            "avg_tokens_per_turn": round2(self.average_tokens_per_turn()),
            "avg_tokens_per_generation": round2(self.average_tokens_per_generation()),
            "by_agent": {
                "observer": { "usage": self.observer_usage, "calls": self.observer_calls },
                "interviewer": { "usage": self.interviewer_usage, "calls": self.interviewer_calls },
                "evaluator": { "usage": self.evaluator_usage, "calls": self.evaluator_calls },
            },
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
