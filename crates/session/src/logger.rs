//! Per-session log files: a summary transcript and a detailed record with
//! agent thoughts, stats and token metrics.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::{Value, json};
use tracing::info;

use intervo_schema::{Feedback, InterviewState, Turn};
use intervo_trace::SessionMetrics;

pub struct InterviewLogWriter {
    log_dir: PathBuf,
}

impl InterviewLogWriter {
    /// The directory is created eagerly so a misconfigured path fails at
    /// session creation rather than after a finished interview.
    pub fn new(log_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let log_dir = log_dir.into();
        fs::create_dir_all(&log_dir)?;
        Ok(Self { log_dir })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Writes `interview_log_<timestamp>.json`: the candidate-visible
    /// transcript with flattened thought strings.
    pub fn write_summary(
        &self,
        state: &InterviewState,
        feedback: Option<&Feedback>,
    ) -> io::Result<PathBuf> {
        let path = self.timestamped_path("interview_log");
        let record = json!({
            "participant_name": state.participant_name,
            "turns": state.turns.iter().map(summary_turn).collect::<Vec<_>>(),
            "final_feedback": feedback.map(Feedback::to_report_string),
        });
        self.write_json(&path, &record)?;
        info!(path = %path.display(), "interview summary log saved");
        Ok(path)
    }

    /// Writes `interview_detailed_<timestamp>.json`: adds the candidate
    /// record, interview stats, per-turn timestamps, the full structured
    /// feedback, and token metrics when available.
    pub fn write_detailed(
        &self,
        state: &InterviewState,
        feedback: Option<&Feedback>,
        metrics: Option<&SessionMetrics>,
    ) -> io::Result<PathBuf> {
        let path = self.timestamped_path("interview_detailed");
        let mut record = json!({
            "participant_name": state.participant_name,
            "candidate_info": {
                "name": state.candidate.name,
                "position": state.candidate.position,
                "target_grade": state.candidate.target_grade.map(|g| g.as_str()),
                "experience": state.candidate.experience,
                "technologies": state.candidate.technologies,
            },
            "interview_stats": {
                "total_turns": state.turns.len(),
                "final_difficulty": state.current_difficulty.as_str(),
                "confirmed_skills": state.confirmed_skills,
                "knowledge_gaps": state.knowledge_gaps,
                "covered_topics": state.covered_topics,
            },
            "turns": state.turns.iter().map(detailed_turn).collect::<Vec<_>>(),
            "final_feedback": feedback.map(|f| serde_json::to_value(f).unwrap_or(Value::Null)),
        });
        if let Some(metrics) = metrics {
            record["token_metrics"] = metrics.to_value();
        }
        self.write_json(&path, &record)?;
        info!(path = %path.display(), "detailed interview log saved");
        Ok(path)
    }

    fn timestamped_path(&self, prefix: &str) -> PathBuf {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        self.log_dir.join(format!("{prefix}_{timestamp}.json"))
    }

    fn write_json(&self, path: &Path, record: &Value) -> io::Result<()> {
        let rendered = serde_json::to_string_pretty(record)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        fs::write(path, rendered)
    }
}

fn summary_turn(turn: &Turn) -> Value {
    let thoughts: String = turn
        .internal_thoughts
        .iter()
        .map(|thought| thought.log_line())
        .collect();
    json!({
        "turn_id": turn.turn_id,
        "agent_visible_message": turn.agent_message,
        "user_message": turn.user_message.clone().unwrap_or_default(),
        "internal_thoughts": thoughts,
    })
}

fn detailed_turn(turn: &Turn) -> Value {
    json!({
        "turn_id": turn.turn_id,
        "agent_visible_message": turn.agent_message,
        "user_message": turn.user_message,
        "internal_thoughts": turn
            .internal_thoughts
            .iter()
            .map(|thought| json!({
                "from": thought.from_agent,
                "to": thought.to_agent,
                "content": thought.content,
            }))
            .collect::<Vec<_>>(),
        "timestamp": turn.created_at.to_rfc3339(),
    })
}
