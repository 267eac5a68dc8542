//! The interview session orchestrator.
//!
//! One session is a single cooperative task: every await point is an LM
//! call (or a backoff sleep inside the gateway), and all state mutation
//! happens between those points on one logical thread.  The turn pipeline
//! keeps a strict mutation protocol — idempotent updates may happen before
//! the Interviewer call, everything non-idempotent commits only after it
//! succeeded, and a failed call rolls the difficulty snapshot back — so a
//! turn is either fully committed or not at all.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use intervo_agents::{EvaluatorAgent, InterviewerAgent, ObserverAgent};
use intervo_config::AppConfig;
use intervo_llm::{ChatBackend, GatewayError, LlmError};
use intervo_schema::{
    Analysis, Difficulty, ExtractedCandidateInfo, Feedback, Grade, InterviewState, KnowledgeGap,
    Quality, ResponseType,
};
use intervo_trace::{TraceHandle, Tracker};

use crate::logger::InterviewLogWriter;

const GENERIC_ERROR_REPLY: &str =
    "Sorry, something went wrong on my side. Could you send that again, please?";
const STOP_REPLY: &str = "Wrapping up the interview and preparing your feedback...";
const ALREADY_FINISHED_REPLY: &str = "The interview has already concluded.";
const TURN_LIMIT_NOTICE: &str = "[Question limit reached. Preparing your feedback...]";
const FALLBACK_GAP_TOPIC: &str = "General";
const GAP_ANSWER_MAX_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("interview session has not been started")]
    NotStarted,

    #[error("interview session was already started")]
    AlreadyStarted,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("failed to write interview log: {0}")]
    Log(#[from] std::io::Error),
}

/// Saved counters for rollback when the Interviewer call fails mid-turn.
struct DifficultySnapshot {
    difficulty: Difficulty,
    good: u32,
    bad: u32,
}

pub struct InterviewSession {
    observer: ObserverAgent,
    interviewer: InterviewerAgent,
    evaluator: EvaluatorAgent,
    log_writer: InterviewLogWriter,
    tracker: Arc<Tracker>,
    session_id: String,
    max_turns: u32,
    job_description: Option<String>,
    state: Option<InterviewState>,
    trace: Option<TraceHandle>,
}

impl InterviewSession {
    /// Builds a session around an LM backend.  The backend is shared by the
    /// three agents but owned by this session alone; `session_id` must
    /// match the id the backend reports generations under.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        config: &AppConfig,
        tracker: Arc<Tracker>,
        session_id: impl Into<String>,
    ) -> Result<Self, SessionError> {
        let log_writer = InterviewLogWriter::new(config.session.log_dir.clone())?;
        Ok(Self {
            observer: ObserverAgent::new(backend.clone(), config.agents.observer),
            interviewer: InterviewerAgent::new(
                backend.clone(),
                config.agents.interviewer,
                config.session.history_window_turns,
            ),
            evaluator: EvaluatorAgent::new(backend, config.agents.evaluator),
            log_writer,
            tracker,
            session_id: session_id.into(),
            max_turns: config.session.max_turns,
            job_description: config.session.job_description.clone(),
            state: None,
            trace: None,
        })
    }

    /// Fresh session id suitable for [`InterviewSession::new`].
    pub fn generate_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_active(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.is_active)
    }

    pub fn state(&self) -> Option<&InterviewState> {
        self.state.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut InterviewState {
        self.state.as_mut().expect("session started")
    }

    /// Opens the session: registers the trace, asks the Interviewer for a
    /// greeting, and appends turn 1 (agent-only).
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn start(&mut self) -> Result<String, SessionError> {
        if self.state.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let trace = self.tracker.create_trace(
            "interview_session",
            &self.session_id,
            None,
            json!({ "max_turns": self.max_turns }),
        );
        self.trace = Some(trace);

        let state = InterviewState::new(self.job_description.clone());
        info!("starting new interview session");

        let greeting = self.interviewer.greet(&state).await?;
        let mut state = state;
        state.add_turn(greeting.clone());
        self.state = Some(state);
        Ok(greeting)
    }

    /// Runs one turn of the interview.
    ///
    /// LM failures never surface raw: the candidate sees a generic retry
    /// message and the state stays consistent — stage 1 (attaching the
    /// reply to the tail turn) is the only mutation that survives a failed
    /// turn.
    #[instrument(skip(self, user_message), fields(session_id = %self.session_id, user_len = user_message.len()))]
    pub async fn process(&mut self, user_message: &str) -> Result<(String, bool), SessionError> {
        let state = self.state.as_mut().ok_or(SessionError::NotStarted)?;
        if !state.is_active {
            return Ok((ALREADY_FINISHED_REPLY.to_string(), true));
        }

        // Stage 1: attach the reply to the turn that asked for it.  First
        // write wins, so retrying a failed turn is safe.
        if let Some(tail) = state.turns.last_mut() {
            tail.attach_user_message(user_message);
        }

        // Stage 2: Observer.  Nothing but stage 1 has happened yet, so a
        // failure leaves the turn retryable.
        let anchor = state.last_agent_message().to_string();
        let analysis = match self.observer.analyze(state, user_message, &anchor).await {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(error = %err, "observer call failed; turn not committed");
                return Ok((GENERIC_ERROR_REPLY.to_string(), false));
            }
        };

        // Stage 3: candidate-info accretion.  Idempotent: only unset fields
        // are filled and technologies are de-duplicated.
        apply_extracted_info(state, analysis.extracted_info.as_ref());

        // Stage 4: stop command ends the session before any difficulty or
        // planning work.
        if analysis.response_type == ResponseType::StopCommand {
            if let Some(tail) = state.turns.last_mut() {
                tail.set_thoughts(analysis.thoughts.clone());
            }
            state.is_active = false;
            info!("stop command received; session deactivated");
            if let Some(trace) = &self.trace {
                self.tracker.add_span(
                    trace,
                    "stop_command",
                    Some(json!({ "turn": state.current_turn })),
                    None,
                    None,
                );
            }
            return Ok((STOP_REPLY.to_string(), true));
        }

        // Stage 5: snapshot everything the difficulty controller may touch.
        let snapshot = DifficultySnapshot {
            difficulty: state.current_difficulty,
            good: state.consecutive_good_answers,
            bad: state.consecutive_bad_answers,
        };

        // Stage 6: difficulty moves only when the anchor was closed;
        // unanswered turns must not reset a running streak either.
        if analysis.answered_last_question {
            let before = state.current_difficulty;
            state.adjust_difficulty(&analysis);
            if before != state.current_difficulty {
                info!(
                    from = before.as_str(),
                    to = state.current_difficulty.as_str(),
                    good_streak = state.consecutive_good_answers,
                    bad_streak = state.consecutive_bad_answers,
                    "difficulty adjusted"
                );
            }
        }

        if let Some(level) = &analysis.demonstrated_level {
            if let Some(declared) = state.candidate.target_grade {
                info!(
                    declared = declared.as_str(),
                    demonstrated = %level,
                    "demonstrated level differs from declared grade"
                );
            }
        }

        // Stage 7: Interviewer.  On failure, restore the snapshot and
        // commit nothing.
        let (reply, thoughts) = match self
            .interviewer
            .plan_and_speak(state, &analysis, user_message)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                state.current_difficulty = snapshot.difficulty;
                state.consecutive_good_answers = snapshot.good;
                state.consecutive_bad_answers = snapshot.bad;
                warn!(error = %err, "interviewer call failed; difficulty rolled back");
                return Ok((GENERIC_ERROR_REPLY.to_string(), false));
            }
        };

        // Stage 8: commit.  Thoughts land on the turn that was answered,
        // then the new turn becomes the anchor.
        if let Some(tail) = state.turns.last_mut() {
            tail.set_thoughts(thoughts);
        }
        state.add_turn(reply.clone());
        record_knowledge(state, &analysis, user_message);

        self.tracker.increment_turn(&self.session_id);
        if let Some(trace) = &self.trace {
            self.tracker.add_span(
                trace,
                "turn",
                Some(json!({ "user_message_len": user_message.len() })),
                Some(json!({
                    "turn": state.current_turn,
                    "response_type": analysis.response_type,
                    "answered": analysis.answered_last_question,
                    "difficulty": state.current_difficulty.as_str(),
                })),
                None,
            );
        }

        // Stage 9: turn limit.
        if state.current_turn as u32 >= self.max_turns {
            state.is_active = false;
            info!(turns = state.current_turn, "turn limit reached; session deactivated");
            return Ok((format!("{reply}\n\n{TURN_LIMIT_NOTICE}"), true));
        }

        Ok((reply, false))
    }

    /// Produces the final feedback and writes both session logs.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn finish(&mut self) -> Result<(Feedback, PathBuf, PathBuf), SessionError> {
        let state = self.state.as_ref().ok_or(SessionError::NotStarted)?;

        info!("generating final feedback");
        let feedback = self.evaluator.evaluate(state).await?;

        let metrics = self.tracker.session_metrics(&self.session_id);
        let summary_path = self.log_writer.write_summary(state, Some(&feedback))?;
        let detailed_path = self
            .log_writer
            .write_detailed(state, Some(&feedback), metrics.as_ref())?;

        if let Some(trace) = &self.trace {
            self.tracker.score_trace(
                trace,
                "confidence_score",
                feedback.verdict.confidence_score as f64,
                None,
            );
            if let Some(metrics) = &metrics {
                self.tracker.score_trace(
                    trace,
                    "total_tokens",
                    metrics.total_usage.total_tokens as f64,
                    Some("tokens spent across the whole session"),
                );
                self.tracker
                    .add_span(trace, "session_token_metrics", None, Some(metrics.to_value()), None);
            }
        }
        self.tracker.flush();

        Ok((feedback, summary_path, detailed_path))
    }

    /// Flushes observability state.  The gateway and its HTTP pool are
    /// dropped with the session itself.
    pub fn close(&mut self) {
        self.tracker.flush();
        info!(session_id = %self.session_id, "interview session closed");
    }
}

/// Fills candidate fields that are still unset.  The declared grade also
/// seeds the difficulty, and the first extracted name becomes the
/// participant name used in log headers.
fn apply_extracted_info(state: &mut InterviewState, extracted: Option<&ExtractedCandidateInfo>) {
    let Some(extracted) = extracted else { return };

    if let Some(name) = &extracted.name {
        if state.candidate.name.is_none() {
            state.candidate.name = Some(name.clone());
            state.participant_name = name.clone();
            info!(name = %name, "candidate name extracted");
        }
    }
    if let Some(position) = &extracted.position {
        if state.candidate.position.is_none() {
            state.candidate.position = Some(position.clone());
            info!(position = %position, "candidate position extracted");
        }
    }
    if let Some(grade_raw) = &extracted.grade {
        if state.candidate.target_grade.is_none() {
            let grade = Grade::parse_lenient(grade_raw);
            state.candidate.target_grade = Some(grade);
            state.current_difficulty = Difficulty::seed_for(grade);
            info!(
                grade = grade.as_str(),
                difficulty = state.current_difficulty.as_str(),
                "grade extracted; difficulty seeded"
            );
        }
    }
    if let Some(experience) = &extracted.experience {
        if state.candidate.experience.is_none() {
            state.candidate.experience = Some(experience.clone());
        }
    }
    for technology in &extracted.technologies {
        state.candidate.add_technology(technology);
    }
}

/// Topic/skill/gap accounting for a committed turn.
///
/// Gaps require an *attempted* answer: gibberish, off-topic drift and pure
/// role reversal leave the anchor open and therefore never count against
/// the candidate.
fn record_knowledge(state: &mut InterviewState, analysis: &Analysis, user_message: &str) {
    for topic in &analysis.detected_topics {
        state.add_covered_topic(topic);
    }

    if !analysis.answered_last_question {
        return;
    }

    if analysis.is_factually_correct
        && matches!(analysis.quality, Quality::Excellent | Quality::Good)
    {
        for topic in &analysis.detected_topics {
            state.add_confirmed_skill(topic);
        }
    }

    if !analysis.is_factually_correct || analysis.quality == Quality::Wrong {
        let topic = if analysis.detected_topics.is_empty() {
            FALLBACK_GAP_TOPIC.to_string()
        } else {
            analysis.detected_topics.join(", ")
        };
        state.knowledge_gaps.push(KnowledgeGap {
            topic,
            user_answer: user_message.chars().take(GAP_ANSWER_MAX_CHARS).collect(),
            correct_answer: analysis.correct_answer.clone(),
        });
    }
}
