//! Interview state: candidate record, turns, difficulty, and the derived
//! views the orchestrator and agents read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use intervo_llm::ChatMessage;

use crate::analysis::Analysis;

/// Candidate seniority as declared during the introduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    Intern,
    Junior,
    Middle,
    Senior,
    Lead,
}

impl Grade {
    /// Lenient parse of an LM-provided grade string; unknown input maps to
    /// `Junior`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "intern" => Grade::Intern,
            "middle" => Grade::Middle,
            "senior" => Grade::Senior,
            "lead" => Grade::Lead,
            _ => Grade::Junior,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Intern => "Intern",
            Grade::Junior => "Junior",
            Grade::Middle => "Middle",
            Grade::Senior => "Senior",
            Grade::Lead => "Lead",
        }
    }
}

/// Question difficulty, totally ordered from `Basic` to `Expert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
    Basic,
    Intermediate,
    Advanced,
    Expert,
}

impl Difficulty {
    /// Starting difficulty for a declared grade.
    pub fn seed_for(grade: Grade) -> Self {
        match grade {
            Grade::Intern | Grade::Junior => Difficulty::Basic,
            Grade::Middle => Difficulty::Intermediate,
            Grade::Senior => Difficulty::Advanced,
            Grade::Lead => Difficulty::Expert,
        }
    }

    pub fn step_up(self) -> Self {
        match self {
            Difficulty::Basic => Difficulty::Intermediate,
            Difficulty::Intermediate => Difficulty::Advanced,
            Difficulty::Advanced | Difficulty::Expert => Difficulty::Expert,
        }
    }

    pub fn step_down(self) -> Self {
        match self {
            Difficulty::Expert => Difficulty::Advanced,
            Difficulty::Advanced => Difficulty::Intermediate,
            Difficulty::Intermediate | Difficulty::Basic => Difficulty::Basic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Basic => "Basic",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
            Difficulty::Expert => "Expert",
        }
    }
}

/// What is known about the candidate so far.
///
/// Fields only accrete: once set they are never overwritten by later
/// extraction; `technologies` is insertion-ordered and de-duplicated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateInfo {
    pub name: Option<String>,
    pub position: Option<String>,
    pub target_grade: Option<Grade>,
    pub experience: Option<String>,
    pub technologies: Vec<String>,
}

impl CandidateInfo {
    /// Adds a technology unless it is blank or already present.
    pub fn add_technology(&mut self, technology: &str) {
        let technology = technology.trim();
        if technology.is_empty() {
            return;
        }
        if !self.technologies.iter().any(|existing| existing == technology) {
            self.technologies.push(technology.to_string());
        }
    }
}

/// A message passed between agents, invisible to the candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalThought {
    pub from_agent: String,
    pub to_agent: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl InternalThought {
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Rendering used by the summary log: `[Agent]: content` plus newline.
    pub fn log_line(&self) -> String {
        format!("[{}]: {}\n", self.from_agent, self.content)
    }
}

/// One round of the interview.  `user_message` and `internal_thoughts`
/// start empty and are each written at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: u32,
    pub agent_message: String,
    pub user_message: Option<String>,
    pub internal_thoughts: Vec<InternalThought>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(turn_id: u32, agent_message: impl Into<String>) -> Self {
        Self {
            turn_id,
            agent_message: agent_message.into(),
            user_message: None,
            internal_thoughts: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// First write wins; repeated attaches are no-ops so a retried turn
    /// cannot rewrite history.  Returns whether the message was stored.
    pub fn attach_user_message(&mut self, message: &str) -> bool {
        if self.user_message.is_some() {
            return false;
        }
        self.user_message = Some(message.to_string());
        true
    }

    /// First write wins, mirroring [`Turn::attach_user_message`].
    pub fn set_thoughts(&mut self, thoughts: Vec<InternalThought>) -> bool {
        if !self.internal_thoughts.is_empty() {
            return false;
        }
        self.internal_thoughts = thoughts;
        true
    }
}

/// A question the candidate answered incorrectly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub topic: String,
    pub user_answer: String,
    pub correct_answer: Option<String>,
}

/// The aggregate session state.  All mutation besides
/// [`InterviewState::adjust_difficulty`] goes through the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewState {
    pub participant_name: String,
    pub candidate: CandidateInfo,
    pub job_description: Option<String>,
    pub turns: Vec<Turn>,
    pub current_turn: usize,
    pub current_difficulty: Difficulty,
    pub covered_topics: Vec<String>,
    pub confirmed_skills: Vec<String>,
    pub knowledge_gaps: Vec<KnowledgeGap>,
    pub is_active: bool,
    pub consecutive_good_answers: u32,
    pub consecutive_bad_answers: u32,
}

impl InterviewState {
    pub const DEFAULT_PARTICIPANT: &'static str = "Unknown candidate";

    pub fn new(job_description: Option<String>) -> Self {
        Self {
            participant_name: Self::DEFAULT_PARTICIPANT.to_string(),
            candidate: CandidateInfo::default(),
            job_description,
            turns: Vec::new(),
            current_turn: 0,
            current_difficulty: Difficulty::Basic,
            covered_topics: Vec::new(),
            confirmed_skills: Vec::new(),
            knowledge_gaps: Vec::new(),
            is_active: true,
            consecutive_good_answers: 0,
            consecutive_bad_answers: 0,
        }
    }

    /// Appends a new agent-visible turn; `turn_id` values stay `1..=N` and
    /// `current_turn` stays equal to the turn count.
    pub fn add_turn(&mut self, agent_message: impl Into<String>) {
        let turn = Turn::new(self.current_turn as u32 + 1, agent_message);
        self.turns.push(turn);
        self.current_turn += 1;
    }

    /// The active question anchor: the most recent agent-visible message.
    /// Derived from the transcript rather than stored, so it can never
    /// drift from what the candidate actually saw.
    pub fn last_agent_message(&self) -> &str {
        self.turns
            .last()
            .map(|turn| turn.agent_message.as_str())
            .unwrap_or("")
    }

    /// Trailing `max_turns` turns as alternating assistant/user messages.
    /// Turns without a user reply contribute only the assistant side.
    pub fn history_window(&self, max_turns: usize) -> Vec<ChatMessage> {
        let start = self.turns.len().saturating_sub(max_turns);
        let mut history = Vec::new();
        for turn in &self.turns[start..] {
            history.push(ChatMessage::assistant(turn.agent_message.clone()));
            if let Some(user_message) = &turn.user_message {
                history.push(ChatMessage::user(user_message.clone()));
            }
        }
        history
    }

    pub fn add_covered_topic(&mut self, topic: &str) {
        push_unique(&mut self.covered_topics, topic);
    }

    pub fn add_confirmed_skill(&mut self, skill: &str) {
        push_unique(&mut self.confirmed_skills, skill);
    }

    /// Streak-based difficulty adjustment.
    ///
    /// Two consecutive analyses asking for the same direction move the
    /// level by one step and reset the streak.  The two flags are checked
    /// in `if / else if` order, so when an analysis carries both,
    /// `should_increase_difficulty` wins.  A neutral analysis resets both
    /// streaks, which keeps them from ever being nonzero together.
    pub fn adjust_difficulty(&mut self, analysis: &Analysis) {
        if analysis.should_increase_difficulty {
            self.consecutive_good_answers += 1;
            self.consecutive_bad_answers = 0;
            if self.consecutive_good_answers >= 2 {
                if self.current_difficulty < Difficulty::Expert {
                    self.current_difficulty = self.current_difficulty.step_up();
                }
                self.consecutive_good_answers = 0;
            }
        } else if analysis.should_simplify {
            self.consecutive_bad_answers += 1;
            self.consecutive_good_answers = 0;
            if self.consecutive_bad_answers >= 2 {
                if self.current_difficulty > Difficulty::Basic {
                    self.current_difficulty = self.current_difficulty.step_down();
                }
                self.consecutive_bad_answers = 0;
            }
        } else {
            self.consecutive_good_answers = 0;
            self.consecutive_bad_answers = 0;
        }
    }
}

fn push_unique(items: &mut Vec<String>, candidate: &str) {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return;
    }
    if !items.iter().any(|existing| existing == candidate) {
        items.push(candidate.to_string());
    }
}
