//! Evaluator: reads the full transcript and produces the structured final
//! feedback.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use intervo_config::AgentGenSettings;
use intervo_llm::{ChatBackend, CompletionRequest, LlmError, parse_structured};
use intervo_schema::{
    AssessedGrade, ClarityLevel, Feedback, HiringRecommendation, InterviewState, PersonalRoadmap,
    RoadmapItem, SkillAssessment, SoftSkillsReview, TechnicalReview, Verdict,
};

use crate::common::assemble_messages;
use crate::prompts::EVALUATOR_SYSTEM_PROMPT;

const GENERATION_NAME: &str = "evaluator_feedback";
const DEFAULT_CONFIDENCE: i64 = 50;

pub struct EvaluatorAgent {
    backend: Arc<dyn ChatBackend>,
    settings: AgentGenSettings,
}

impl EvaluatorAgent {
    pub fn new(backend: Arc<dyn ChatBackend>, settings: AgentGenSettings) -> Self {
        Self { backend, settings }
    }

    /// Produces the final feedback.  Parse failures are retried up to
    /// `generation_retries` times; unlike the Observer there is no
    /// heuristic fallback — a report that cannot be parsed is an error.
    pub async fn evaluate(&self, state: &InterviewState) -> Result<Feedback, LlmError> {
        let context = build_evaluation_context(state);
        let messages = assemble_messages(EVALUATOR_SYSTEM_PROMPT, Vec::new(), context);

        let retries = self.settings.generation_retries;
        let mut last_error: Option<LlmError> = None;
        for attempt in 0..=retries {
            let request = CompletionRequest {
                messages: messages.clone(),
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
                generation_name: GENERATION_NAME.to_string(),
            };
            match self.backend.complete(request).await {
                Ok(text) => match parse_structured(&text) {
                    Ok(record) => {
                        debug!("evaluator feedback parsed");
                        return Ok(parse_feedback(&record));
                    }
                    Err(err) => {
                        warn!(
                            attempt = attempt + 1,
                            total = retries + 1,
                            error = %err,
                            "evaluator feedback failed to parse"
                        );
                        last_error = Some(err.into());
                    }
                },
                Err(err) => return Err(err.into()),
            }
        }

        error!(attempts = retries + 1, "evaluator feedback unparsable after all attempts");
        Err(last_error.unwrap_or_else(|| {
            LlmError::Parse(intervo_llm::ParseError::Empty)
        }))
    }
}

fn build_evaluation_context(state: &InterviewState) -> String {
    let mut candidate_lines = vec![format!("Name: {}", state.participant_name)];
    if let Some(position) = &state.candidate.position {
        candidate_lines.push(format!("Position: {position}"));
    }
    if let Some(grade) = state.candidate.target_grade {
        candidate_lines.push(format!("Declared grade: {}", grade.as_str()));
    }
    if let Some(experience) = &state.candidate.experience {
        candidate_lines.push(format!("Declared experience: {experience}"));
    }

    let job_block = state
        .job_description
        .as_deref()
        .map(|job| format!("\nJOB DESCRIPTION:\n{job}\n"))
        .unwrap_or_default();

    format!(
        "CANDIDATE:\n{candidate}\n\n\
         INTERVIEW STATS:\n\
         Total turns: {turns}\n\
         Final difficulty level: {difficulty}\n\
         {job_block}\
         TRANSCRIPT:\n{transcript}\n\n\
         PRELIMINARY SKILL ASSESSMENT:\n{skills}\n\n\
         Produce the detailed interview feedback. Follow the output_format instructions:\n\
         1. Write your reasoning in <reasoning>...</reasoning>.\n\
         2. Output the JSON in <r>...</r>.\n\n\
         Take into account:\n\
         1. How the demonstrated level compares with the declared grade\n\
         2. Any hallucinations or factual errors\n\
         3. How the candidate handled hard questions\n\
         4. Any meaningless messages (garbage, keyboard tests)\n\
         5. Soft skills: honesty, clarity, engagement\n\
         6. Concrete development recommendations\n\
         7. Fit against the job description, when one is present",
        candidate = candidate_lines.join("\n"),
        turns = state.turns.len(),
        difficulty = state.current_difficulty.as_str(),
        transcript = format_transcript(state),
        skills = format_skills_summary(state),
    )
}

fn format_transcript(state: &InterviewState) -> String {
    let mut lines = Vec::new();
    for turn in &state.turns {
        lines.push(format!("[Interviewer]: {}", turn.agent_message));
        if let Some(user_message) = &turn.user_message {
            lines.push(format!("[Candidate]: {user_message}"));
        }
        if !turn.internal_thoughts.is_empty() {
            let thoughts = turn
                .internal_thoughts
                .iter()
                .map(|t| t.content.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            lines.push(format!("[Internal thoughts]: {thoughts}"));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

fn format_skills_summary(state: &InterviewState) -> String {
    let mut lines = Vec::new();

    if !state.confirmed_skills.is_empty() {
        lines.push("Confirmed skills:".to_string());
        for skill in &state.confirmed_skills {
            lines.push(format!("  + {skill}"));
        }
    }
    if !state.knowledge_gaps.is_empty() {
        lines.push("Knowledge gaps:".to_string());
        for gap in &state.knowledge_gaps {
            lines.push(format!("  - {}", gap.topic));
            if let Some(correct) = &gap.correct_answer {
                lines.push(format!("    Correct answer: {correct}"));
            }
        }
    }
    if !state.covered_topics.is_empty() {
        lines.push(format!("Covered topics: {}", state.covered_topics.join(", ")));
    }

    if lines.is_empty() {
        "No data recorded.".to_string()
    } else {
        lines.join("\n")
    }
}

/// Coerces the raw LM record into a [`Feedback`].
///
/// Every nested object is fetched with `null` treated the same as missing,
/// enum strings fall back to their defaults, the confidence score is
/// clamped into `0..=100`, and malformed array elements are skipped.
fn parse_feedback(record: &Map<String, Value>) -> Feedback {
    let verdict_data = object_or_empty(record.get("verdict"));
    let verdict = Verdict {
        grade: verdict_data
            .get("grade")
            .and_then(Value::as_str)
            .map(AssessedGrade::parse_lenient)
            .unwrap_or(AssessedGrade::Junior),
        hiring_recommendation: verdict_data
            .get("hiring_recommendation")
            .and_then(Value::as_str)
            .map(HiringRecommendation::parse_lenient)
            .unwrap_or(HiringRecommendation::Hire),
        confidence_score: verdict_data
            .get("confidence_score")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0, 100) as u8,
    };

    let tech_data = object_or_empty(record.get("technical_review"));
    let technical_review = TechnicalReview {
        confirmed_skills: skill_list(tech_data.get("confirmed_skills"), true),
        knowledge_gaps: skill_list(tech_data.get("knowledge_gaps"), false),
    };

    let soft_data = object_or_empty(record.get("soft_skills_review"));
    let soft_defaults = SoftSkillsReview::default();
    let soft_skills_review = SoftSkillsReview {
        clarity: soft_data
            .get("clarity")
            .and_then(Value::as_str)
            .map(ClarityLevel::parse_lenient)
            .unwrap_or(ClarityLevel::Average),
        clarity_details: text_or(&soft_data, "clarity_details", ""),
        honesty: text_or(&soft_data, "honesty", &soft_defaults.honesty),
        honesty_details: text_or(&soft_data, "honesty_details", ""),
        engagement: text_or(&soft_data, "engagement", &soft_defaults.engagement),
        engagement_details: text_or(&soft_data, "engagement_details", ""),
    };

    let roadmap_data = object_or_empty(record.get("roadmap"));
    let roadmap = PersonalRoadmap {
        items: roadmap_data
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(roadmap_item).collect())
            .unwrap_or_default(),
        summary: text_or(&roadmap_data, "summary", &PersonalRoadmap::default().summary),
    };

    Feedback {
        verdict,
        technical_review,
        soft_skills_review,
        roadmap,
        general_comments: text_or(record, "general_comments", ""),
    }
}

fn skill_list(value: Option<&Value>, default_confirmed: bool) -> Vec<SkillAssessment> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| skill_assessment(item, default_confirmed))
                .collect()
        })
        .unwrap_or_default()
}

fn skill_assessment(value: &Value, default_confirmed: bool) -> Option<SkillAssessment> {
    let record = value.as_object()?;
    let topic = record.get("topic").and_then(Value::as_str)?.to_string();
    Some(SkillAssessment {
        topic,
        is_confirmed: record
            .get("is_confirmed")
            .and_then(Value::as_bool)
            .unwrap_or(default_confirmed),
        details: text_or(record, "details", ""),
        correct_answer: record
            .get("correct_answer")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    })
}

fn roadmap_item(value: &Value) -> Option<RoadmapItem> {
    let record = value.as_object()?;
    let topic = record.get("topic").and_then(Value::as_str)?.to_string();
    Some(RoadmapItem {
        topic,
        priority: record
            .get("priority")
            .and_then(Value::as_i64)
            .unwrap_or(3)
            .clamp(1, 5) as u8,
        reason: text_or(record, "reason", ""),
        resources: record
            .get("resources")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

/// `null` values behave exactly like missing keys.
fn object_or_empty(value: Option<&Value>) -> Map<String, Value> {
    value.and_then(Value::as_object).cloned().unwrap_or_default()
}

fn text_or(record: &Map<String, Value>, key: &str, default: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().expect("object literal").clone()
    }

    // ── coercion boundaries ────────────────────────────────────────────────

    #[test]
    fn null_nested_objects_behave_like_missing() {
        let feedback = parse_feedback(&record(json!({
            "verdict": null,
            "technical_review": null,
            "soft_skills_review": null,
            "roadmap": null,
        })));
        assert_eq!(feedback.verdict.grade, AssessedGrade::Junior);
        assert_eq!(feedback.verdict.hiring_recommendation, HiringRecommendation::Hire);
        assert_eq!(feedback.verdict.confidence_score, 50);
        assert!(feedback.technical_review.confirmed_skills.is_empty());
        assert_eq!(feedback.soft_skills_review.clarity, ClarityLevel::Average);
        assert!(feedback.roadmap.items.is_empty());
    }

    #[test]
    fn empty_record_yields_full_default_feedback() {
        let feedback = parse_feedback(&Map::new());
        assert_eq!(feedback.verdict.confidence_score, 50);
        assert_eq!(feedback.general_comments, "");
        assert_eq!(feedback.roadmap.summary, PersonalRoadmap::default().summary);
    }

    #[test]
    fn confidence_is_clamped_both_ways() {
        let feedback = parse_feedback(&record(json!({"verdict": {"confidence_score": 250}})));
        assert_eq!(feedback.verdict.confidence_score, 100);

        let feedback = parse_feedback(&record(json!({"verdict": {"confidence_score": -10}})));
        assert_eq!(feedback.verdict.confidence_score, 0);
    }

    #[test]
    fn unknown_enum_strings_map_to_defaults() {
        let feedback = parse_feedback(&record(json!({
            "verdict": {"grade": "Principal", "hiring_recommendation": "maybe later"},
            "soft_skills_review": {"clarity": "crystalline"},
        })));
        assert_eq!(feedback.verdict.grade, AssessedGrade::Junior);
        assert_eq!(feedback.verdict.hiring_recommendation, HiringRecommendation::Hire);
        assert_eq!(feedback.soft_skills_review.clarity, ClarityLevel::Average);
    }

    #[test]
    fn malformed_array_elements_are_skipped() {
        let feedback = parse_feedback(&record(json!({
            "technical_review": {
                "confirmed_skills": [
                    {"topic": "SQL", "details": "fine"},
                    "not an object",
                    {"details": "missing topic"},
                ],
            },
            "roadmap": {
                "items": [{"topic": "GIL", "priority": 9}, 42],
                "summary": "study",
            },
        })));
        assert_eq!(feedback.technical_review.confirmed_skills.len(), 1);
        assert_eq!(feedback.technical_review.confirmed_skills[0].topic, "SQL");
        assert!(feedback.technical_review.confirmed_skills[0].is_confirmed);
        assert_eq!(feedback.roadmap.items.len(), 1);
        // Out-of-range priority is pulled back into 1..=5.
        assert_eq!(feedback.roadmap.items[0].priority, 5);
    }

    #[test]
    fn complete_record_parses_faithfully() {
        let feedback = parse_feedback(&record(json!({
            "verdict": {"grade": "Senior", "hiring_recommendation": "Strong Hire", "confidence_score": 88},
            "technical_review": {
                "confirmed_skills": [{"topic": "Rust", "is_confirmed": true, "details": "ownership solid", "correct_answer": null}],
                "knowledge_gaps": [{"topic": "async", "is_confirmed": false, "details": "confused pinning", "correct_answer": "Pin prevents moves"}],
            },
            "soft_skills_review": {
                "clarity": "Good", "clarity_details": "structured",
                "honesty": "High", "honesty_details": "admitted unknowns",
                "engagement": "High", "engagement_details": "asked questions",
            },
            "roadmap": {"items": [{"topic": "async", "priority": 1, "reason": "gap", "resources": ["async book"]}], "summary": "close the async gap"},
            "general_comments": "strong candidate",
        })));
        assert_eq!(feedback.verdict.grade, AssessedGrade::Senior);
        assert_eq!(feedback.verdict.hiring_recommendation, HiringRecommendation::StrongHire);
        assert_eq!(feedback.verdict.confidence_score, 88);
        assert_eq!(
            feedback.technical_review.knowledge_gaps[0].correct_answer.as_deref(),
            Some("Pin prevents moves")
        );
        assert_eq!(feedback.roadmap.items[0].resources, vec!["async book"]);
        assert_eq!(feedback.general_comments, "strong candidate");
    }

    // ── context building ───────────────────────────────────────────────────

    #[test]
    fn evaluation_context_includes_transcript_and_gaps() {
        let mut state = InterviewState::new(None);
        state.participant_name = "Jordan".into();
        state.add_turn("What is a WAL?");
        state.turns[0].attach_user_message("a write-ahead log");
        state.add_confirmed_skill("PostgreSQL");
        state.knowledge_gaps.push(intervo_schema::KnowledgeGap {
            topic: "Python".into(),
            user_answer: "Python 4.0".into(),
            correct_answer: Some("Python 4.0 does not exist.".into()),
        });

        let context = build_evaluation_context(&state);
        assert!(context.contains("Name: Jordan"));
        assert!(context.contains("[Interviewer]: What is a WAL?"));
        assert!(context.contains("[Candidate]: a write-ahead log"));
        assert!(context.contains("  + PostgreSQL"));
        assert!(context.contains("Correct answer: Python 4.0 does not exist."));
    }

    // ── retry flow against a scripted backend ──────────────────────────────

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use intervo_llm::{ChatBackend, GatewayError};

    struct SeqBackend(Mutex<VecDeque<Result<String, u16>>>);

    impl SeqBackend {
        fn new(replies: Vec<Result<&str, u16>>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(ToString::to_string))
                    .collect(),
            )))
        }

        fn remaining(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for SeqBackend {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, GatewayError> {
            match self.0.lock().unwrap().pop_front().expect("scripted reply") {
                Ok(text) => Ok(text),
                Err(status) => Err(GatewayError::Http { status, body: "scripted".into() }),
            }
        }

        async fn complete_json(
            &self,
            request: CompletionRequest,
        ) -> Result<Map<String, Value>, LlmError> {
            let text = self.complete(request).await?;
            Ok(parse_structured(&text)?)
        }
    }

    fn settings(retries: u32) -> AgentGenSettings {
        AgentGenSettings {
            temperature: 0.3,
            max_tokens: 3000,
            generation_retries: retries,
        }
    }

    #[tokio::test]
    async fn parse_failure_retries_then_raises() {
        let backend = SeqBackend::new(vec![Ok("no json"), Ok("still none")]);
        let evaluator = EvaluatorAgent::new(backend.clone(), settings(1));
        let state = InterviewState::new(None);

        let err = evaluator.evaluate(&state).await.unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
        assert_eq!(backend.remaining(), 0);
    }

    #[tokio::test]
    async fn retry_can_recover_a_report() {
        let valid = r#"<r>{"verdict": {"grade": "Middle", "hiring_recommendation": "Hire", "confidence_score": 65}}</r>"#;
        let backend = SeqBackend::new(vec![Ok("garbage"), Ok(valid)]);
        let evaluator = EvaluatorAgent::new(backend.clone(), settings(1));
        let state = InterviewState::new(None);

        let feedback = evaluator.evaluate(&state).await.unwrap();
        assert_eq!(feedback.verdict.grade, AssessedGrade::Middle);
        assert_eq!(feedback.verdict.confidence_score, 65);
        assert_eq!(backend.remaining(), 0);
    }

    #[tokio::test]
    async fn gateway_errors_bubble_immediately() {
        let backend = SeqBackend::new(vec![Err(500)]);
        let evaluator = EvaluatorAgent::new(backend.clone(), settings(5));
        let state = InterviewState::new(None);

        let err = evaluator.evaluate(&state).await.unwrap_err();
        assert!(matches!(err, LlmError::Gateway(GatewayError::Http { status: 500, .. })));
        // No content retries were attempted after the transport failure.
        assert_eq!(backend.remaining(), 0);
    }
}
