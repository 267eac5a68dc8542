//! The Observer's verdict on a single candidate reply.

use serde::{Deserialize, Serialize};

use crate::interview::InternalThought;

/// Classification of a candidate reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Introduction,
    Normal,
    Excellent,
    Incomplete,
    Hallucination,
    OffTopic,
    Question,
    StopCommand,
}

impl ResponseType {
    /// Lenient parse of the wire string; unknown input maps to `Normal`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "introduction" => ResponseType::Introduction,
            "excellent" => ResponseType::Excellent,
            "incomplete" => ResponseType::Incomplete,
            "hallucination" => ResponseType::Hallucination,
            "off_topic" => ResponseType::OffTopic,
            "question" => ResponseType::Question,
            "stop_command" => ResponseType::StopCommand,
            _ => ResponseType::Normal,
        }
    }

    /// Reply kinds that by definition leave the active question open.
    /// Used as the fallback when the LM omitted `answered_last_question`.
    /// `Hallucination` is deliberately absent: a hallucinated answer may
    /// still be an on-topic attempt, and that judgement stays with the LM.
    pub fn implies_unanswered(&self) -> bool {
        matches!(
            self,
            ResponseType::OffTopic | ResponseType::Question | ResponseType::StopCommand
        )
    }
}

/// How good the answer was on its own terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Excellent,
    Good,
    Acceptable,
    Poor,
    Wrong,
}

impl Quality {
    /// Lenient parse of the wire string; unknown input maps to `Acceptable`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "excellent" => Quality::Excellent,
            "good" => Quality::Good,
            "poor" => Quality::Poor,
            "wrong" => Quality::Wrong,
            _ => Quality::Acceptable,
        }
    }
}

/// Candidate facts the Observer spotted in the reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedCandidateInfo {
    pub name: Option<String>,
    pub position: Option<String>,
    pub grade: Option<String>,
    pub experience: Option<String>,
    pub technologies: Vec<String>,
}

impl ExtractedCandidateInfo {
    /// Whether the extraction carries anything worth applying.
    pub fn is_empty(&self) -> bool {
        let blank = |field: &Option<String>| {
            field.as_deref().map(str::trim).unwrap_or("").is_empty()
        };
        blank(&self.name)
            && blank(&self.position)
            && blank(&self.grade)
            && blank(&self.experience)
            && self.technologies.iter().all(|t| t.trim().is_empty())
    }
}

/// Observer output for one turn, after normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub response_type: ResponseType,
    pub quality: Quality,
    pub is_factually_correct: bool,
    pub is_gibberish: bool,
    pub answered_last_question: bool,
    pub detected_topics: Vec<String>,
    pub recommendation: String,
    pub thoughts: Vec<InternalThought>,
    pub should_simplify: bool,
    pub should_increase_difficulty: bool,
    pub correct_answer: Option<String>,
    pub extracted_info: Option<ExtractedCandidateInfo>,
    pub demonstrated_level: Option<String>,
}

impl Default for Analysis {
    fn default() -> Self {
        Self {
            response_type: ResponseType::Normal,
            quality: Quality::Acceptable,
            is_factually_correct: true,
            is_gibberish: false,
            answered_last_question: true,
            detected_topics: Vec::new(),
            recommendation: String::new(),
            thoughts: Vec::new(),
            should_simplify: false,
            should_increase_difficulty: false,
            correct_answer: None,
            extracted_info: None,
            demonstrated_level: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_type_wire_names() {
        let json = serde_json::to_value(ResponseType::OffTopic).unwrap();
        assert_eq!(json, "off_topic");
        let back: ResponseType = serde_json::from_value("stop_command".into()).unwrap();
        assert_eq!(back, ResponseType::StopCommand);
    }

    #[test]
    fn lenient_parses_fall_back_to_defaults() {
        assert_eq!(ResponseType::parse_lenient("hallucination"), ResponseType::Hallucination);
        assert_eq!(ResponseType::parse_lenient("OFF_TOPIC"), ResponseType::OffTopic);
        assert_eq!(ResponseType::parse_lenient("banter"), ResponseType::Normal);
        assert_eq!(Quality::parse_lenient("WRONG"), Quality::Wrong);
        assert_eq!(Quality::parse_lenient("meh"), Quality::Acceptable);
    }

    #[test]
    fn unanswered_fallback_set_excludes_hallucination() {
        assert!(ResponseType::OffTopic.implies_unanswered());
        assert!(ResponseType::Question.implies_unanswered());
        assert!(ResponseType::StopCommand.implies_unanswered());
        assert!(!ResponseType::Hallucination.implies_unanswered());
        assert!(!ResponseType::Normal.implies_unanswered());
        assert!(!ResponseType::Introduction.implies_unanswered());
    }

    #[test]
    fn extraction_emptiness_ignores_whitespace() {
        let mut info = ExtractedCandidateInfo::default();
        assert!(info.is_empty());

        info.name = Some("   ".into());
        info.technologies = vec!["".into()];
        assert!(info.is_empty());

        info.technologies = vec!["Rust".into()];
        assert!(!info.is_empty());
    }
}
