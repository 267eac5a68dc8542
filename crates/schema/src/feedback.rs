//! The Evaluator's final report on the interview.

use serde::{Deserialize, Serialize};

/// Hiring call for the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HiringRecommendation {
    #[serde(rename = "Strong Hire")]
    StrongHire,
    Hire,
    #[serde(rename = "No Hire")]
    NoHire,
}

impl HiringRecommendation {
    /// Substring-based lenient parse: "strong" beats "no"; anything else is
    /// a plain `Hire`.
    pub fn parse_lenient(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("strong") {
            HiringRecommendation::StrongHire
        } else if lower.contains("no") {
            HiringRecommendation::NoHire
        } else {
            HiringRecommendation::Hire
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HiringRecommendation::StrongHire => "Strong Hire",
            HiringRecommendation::Hire => "Hire",
            HiringRecommendation::NoHire => "No Hire",
        }
    }
}

/// Grade the candidate actually demonstrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssessedGrade {
    Intern,
    Junior,
    Middle,
    Senior,
    Lead,
}

impl AssessedGrade {
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "intern" => AssessedGrade::Intern,
            "middle" => AssessedGrade::Middle,
            "senior" => AssessedGrade::Senior,
            "lead" => AssessedGrade::Lead,
            _ => AssessedGrade::Junior,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssessedGrade::Intern => "Intern",
            AssessedGrade::Junior => "Junior",
            AssessedGrade::Middle => "Middle",
            AssessedGrade::Senior => "Senior",
            AssessedGrade::Lead => "Lead",
        }
    }
}

/// How clearly the candidate communicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClarityLevel {
    Excellent,
    Good,
    Average,
    Poor,
}

impl ClarityLevel {
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "excellent" => ClarityLevel::Excellent,
            "good" => ClarityLevel::Good,
            "poor" => ClarityLevel::Poor,
            _ => ClarityLevel::Average,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClarityLevel::Excellent => "Excellent",
            ClarityLevel::Good => "Good",
            ClarityLevel::Average => "Average",
            ClarityLevel::Poor => "Poor",
        }
    }
}

/// Overall verdict; `confidence_score` is always within `0..=100`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub grade: AssessedGrade,
    pub hiring_recommendation: HiringRecommendation,
    pub confidence_score: u8,
}

/// One assessed skill or gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillAssessment {
    pub topic: String,
    pub is_confirmed: bool,
    pub details: String,
    pub correct_answer: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnicalReview {
    pub confirmed_skills: Vec<SkillAssessment>,
    pub knowledge_gaps: Vec<SkillAssessment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftSkillsReview {
    pub clarity: ClarityLevel,
    pub clarity_details: String,
    pub honesty: String,
    pub honesty_details: String,
    pub engagement: String,
    pub engagement_details: String,
}

impl Default for SoftSkillsReview {
    fn default() -> Self {
        Self {
            clarity: ClarityLevel::Average,
            clarity_details: String::new(),
            honesty: "Not assessed".to_string(),
            honesty_details: String::new(),
            engagement: "Not assessed".to_string(),
            engagement_details: String::new(),
        }
    }
}

/// A study recommendation; priority 1 is the most urgent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadmapItem {
    pub topic: String,
    pub priority: u8,
    pub reason: String,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalRoadmap {
    pub items: Vec<RoadmapItem>,
    pub summary: String,
}

impl Default for PersonalRoadmap {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            summary: "No development plan was produced.".to_string(),
        }
    }
}

/// The full structured feedback record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub verdict: Verdict,
    pub technical_review: TechnicalReview,
    pub soft_skills_review: SoftSkillsReview,
    pub roadmap: PersonalRoadmap,
    pub general_comments: String,
}

impl Feedback {
    /// Human-readable report used on screen and in the summary log.
    pub fn to_report_string(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        let rule = "=".repeat(60);
        let thin = "-".repeat(40);

        lines.push(rule.clone());
        lines.push("FINAL INTERVIEW FEEDBACK".to_string());
        lines.push(rule.clone());
        lines.push(String::new());

        lines.push("VERDICT".to_string());
        lines.push(thin.clone());
        lines.push(format!("Level: {}", self.verdict.grade.as_str()));
        lines.push(format!(
            "Recommendation: {}",
            self.verdict.hiring_recommendation.as_str()
        ));
        lines.push(format!("Confidence: {}%", self.verdict.confidence_score));
        lines.push(String::new());

        lines.push("TECHNICAL SKILLS".to_string());
        lines.push(thin.clone());
        if self.technical_review.confirmed_skills.is_empty() {
            lines.push("Confirmed skills: none recorded".to_string());
        } else {
            lines.push("Confirmed skills:".to_string());
            for skill in &self.technical_review.confirmed_skills {
                lines.push(format!("  * {}: {}", skill.topic, skill.details));
            }
        }
        if self.technical_review.knowledge_gaps.is_empty() {
            lines.push("Knowledge gaps: none detected".to_string());
        } else {
            lines.push("Knowledge gaps:".to_string());
            for gap in &self.technical_review.knowledge_gaps {
                lines.push(format!("  * {}: {}", gap.topic, gap.details));
                if let Some(correct) = &gap.correct_answer {
                    lines.push(format!("    Correct answer: {correct}"));
                }
            }
        }
        lines.push(String::new());

        lines.push("SOFT SKILLS".to_string());
        lines.push(thin.clone());
        lines.push(format!("Clarity: {}", self.soft_skills_review.clarity.as_str()));
        lines.push(format!("  {}", self.soft_skills_review.clarity_details));
        lines.push(format!("Honesty: {}", self.soft_skills_review.honesty));
        lines.push(format!("  {}", self.soft_skills_review.honesty_details));
        lines.push(format!("Engagement: {}", self.soft_skills_review.engagement));
        lines.push(format!("  {}", self.soft_skills_review.engagement_details));
        lines.push(String::new());

        lines.push("DEVELOPMENT ROADMAP".to_string());
        lines.push(thin.clone());
        lines.push(self.roadmap.summary.clone());
        let mut items: Vec<&RoadmapItem> = self.roadmap.items.iter().collect();
        items.sort_by_key(|item| item.priority);
        for item in items {
            lines.push(format!("[Priority {}] {}", item.priority, item.topic));
            lines.push(format!("  Reason: {}", item.reason));
            if !item.resources.is_empty() {
                lines.push(format!("  Resources: {}", item.resources.join(", ")));
            }
        }
        lines.push(String::new());

        lines.push("GENERAL COMMENTS".to_string());
        lines.push(thin);
        lines.push(self.general_comments.clone());
        lines.push(rule);

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback() -> Feedback {
        Feedback {
            verdict: Verdict {
                grade: AssessedGrade::Middle,
                hiring_recommendation: HiringRecommendation::Hire,
                confidence_score: 78,
            },
            technical_review: TechnicalReview {
                confirmed_skills: vec![SkillAssessment {
                    topic: "SQL".into(),
                    is_confirmed: true,
                    details: "solid on indexes".into(),
                    correct_answer: None,
                }],
                knowledge_gaps: vec![SkillAssessment {
                    topic: "Python".into(),
                    is_confirmed: false,
                    details: "confused the GIL with a mutex on user code".into(),
                    correct_answer: Some("The GIL serializes bytecode execution".into()),
                }],
            },
            soft_skills_review: SoftSkillsReview::default(),
            roadmap: PersonalRoadmap {
                items: vec![
                    RoadmapItem {
                        topic: "Concurrency".into(),
                        priority: 2,
                        reason: "shaky fundamentals".into(),
                        resources: vec!["official docs".into()],
                    },
                    RoadmapItem {
                        topic: "GIL internals".into(),
                        priority: 1,
                        reason: "direct gap".into(),
                        resources: vec![],
                    },
                ],
                summary: "Focus on runtime internals.".into(),
            },
            general_comments: "Good trajectory.".into(),
        }
    }

    #[test]
    fn hiring_recommendation_lenient_parse() {
        assert_eq!(
            HiringRecommendation::parse_lenient("Strong Hire!"),
            HiringRecommendation::StrongHire
        );
        assert_eq!(HiringRecommendation::parse_lenient("no hire"), HiringRecommendation::NoHire);
        assert_eq!(HiringRecommendation::parse_lenient("hire"), HiringRecommendation::Hire);
        assert_eq!(HiringRecommendation::parse_lenient("maybe"), HiringRecommendation::Hire);
    }

    #[test]
    fn wire_names_keep_spaces() {
        let json = serde_json::to_value(HiringRecommendation::StrongHire).unwrap();
        assert_eq!(json, "Strong Hire");
        let back: HiringRecommendation = serde_json::from_value("No Hire".into()).unwrap();
        assert_eq!(back, HiringRecommendation::NoHire);
    }

    #[test]
    fn grade_and_clarity_defaults() {
        assert_eq!(AssessedGrade::parse_lenient("principal"), AssessedGrade::Junior);
        assert_eq!(ClarityLevel::parse_lenient("unclear"), ClarityLevel::Average);
    }

    #[test]
    fn report_lists_roadmap_by_priority() {
        let report = feedback().to_report_string();
        let first = report.find("[Priority 1] GIL internals").expect("priority 1 item");
        let second = report.find("[Priority 2] Concurrency").expect("priority 2 item");
        assert!(first < second);
        assert!(report.contains("Confidence: 78%"));
        assert!(report.contains("Correct answer: The GIL serializes bytecode execution"));
    }
}
