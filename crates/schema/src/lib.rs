//! Typed records for an interview session: the evolving state, the
//! Observer's analysis of each candidate reply, and the Evaluator's final
//! feedback report.

mod analysis;
mod feedback;
mod interview;

pub use analysis::{Analysis, ExtractedCandidateInfo, Quality, ResponseType};
pub use feedback::{
    AssessedGrade, ClarityLevel, Feedback, HiringRecommendation, PersonalRoadmap, RoadmapItem,
    SkillAssessment, SoftSkillsReview, TechnicalReview, Verdict,
};
pub use interview::{
    CandidateInfo, Difficulty, Grade, InternalThought, InterviewState, KnowledgeGap, Turn,
};
