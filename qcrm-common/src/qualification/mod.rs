//! BANT call qualification
//!
//! [`answers`] holds the four BANT dimensions, [`scoring`] turns them into a
//! 0-100 score and a hot/warm/cold classification, [`session`] collects
//! answers during a call, and [`record`] persists completed qualifications.

pub mod answers;
pub mod record;
pub mod scoring;
pub mod session;

pub use answers::{
    AnswersInput, AuthorityLevel, BudgetTier, NeedUrgency, QualificationAnswers, Timeline,
};
pub use record::{CompletedQualification, QualificationRecord};
pub use scoring::{
    score, Classification, ScoreResult, ScoringConfig, ScoringWeights, SubScores, Thresholds,
};
pub use session::{
    CompletionOutcome, QualificationSession, SessionStart, SessionStore, DEFAULT_IDLE_TIMEOUT,
};
