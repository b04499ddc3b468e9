//! Qualification scoring and lead classification
//!
//! Each answered dimension maps to a 0-100 sub-score. The score is the
//! weighted mean of the four sub-scores (weights normalized by their sum),
//! rounded half away from zero and clamped to 0-100. The result depends on
//! the answers and the configuration only.

use serde::{Deserialize, Serialize};

use super::answers::QualificationAnswers;
use crate::{Result, Violations};

text_enum! {
    pub enum Classification {
        Hot => "hot",
        Warm => "warm",
        Cold => "cold",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub budget: f64,
    pub authority: f64,
    pub need: f64,
    pub timeline: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            budget: 0.25,
            authority: 0.25,
            need: 0.25,
            timeline: 0.25,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.budget + self.authority + self.need + self.timeline
    }

    fn check(&self, v: &mut Violations) {
        let named = [
            ("weights.budget", self.budget),
            ("weights.authority", self.authority),
            ("weights.need", self.need),
            ("weights.timeline", self.timeline),
        ];
        let mut all_valid = true;
        for (field, weight) in named {
            if !weight.is_finite() || weight < 0.0 {
                v.push(field, "must be a finite non-negative number");
                all_valid = false;
            }
        }
        if all_valid && self.sum() <= 0.0 {
            v.push("weights", "must not all be zero");
        }
    }
}

/// Lower bounds (inclusive) of the hot and warm bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub hot: u8,
    pub warm: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { hot: 75, warm: 50 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub thresholds: Thresholds,
    /// Warm leads at or above this score are offered a booking link
    pub booking_warm_min_score: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            thresholds: Thresholds::default(),
            booking_warm_min_score: 60,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        let mut v = Violations::new();

        self.weights.check(&mut v);

        let Thresholds { hot, warm } = self.thresholds;
        if hot > 100 {
            v.push("thresholds.hot", "must be between 0 and 100");
        }
        if warm > 100 {
            v.push("thresholds.warm", "must be between 0 and 100");
        }
        if hot <= warm {
            v.push("thresholds.hot", "must be greater than the warm threshold");
        }
        if self.booking_warm_min_score > 100 {
            v.push("booking_warm_min_score", "must be between 0 and 100");
        }

        v.finish(())
    }

    pub fn classify(&self, score: u8) -> Classification {
        if score >= self.thresholds.hot {
            Classification::Hot
        } else if score >= self.thresholds.warm {
            Classification::Warm
        } else {
            Classification::Cold
        }
    }

    /// Hot leads always qualify for booking; warm ones from the minimum up
    pub fn booking_eligible(&self, result: &ScoreResult) -> bool {
        match result.classification {
            Classification::Hot => true,
            Classification::Warm => result.score >= self.booking_warm_min_score,
            Classification::Cold => false,
        }
    }
}

/// Per-dimension sub-scores before weighting
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SubScores {
    pub budget: f64,
    pub authority: f64,
    pub need: f64,
    pub timeline: f64,
}

impl SubScores {
    pub fn of(answers: &QualificationAnswers) -> Self {
        Self {
            budget: answers.budget.map_or(0.0, |b| b.sub_score()),
            authority: answers.authority.map_or(0.0, |a| a.sub_score()),
            need: answers.need.map_or(0.0, |n| n.sub_score()),
            timeline: answers.timeline.map_or(0.0, |t| t.sub_score()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreResult {
    pub score: u8,
    pub classification: Classification,
    pub sub_scores: SubScores,
}

/// Score `answers` under `config`
///
/// `config` is assumed valid (see [`ScoringConfig::validate`]); a zero
/// weight sum scores 0.
pub fn score(answers: &QualificationAnswers, config: &ScoringConfig) -> ScoreResult {
    let sub = SubScores::of(answers);
    let w = &config.weights;
    let total = w.sum();

    let weighted = if total > 0.0 {
        (w.budget * sub.budget
            + w.authority * sub.authority
            + w.need * sub.need
            + w.timeline * sub.timeline)
            / total
    } else {
        0.0
    };
    let score = weighted.round().clamp(0.0, 100.0) as u8;

    ScoreResult {
        score,
        classification: config.classify(score),
        sub_scores: sub,
    }
}
