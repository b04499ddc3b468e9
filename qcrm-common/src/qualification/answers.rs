//! BANT answer set: budget, authority, need, timeline
//!
//! Every dimension may be left unanswered. Unanswered dimensions score zero
//! but still carry their weight.

use serde::{Deserialize, Serialize};

use crate::{Result, Violations};

text_enum! {
    pub enum BudgetTier {
        None => "none",
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

impl BudgetTier {
    pub fn sub_score(&self) -> f64 {
        match self {
            BudgetTier::None => 0.0,
            BudgetTier::Low => 40.0,
            BudgetTier::Medium => 70.0,
            BudgetTier::High => 100.0,
        }
    }
}

text_enum! {
    /// Decision-making power of the person on the call
    pub enum AuthorityLevel {
        None => "none",
        Influencer => "influencer",
        Sole => "sole",
    }
}

impl AuthorityLevel {
    pub fn sub_score(&self) -> f64 {
        match self {
            AuthorityLevel::None => 0.0,
            AuthorityLevel::Influencer => 50.0,
            AuthorityLevel::Sole => 100.0,
        }
    }
}

text_enum! {
    pub enum Timeline {
        NoTimeline => "no-timeline",
        ThisYear => "this-year",
        ThisQuarter => "this-quarter",
        Immediate => "immediate",
    }
}

impl Timeline {
    pub fn sub_score(&self) -> f64 {
        match self {
            Timeline::NoTimeline => 0.0,
            Timeline::ThisYear => 40.0,
            Timeline::ThisQuarter => 75.0,
            Timeline::Immediate => 100.0,
        }
    }
}

/// Need urgency on a 0-10 scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct NeedUrgency(u8);

impl NeedUrgency {
    pub const MAX: u8 = 10;

    pub fn new(value: i64) -> std::result::Result<Self, String> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(format!("must be between 0 and {}", Self::MAX))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn sub_score(&self) -> f64 {
        self.0 as f64 * 10.0
    }
}

impl TryFrom<i64> for NeedUrgency {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NeedUrgency> for i64 {
    fn from(need: NeedUrgency) -> Self {
        need.0 as i64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualificationAnswers {
    pub budget: Option<BudgetTier>,
    pub authority: Option<AuthorityLevel>,
    pub need: Option<NeedUrgency>,
    pub timeline: Option<Timeline>,
}

impl QualificationAnswers {
    pub fn answered_count(&self) -> usize {
        [
            self.budget.is_some(),
            self.authority.is_some(),
            self.need.is_some(),
            self.timeline.is_some(),
        ]
        .iter()
        .filter(|answered| **answered)
        .count()
    }
}

/// Answers as submitted, before their values are checked
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswersInput {
    pub budget: Option<String>,
    pub authority: Option<String>,
    pub need: Option<i64>,
    pub timeline: Option<String>,
}

impl AnswersInput {
    /// Parse every dimension, reporting all bad values together
    pub fn parse(self) -> Result<QualificationAnswers> {
        let mut v = Violations::new();

        fn dimension<T>(v: &mut Violations, field: &str, text: Option<String>) -> Option<T>
        where
            T: std::str::FromStr<Err = String>,
        {
            let text = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
            match text.parse() {
                Ok(parsed) => Some(parsed),
                Err(message) => {
                    v.push(field, message);
                    None
                }
            }
        }

        let budget = dimension(&mut v, "budget", self.budget);
        let authority = dimension(&mut v, "authority", self.authority);
        let timeline = dimension(&mut v, "timeline", self.timeline);
        let need = match self.need.map(NeedUrgency::new) {
            Some(Ok(need)) => Some(need),
            Some(Err(message)) => {
                v.push("need", message);
                None
            }
            None => None,
        };

        v.finish(QualificationAnswers {
            budget,
            authority,
            need,
            timeline,
        })
    }
}
