//! Field validation helpers shared by the entity modules
//!
//! Every helper records a violation and returns a placeholder instead of
//! failing, so one pass over a payload finds all problems.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

use crate::identity::Identity;
use crate::Violations;

/// Identity and timestamps assigned by the server
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stamp {
    pub guid: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether the row is being created by this write
    pub creating: bool,
}

impl Stamp {
    pub fn create(identity: &Identity, now: DateTime<Utc>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            created_by: Some(identity.user_id),
            created_at: now,
            updated_at: now,
            creating: true,
        }
    }

    pub fn update(
        guid: Uuid,
        created_by: Option<Uuid>,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            guid,
            created_by,
            created_at,
            updated_at: now,
            creating: false,
        }
    }
}

/// Trimmed non-empty text; records a violation when absent or blank
pub(crate) fn required_text(v: &mut Violations, field: &str, value: Option<String>) -> String {
    match value.map(|s| s.trim().to_string()) {
        Some(s) if !s.is_empty() => s,
        _ => {
            v.push(field, "is required");
            String::new()
        }
    }
}

/// Trimmed text, with blank treated as absent
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a choice field, falling back to `default` when absent
pub(crate) fn choice<T>(v: &mut Violations, field: &str, value: Option<String>, default: T) -> T
where
    T: FromStr<Err = String>,
{
    match value {
        None => default,
        Some(text) => match text.parse() {
            Ok(parsed) => parsed,
            Err(message) => {
                v.push(field, message);
                default
            }
        },
    }
}

/// Parse a choice field that is required
pub(crate) fn required_choice<T>(
    v: &mut Violations,
    field: &str,
    value: Option<String>,
    placeholder: T,
) -> T
where
    T: FromStr<Err = String>,
{
    if value.is_none() {
        v.push(field, "is required");
        return placeholder;
    }
    choice(v, field, value, placeholder)
}

pub(crate) fn non_negative(v: &mut Violations, field: &str, value: f64) -> f64 {
    if !value.is_finite() || value < 0.0 {
        v.push(field, "must be a non-negative number");
    }
    value
}

pub(crate) fn percent(v: &mut Violations, field: &str, value: f64) -> f64 {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        v.push(field, "must be between 0 and 100");
    }
    value
}

pub(crate) fn int_range(v: &mut Violations, field: &str, value: i64, min: i64, max: i64) -> i64 {
    if value < min || value > max {
        v.push(field, format!("must be between {} and {}", min, max));
    }
    value
}

pub(crate) fn at_least(v: &mut Violations, field: &str, value: i64, min: i64) -> i64 {
    if value < min {
        v.push(field, format!("must be at least {}", min));
    }
    value
}

/// Loose address check: something before and after a single `@`
pub(crate) fn email(v: &mut Violations, field: &str, value: Option<String>) -> Option<String> {
    let value = optional_text(value)?;
    let well_formed = match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    };
    if !well_formed {
        v.push(field, "is not a valid email address");
    }
    Some(value)
}
