//! Common error types for Qualify CRM

use serde::Serialize;
use thiserror::Error;

/// Common result type for Qualify CRM operations
pub type Result<T> = std::result::Result<T, Error>;

/// One rejected field of a submitted payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Every violation found while validating a payload
///
/// Validators push into this instead of returning on the first problem, so
/// the caller sees the complete list in one round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Violations(Vec<FieldViolation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldViolation> {
        self.0.iter()
    }

    /// Names of the rejected fields, in the order they were found
    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|v| v.field.as_str()).collect()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|v| v.field == field)
    }

    /// Append `later`, skipping fields this set already rejects
    pub fn merge(mut self, later: Violations) -> Self {
        for violation in later.0 {
            if !self.contains(&violation.field) {
                self.0.push(violation);
            }
        }
        self
    }

    /// `Ok(value)` when nothing was violated, otherwise `Error::Validation`
    pub fn finish<T>(self, value: T) -> Result<T> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl std::fmt::Display for Violations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Common error types across Qualify CRM
#[derive(Error, Debug)]
pub enum Error {
    /// Missing required field or invalid value, with every violation listed
    #[error("Validation failed: {0}")]
    Validation(Violations),

    /// Transient storage failure (busy/locked database, pool exhausted, I/O)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transcription, booking or notification collaborator failed
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Identity lacks the role required for the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Non-transient database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Single-field validation failure
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut violations = Violations::new();
        violations.push(field, message);
        Error::Validation(violations)
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_))
    }
}

/// SQLite result codes that indicate contention rather than a bad statement:
/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended forms.
const TRANSIENT_SQLITE_CODES: &[&str] = &["5", "6", "261", "262", "517"];

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Error::StorageUnavailable(err.to_string())
            }
            sqlx::Error::Io(e) => Error::StorageUnavailable(e.to_string()),
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            sqlx::Error::Database(ref db_err) => {
                let transient = db_err
                    .code()
                    .map(|code| TRANSIENT_SQLITE_CODES.iter().any(|c| *c == code))
                    .unwrap_or(false)
                    || db_err.message().contains("database is locked");
                if transient {
                    Error::StorageUnavailable(db_err.message().to_string())
                } else {
                    Error::Database(err)
                }
            }
            other => Error::Database(other),
        }
    }
}
