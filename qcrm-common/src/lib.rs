//! # Qualify CRM Common Library
//!
//! Shared code for the Qualify CRM service including:
//! - CRM data model, validation and service layer
//! - BANT qualification scoring and qualification sessions
//! - Export of CRM and qualification records (CSV/JSON)
//! - Integration shims (transcription, booking, invitation dispatch)
//! - Configuration loading and database initialization

#[macro_use]
mod macros;

pub mod config;
pub mod crm;
pub mod db;
pub mod error;
pub mod export;
pub mod identity;
pub mod integrations;
pub mod invitations;
pub mod qualification;
pub mod settings;
pub mod time;

pub use error::{Error, FieldViolation, Result, Violations};
pub use identity::{Identity, Role};
