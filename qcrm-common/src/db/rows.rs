//! Decoding helpers for TEXT-encoded ids and choice columns

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

pub(crate) fn guid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let text: String = row.try_get(column)?;
    parse_guid(column, &text)
}

pub(crate) fn opt_guid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| parse_guid(column, &t)).transpose()
}

pub(crate) fn choice<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    let text: String = row.try_get(column)?;
    text.parse()
        .map_err(|e| Error::Internal(format!("Corrupt value in column {}: {}", column, e)))
}

pub(crate) fn opt_choice<T>(row: &SqliteRow, column: &str) -> Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| {
        t.parse()
            .map_err(|e| Error::Internal(format!("Corrupt value in column {}: {}", column, e)))
    })
    .transpose()
}

fn parse_guid(column: &str, text: &str) -> Result<Uuid> {
    Uuid::parse_str(text)
        .map_err(|e| Error::Internal(format!("Corrupt id in column {}: {}", column, e)))
}

/// Bindable TEXT form of an optional id
pub(crate) fn guid_text(id: Option<Uuid>) -> Option<String> {
    id.map(|u| u.to_string())
}
