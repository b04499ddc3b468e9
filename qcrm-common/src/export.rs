//! CSV and JSON export
//!
//! Rows are flattened to JSON objects first, then written out. CSV output
//! has a header row with the union of all keys in first-seen order, quoted
//! only where a name needs it; every data field is quoted. JSON output is a
//! pretty-printed array.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crm::Entity;
use crate::qualification::QualificationRecord;
use crate::{Error, Result};

text_enum! {
    pub enum ExportFormat {
        Csv => "csv",
        Json => "json",
    }
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub include_transcripts: bool,
    pub include_answers: bool,
    pub include_metadata: bool,
    pub format: ExportFormat,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_transcripts: false,
            include_answers: true,
            include_metadata: false,
            format: ExportFormat::Csv,
        }
    }
}

/// Something that can be flattened into one export row
pub trait ExportRow {
    fn export_fields(&self, options: &ExportOptions) -> Map<String, Value>;
}

impl ExportRow for Map<String, Value> {
    fn export_fields(&self, _options: &ExportOptions) -> Map<String, Value> {
        self.clone()
    }
}

impl ExportRow for QualificationRecord {
    fn export_fields(&self, options: &ExportOptions) -> Map<String, Value> {
        let mut row = Map::new();
        let mut put = |key: &str, value: Value| {
            row.insert(key.to_string(), value);
        };

        if options.include_metadata {
            put("id", Value::from(self.guid.to_string()));
        }
        put("client_name", Value::from(self.client_name.clone()));
        put("score", Value::from(self.score));
        put("classification", Value::from(self.classification.as_str()));

        if options.include_answers {
            put("budget", opt_text(self.answers.budget.map(|b| b.as_str())));
            put("authority", opt_text(self.answers.authority.map(|a| a.as_str())));
            put(
                "need",
                self.answers.need.map_or(Value::Null, |n| Value::from(n.value())),
            );
            put("timeline", opt_text(self.answers.timeline.map(|t| t.as_str())));
        }

        if options.include_transcripts {
            put("transcript", Value::from(self.transcript.clone()));
            put("transcript_source", opt_text(self.transcript_source.as_deref()));
        }

        if options.include_metadata {
            put("company_id", opt_id(self.company_id));
            put("contact_id", opt_id(self.contact_id));
            put("deal_id", opt_id(self.deal_id));
            put("activity_id", opt_id(self.activity_id));
            put("created_by", opt_id(self.created_by));
            put("created_at", Value::from(self.created_at.to_rfc3339()));
        }

        row
    }
}

/// Keys treated as record metadata on CRM entities
const ENTITY_METADATA: &[&str] = &["guid", "created_by", "created_at", "updated_at"];

impl ExportRow for Entity {
    fn export_fields(&self, options: &ExportOptions) -> Map<String, Value> {
        let mut row = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if !options.include_metadata {
            for key in ENTITY_METADATA {
                row.shift_remove(*key);
            }
        }
        row
    }
}

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, Value::from)
}

fn opt_id(id: Option<uuid::Uuid>) -> Value {
    id.map_or(Value::Null, |u| Value::from(u.to_string()))
}

/// Serialize `rows` according to `options.format`
pub fn export<R: ExportRow>(rows: &[R], options: &ExportOptions) -> Result<String> {
    let flattened: Vec<Map<String, Value>> =
        rows.iter().map(|r| r.export_fields(options)).collect();

    match options.format {
        ExportFormat::Json => serde_json::to_string_pretty(&flattened)
            .map_err(|e| Error::Internal(format!("JSON export failed: {}", e))),
        ExportFormat::Csv => to_csv(&flattened),
    }
}

fn to_csv(rows: &[Map<String, Value>]) -> Result<String> {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }
    if columns.is_empty() {
        return Ok(String::new());
    }

    let csv_err = |e: csv::Error| Error::Internal(format!("CSV export failed: {}", e));
    let into_bytes = |writer: csv::Writer<Vec<u8>>| {
        writer
            .into_inner()
            .map_err(|e| Error::Internal(format!("CSV export failed: {}", e)))
    };

    let mut header = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(vec![]);
    header.write_record(&columns).map_err(csv_err)?;

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(into_bytes(header)?);
    for row in rows {
        writer
            .write_record(columns.iter().map(|c| cell(row.get(*c))))
            .map_err(csv_err)?;
    }

    String::from_utf8(into_bytes(writer)?)
        .map_err(|e| Error::Internal(format!("CSV export failed: {}", e)))
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
