//! CSV/JSON download of qualifications and CRM entities

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use qcrm_common::crm::ListFilter;
use qcrm_common::export::{export, ExportFormat, ExportOptions};
use serde::Deserialize;
use tracing::info;

use super::entities::parse_kind;
use super::qualification::parse_classification;
use crate::{ApiResult, AppState};

/// Query parameters shared by both export endpoints
///
/// Unset flags take the [`ExportOptions`] defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportQuery {
    pub format: Option<ExportFormat>,
    pub include_transcripts: Option<bool>,
    pub include_answers: Option<bool>,
    pub include_metadata: Option<bool>,
    /// Qualification export only
    pub classification: Option<String>,
}

impl ExportQuery {
    fn options(&self) -> ExportOptions {
        let defaults = ExportOptions::default();
        ExportOptions {
            include_transcripts: self
                .include_transcripts
                .unwrap_or(defaults.include_transcripts),
            include_answers: self.include_answers.unwrap_or(defaults.include_answers),
            include_metadata: self.include_metadata.unwrap_or(defaults.include_metadata),
            format: self.format.unwrap_or(defaults.format),
        }
    }
}

fn download(name: &str, options: &ExportOptions, body: String) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        name,
        options.format.extension()
    );
    (
        [
            (header::CONTENT_TYPE, options.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

/// GET /api/export/qualifications
pub async fn export_qualifications(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let classification = parse_classification(query.classification.as_deref())?;
    let options = query.options();

    let records = state.service.list_qualifications(classification).await?;
    let body = export(&records, &options)?;

    info!(rows = records.len(), format = %options.format, "Exported qualifications");
    Ok(download("qualifications", &options, body))
}

/// GET /api/export/:kind
pub async fn export_entities(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let kind = parse_kind(&kind)?;
    let options = query.options();

    let entities = state.service.list(kind, &ListFilter::default()).await?;
    let body = export(&entities, &options)?;

    info!(kind = %kind, rows = entities.len(), format = %options.format, "Exported entities");
    Ok(download(kind.as_str(), &options, body))
}
