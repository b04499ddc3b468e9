//! CRM entity listing and upsert
//!
//! One set of handlers serves every entity kind; the `:kind` path segment
//! is the plural table name (`companies`, `contacts`, `deals`, ...).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use qcrm_common::crm::{Entity, EntityKind, EntityPayload, ListFilter, SortSpec};
use qcrm_common::Identity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::pagination::{calculate_pagination, DEFAULT_PAGE_SIZE};
use crate::{ApiError, ApiResult, AppState};

/// Query parameters for entity listing
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EntityQuery {
    pub search: Option<String>,
    pub assignee: Option<Uuid>,
    pub status: Option<String>,
    pub stage: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: Option<String>,
    pub priority: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Column to sort by
    pub sort: Option<String>,
    /// Sort order: "asc" or "desc"
    pub order: Option<String>,
    /// Page number (1-indexed)
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl EntityQuery {
    fn filter(self) -> ListFilter {
        let descending = self
            .order
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case("desc"));

        ListFilter {
            search: self.search,
            assignee: self.assignee,
            status: self.status,
            stage: self.stage,
            activity_type: self.activity_type,
            priority: self.priority,
            from: self.from,
            to: self.to,
            sort: self.sort.map(|field| SortSpec { field, descending }),
            paging: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EntityPage {
    pub kind: EntityKind,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub items: Vec<Entity>,
}

pub(crate) fn parse_kind(kind: &str) -> ApiResult<EntityKind> {
    kind.parse()
        .map_err(|e| ApiError::NotFound(format!("entity kind: {}", e)))
}

/// GET /api/entities/:kind
pub async fn list_entities(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<EntityQuery>,
) -> ApiResult<Json<EntityPage>> {
    let kind = parse_kind(&kind)?;
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    let mut filter = query.filter();

    let total = state.service.count(kind, &filter).await?;
    let pagination = calculate_pagination(total, page, page_size);
    filter.paging = Some(pagination.paging());
    let items = state.service.list(kind, &filter).await?;

    Ok(Json(EntityPage {
        kind,
        total,
        page: pagination.page,
        page_size: pagination.page_size,
        total_pages: pagination.total_pages,
        items,
    }))
}

/// GET /api/entities/:kind/:id
pub async fn get_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Entity>> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.service.get(kind, id).await?))
}

/// POST /api/entities/:kind
///
/// A body without `guid` creates the entity (201); with `guid` it updates
/// the stored row, keeping fields the body leaves out (200).
pub async fn upsert_entity(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(kind): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Entity>)> {
    let kind = parse_kind(&kind)?;
    let payload = EntityPayload::from_json(kind, body)?;
    let creating = payload_guid(&payload).is_none();

    let entity = state.service.upsert(&identity, payload).await?;
    let status = if creating {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(entity)))
}

fn payload_guid(payload: &EntityPayload) -> Option<Uuid> {
    match payload {
        EntityPayload::Company(p) => p.guid,
        EntityPayload::Contact(p) => p.guid,
        EntityPayload::Deal(p) => p.guid,
        EntityPayload::Activity(p) => p.guid,
        EntityPayload::Product(p) => p.guid,
        EntityPayload::DealProduct(p) => p.guid,
    }
}
