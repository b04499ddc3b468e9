//! Dashboard statistics

use axum::{
    extract::{Query, State},
    Json,
};
use qcrm_common::crm::{AssigneePerformance, DashboardStats};
use serde::Deserialize;

use crate::{ApiResult, AppState};

/// GET /api/dashboard/stats
pub async fn dashboard_stats(State(state): State<AppState>) -> ApiResult<Json<DashboardStats>> {
    Ok(Json(state.service.compute_dashboard_stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct PerformanceQuery {
    #[serde(default = "default_group_by_assignee")]
    pub group_by_assignee: bool,
}

fn default_group_by_assignee() -> bool {
    true
}

/// GET /api/dashboard/performance
pub async fn sales_performance(
    State(state): State<AppState>,
    Query(query): Query<PerformanceQuery>,
) -> ApiResult<Json<Vec<AssigneePerformance>>> {
    Ok(Json(
        state
            .service
            .compute_sales_performance(query.group_by_assignee)
            .await?,
    ))
}
