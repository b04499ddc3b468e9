//! Scoring configuration endpoints

use axum::{extract::State, Extension, Json};
use qcrm_common::qualification::ScoringConfig;
use qcrm_common::settings::{load_scoring_config, save_scoring_config};
use qcrm_common::Identity;

use crate::{ApiResult, AppState};

/// GET /api/settings/scoring
pub async fn get_scoring_config(State(state): State<AppState>) -> ApiResult<Json<ScoringConfig>> {
    Ok(Json(load_scoring_config(&state.db).await?))
}

/// PUT /api/settings/scoring (admin only)
///
/// Fields left out of the body keep their defaults, not their stored
/// values; clients send the full configuration.
pub async fn put_scoring_config(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(config): Json<ScoringConfig>,
) -> ApiResult<Json<ScoringConfig>> {
    save_scoring_config(&state.db, &identity, &config).await?;
    Ok(Json(load_scoring_config(&state.db).await?))
}
