//! Team invitations

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use qcrm_common::db::Profile;
use qcrm_common::invitations::{self, Invitation};
use qcrm_common::{Identity, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Rep
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub token: String,
    pub full_name: Option<String>,
}

/// The new profile plus the token it authenticates with
#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    pub profile: Profile,
    pub api_token: String,
}

/// POST /api/invitations (admin only)
pub async fn create_invitation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<InviteRequest>,
) -> ApiResult<(StatusCode, Json<Invitation>)> {
    let invitation = invitations::create_invitation(
        &state.db,
        state.notifier.as_ref(),
        &identity,
        &request.email,
        request.role,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

/// GET /api/invitations (admin only)
pub async fn list_invitations(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<Invitation>>> {
    Ok(Json(invitations::list_invitations(&state.db, &identity).await?))
}

/// DELETE /api/invitations/:id (admin only)
pub async fn revoke_invitation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Invitation>> {
    Ok(Json(
        invitations::revoke_invitation(&state.db, &identity, id).await?,
    ))
}

/// POST /api/invitations/accept
///
/// Public: the invitation token is the credential.
pub async fn accept_invitation(
    State(state): State<AppState>,
    Json(request): Json<AcceptRequest>,
) -> ApiResult<(StatusCode, Json<AcceptResponse>)> {
    let profile =
        invitations::accept_invitation(&state.db, &request.token, request.full_name.as_deref())
            .await?;
    Ok((
        StatusCode::CREATED,
        Json(AcceptResponse {
            api_token: profile.api_token.clone(),
            profile,
        }),
    ))
}
