//! Bearer-token authentication
//!
//! The token is looked up in the profiles table and the resulting
//! [`Identity`] is attached to the request for handlers to extract.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use qcrm_common::db::{profiles, Profile};
use qcrm_common::{Error, Identity};
use tracing::debug;

use crate::{ApiError, ApiResult, AppState};

/// Resolve `Authorization: Bearer <token>` to an [`Identity`]
///
/// Applied to protected routes only; responds 401 when the header is
/// missing, malformed or carries an unknown token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?
        .to_string();

    let profile = profiles::find_by_token(&state.db, &token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("unknown token".to_string()))?;

    debug!(user = %profile.guid, role = %profile.role, "Authenticated request");
    request.extensions_mut().insert(profile.identity());
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// GET /api/me
pub async fn get_me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Profile>> {
    let profile = profiles::find_by_id(&state.db, identity.user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("profile {}", identity.user_id)))?;
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc123")), Some("abc123"));
        assert_eq!(bearer_token(&headers("bearer  abc123 ")), Some("abc123"));
        assert_eq!(bearer_token(&headers("Basic abc123")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
