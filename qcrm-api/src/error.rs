//! HTTP error mapping
//!
//! Every failure leaves the server as `{"error": {"code", "message"}}`;
//! validation failures add the full `violations` list.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use qcrm_common::Error;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unknown bearer token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed request outside payload validation (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unknown route parameter such as an entity kind (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// qcrm-common error
    #[error(transparent)]
    Common(#[from] Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Common(err) => match err {
                Error::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED"),
                Error::StorageUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")
                }
                Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                Error::ExternalService(_) => (StatusCode::BAD_GATEWAY, "EXTERNAL_SERVICE"),
                Error::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(code, "Request failed: {}", self);
        }

        let body = match &self {
            ApiError::Common(Error::Validation(violations)) => json!({
                "error": {
                    "code": code,
                    "message": self.to_string(),
                    "violations": violations,
                }
            }),
            _ => json!({
                "error": {
                    "code": code,
                    "message": self.to_string(),
                }
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: Error) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_common_errors_map_to_status() {
        assert_eq!(
            status_of(Error::invalid("name", "is required")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(Error::StorageUnavailable("locked".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(Error::NotFound("deal".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(Error::ExternalService("down".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status_of(Error::Forbidden("no".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(Error::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unauthorized_is_401() {
        let response = ApiError::Unauthorized("missing token".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
