//! API error type and HTTP status mapping
//!
//! The mapping follows the platform's propagation policy: validation → 400,
//! auth → 401/403, not-found → 404, conflict → 400 with the domain message,
//! tenant-closed → 403, provider → 500 with the upstream message preserved,
//! everything else → 500 with a generic message outside development mode.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use zapline_core::CoreError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Subscription closed")]
    TenantClosed,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden | ApiError::TenantClosed => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Provider(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, message, code) = match self {
            ApiError::Validation(msg) => ("Bad Request", msg.clone(), "VALIDATION"),
            ApiError::Unauthorized => {
                ("Unauthorized", "Authentication required".to_string(), "UNAUTHORIZED")
            }
            ApiError::Forbidden => ("Forbidden", "Access denied".to_string(), "FORBIDDEN"),
            ApiError::NotFound(msg) => ("Not Found", msg.clone(), "NOT_FOUND"),
            ApiError::Conflict(msg) => ("Conflict", msg.clone(), "CONFLICT"),
            ApiError::TenantClosed => (
                "Forbidden",
                "Subscription is closed or expired".to_string(),
                "TENANT_CLOSED",
            ),
            // The upstream message is part of the contract; keep it.
            ApiError::Provider(msg) => ("Provider Error", msg.clone(), "PROVIDER"),
            ApiError::Internal(_) => (
                "Internal Server Error",
                "An unexpected error occurred".to_string(),
                "INTERNAL",
            ),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: error.to_string(),
            message,
            code: code.to_string(),
        })
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => ApiError::Validation(msg),
            CoreError::Auth(_) => ApiError::Unauthorized,
            CoreError::NotFound { entity, id } => ApiError::NotFound(format!("{entity} {id}")),
            CoreError::Conflict(msg) => ApiError::Conflict(msg),
            CoreError::TenantClosed(_) => ApiError::TenantClosed,
            CoreError::Provider(msg) => ApiError::Provider(msg),
            CoreError::Transient(msg) | CoreError::Storage(msg) | CoreError::Internal(msg) => {
                ApiError::Internal(msg)
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_policy() {
        assert_eq!(
            ApiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::TenantClosed.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Conflict("dup".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Provider("upstream".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn core_error_conversion_preserves_provider_message() {
        let api: ApiError = CoreError::provider("(#131047) Re-engagement message").into();
        match api {
            ApiError::Provider(msg) => assert!(msg.contains("131047")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
