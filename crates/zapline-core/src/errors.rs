//! Error types shared across the platform
//!
//! Every fallible core operation returns [`CoreResult`]. The variants map
//! one-to-one onto the HTTP propagation policy in `zapline-api`; webhook
//! processing never surfaces them to the provider, it logs and acknowledges.

use thiserror::Error;

/// Core result type used throughout the application.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error kinds.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    /// Malformed request or payload shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// Token or signature failure.
    #[error("auth error: {0}")]
    Auth(String),

    /// Entity not found within the caller's tenant.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique-key violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Tenant subscription closed or expired.
    #[error("tenant closed: {0}")]
    TenantClosed(String),

    /// 4xx/5xx from the Cloud API or an external integration, with the
    /// upstream message preserved.
    #[error("provider error: {0}")]
    Provider(String),

    /// Network or timeout failure that a retry could clear.
    #[error("transient error: {0}")]
    Transient(String),

    /// Storage-layer failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn auth<S: Into<String>>(message: S) -> Self {
        CoreError::Auth(message.into())
    }

    pub fn not_found<S: Into<String>>(entity: S, id: S) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        CoreError::Conflict(message.into())
    }

    pub fn tenant_closed<S: Into<String>>(message: S) -> Self {
        CoreError::TenantClosed(message.into())
    }

    pub fn provider<S: Into<String>>(message: S) -> Self {
        CoreError::Provider(message.into())
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        CoreError::Transient(message.into())
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        CoreError::Storage(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        CoreError::Internal(message.into())
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_) | CoreError::Storage(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Validation(err.to_string())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Internal(err.to_string())
    }
}

impl From<zapline_whatsapp::WhatsAppError> for CoreError {
    fn from(err: zapline_whatsapp::WhatsAppError) -> Self {
        if err.is_transient() {
            CoreError::Transient(err.to_string())
        } else {
            CoreError::Provider(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(CoreError::transient("timeout").is_retryable());
        assert!(!CoreError::validation("bad shape").is_retryable());
        assert!(!CoreError::provider("131047").is_retryable());
    }

    #[test]
    fn provider_errors_keep_upstream_message() {
        let err: CoreError =
            zapline_whatsapp::WhatsAppError::ApiError("Re-engagement message".into()).into();
        assert!(err.to_string().contains("Re-engagement message"));
    }
}
