// Error taxonomy for the auth core and its HTTP shell
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::backend::BackendError;
use crate::types::Role;

/// Field name to message, as produced by form validation
pub type FieldErrors = BTreeMap<String, String>;

/// Failures of Auth Context operations. Each one is also recorded on the
/// context's state and announced as a notification.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("{message}")]
    Validation { message: String, field_errors: FieldErrors },

    #[error("Signing up as {0} is not permitted")]
    RoleNotPermitted(Role),

    #[error("Sign-in was superseded by a newer session change")]
    Interrupted,

    #[error("Auth context has been disposed")]
    Disposed,
}

impl AuthError {
    pub fn validation(field_errors: FieldErrors) -> Self {
        AuthError::Validation {
            message: "Please correct the highlighted fields".to_string(),
            field_errors,
        }
    }

    /// Message suitable for the error field and notifications
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Backend(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Error returned by the HTTP shell, rendered as
/// `{success: false, error, code, field_errors?}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String, field_errors: FieldErrors },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The backend failed in a way the client cannot fix
    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>, field_errors: FieldErrors) -> Self {
        ApiError::Validation {
            message: message.into(),
            field_errors,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.to_string(),
            "code": self.code(),
        });
        if let ApiError::Validation { field_errors, .. } = self {
            body["field_errors"] = json!(field_errors);
        }
        body
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidCredentials(msg) => ApiError::unauthorized(msg),
            BackendError::Rejected(msg) => ApiError::Conflict(msg),
            BackendError::NoSession => ApiError::unauthorized("Not signed in"),
            BackendError::ConfigMissing(what) => {
                tracing::error!("Backend misconfigured: {} missing", what);
                ApiError::ServiceUnavailable("Backend is not configured".to_string())
            }
            other => {
                // Don't expose transport details to clients
                tracing::error!("Backend error: {}", other);
                ApiError::BadGateway(other.user_message())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Backend(e) => e.into(),
            AuthError::Validation { message, field_errors } => ApiError::validation(message, field_errors),
            AuthError::RoleNotPermitted(_) => ApiError::Forbidden(err.to_string()),
            AuthError::Interrupted => ApiError::Conflict(err.to_string()),
            AuthError::Disposed => ApiError::ServiceUnavailable(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_map_to_unauthorized() {
        let err: ApiError = AuthError::from(BackendError::InvalidCredentials("Invalid login credentials".into())).into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_json()["error"], "Invalid login credentials");
    }

    #[test]
    fn validation_errors_carry_fields() {
        let mut fields = FieldErrors::new();
        fields.insert("email".to_string(), "Email is required".to_string());

        let err: ApiError = AuthError::validation(fields).into();
        let body = err.to_json();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["email"], "Email is required");
    }
}
