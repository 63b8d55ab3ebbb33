//! Unified error handling for the API.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error with an HTTP status.
///
/// Renders as `{"success": false, "error": {"code", "message"}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status,
        }
    }

    /// Bad request (400).
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message, StatusCode::BAD_REQUEST)
    }

    /// Unauthorized (401).
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message, StatusCode::UNAUTHORIZED)
    }

    /// Forbidden (403).
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message, StatusCode::FORBIDDEN)
    }

    /// Not found (404).
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            "NOT_FOUND",
            format!("{} not found", resource.into()),
            StatusCode::NOT_FOUND,
        )
    }

    /// Conflict (409).
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message, StatusCode::CONFLICT)
    }

    /// Validation error (422).
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            "VALIDATION_ERROR",
            message,
            StatusCode::UNPROCESSABLE_ENTITY,
        )
    }

    /// Internal server error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message, StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status, axum::Json(body)).into_response()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorResponse {}

impl From<neothink_baas::Error> for ErrorResponse {
    fn from(e: neothink_baas::Error) -> Self {
        use neothink_baas::Error;
        match e {
            Error::NotFound(what) => Self::not_found(what),
            Error::Unauthorized(message) => Self::unauthorized(message),
            Error::Rejected(message) => Self::bad_request(message),
            Error::Status { status: 409, .. } => Self::conflict("Resource already exists"),
            other => {
                tracing::error!(category = "baas", error = %other, "BaaS call failed");
                Self::internal("Backend request failed")
            }
        }
    }
}

impl From<anyhow::Error> for ErrorResponse {
    fn from(e: anyhow::Error) -> Self {
        Self::internal(e.to_string())
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ErrorResponse>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::not_found("feedback");
        assert_eq!(err.code, "NOT_FOUND");
        assert_eq!(err.message, "feedback not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_from_baas_error() {
        use neothink_baas::Error;
        assert_eq!(
            ErrorResponse::from(Error::Unauthorized("bad token".into())).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorResponse::from(Error::Rejected("weak password".into())).status,
            StatusCode::BAD_REQUEST
        );
        let internal = ErrorResponse::from(Error::Status {
            status: 500,
            body: "secret details".into(),
        });
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!internal.message.contains("secret"));
    }
}
