//! API error types and conversions

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mbridge_core::StackError;
use mbridge_correlate::{GroupSettingsError, ShutdownError};
use serde::Serialize;

/// API error type that converts to HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 400 Bad Request
    #[error("{0}")]
    BadRequest(String),
    /// 404 Not Found
    #[error("{0}")]
    NotFound(String),
    /// 409 Conflict
    #[error("{0}")]
    Conflict(String),
    /// 502 Bad Gateway (stack rejected or failed the command)
    #[error("{0}")]
    BadGateway(String),
    /// 503 Service Unavailable (stack gate busy)
    #[error("{0}")]
    ServiceUnavailable(String),
    /// 500 Internal Server Error
    #[error("{0}")]
    Internal(String),
}

/// Standard error response format
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "bad_gateway"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.parts();
        let message = self.to_string();

        // Log errors at appropriate levels
        if status.is_server_error() {
            tracing::error!(error = error_type, %message, "API error");
        } else if status.is_client_error() {
            tracing::debug!(error = error_type, %message, "API client error");
        }

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<StackError> for ApiError {
    fn from(err: StackError) -> Self {
        match err {
            StackError::InvalidArgument(msg) => ApiError::BadRequest(msg),
            err @ (StackError::UnknownNode(_)
            | StackError::SubscriptionNotFound { .. }
            | StackError::GroupNotFound(_)) => ApiError::NotFound(err.to_string()),
            err @ (StackError::NotSupported(_)
            | StackError::Transport(_)
            | StackError::Closed) => ApiError::BadGateway(err.to_string()),
        }
    }
}

impl From<ShutdownError> for ApiError {
    fn from(err: ShutdownError) -> Self {
        match err {
            err @ ShutdownError::Busy { .. } => ApiError::ServiceUnavailable(err.to_string()),
            err @ ShutdownError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ShutdownError::Stack(err) => err.into(),
        }
    }
}

impl From<GroupSettingsError> for ApiError {
    fn from(err: GroupSettingsError) -> Self {
        match err {
            err @ GroupSettingsError::Busy { .. } => ApiError::ServiceUnavailable(err.to_string()),
            GroupSettingsError::Stack(err) => err.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_error_status_mapping() {
        let cases = [
            (StackError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (StackError::UnknownNode(1), StatusCode::NOT_FOUND),
            (StackError::GroupNotFound(0x0101), StatusCode::NOT_FOUND),
            (StackError::NotSupported("x".into()), StatusCode::BAD_GATEWAY),
            (StackError::Transport("x".into()), StatusCode::BAD_GATEWAY),
            (StackError::Closed, StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).parts().0, expected);
        }
    }

    #[test]
    fn test_shutdown_busy_is_unavailable() {
        let err = ApiError::from(ShutdownError::Busy {
            waited: std::time::Duration::from_millis(10),
        });
        assert_eq!(err.parts(), (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"));
    }
}
