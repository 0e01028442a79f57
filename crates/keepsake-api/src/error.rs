//! HTTP error response conversion.
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`; domain
//! errors convert via `?` and render as a JSON body with a stable
//! machine-readable code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keepsake_core::AppError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Newtype wrapper so `IntoResponse` can be implemented for the core
/// error type despite the orphan rules.
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match &err {
            AppError::InvalidInput(_) | AppError::QuotaExceeded { .. } => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Internal(_)
            | AppError::InternalWithSource { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %err, code = err.code(), "Request failed");
        } else {
            tracing::debug!(error = %err, code = err.code(), "Request rejected");
        }

        // Internal detail stays out of client-facing bodies.
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            err.to_string()
        };

        let body = ErrorResponse {
            error: message,
            code: err.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_error_classes() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (
                AppError::InvalidInput("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::PayloadTooLarge("big".into()),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                AppError::RateLimited {
                    window: "hour".into(),
                    limit: 50,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (AppError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (
                AppError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = HttpAppError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
