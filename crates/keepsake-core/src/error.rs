//! Error types module
//!
//! All errors in the upload and enrichment pipeline are unified under the
//! `AppError` enum. Validation and rate-limit failures surface synchronously
//! to the caller; processing failures are logged and swallowed by the
//! enrichment stage and never reach a client.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage quota exceeded: {used} of {limit} bytes already used")]
    QuotaExceeded { used: i64, limit: i64 },

    #[error("Upload limit of {limit} per {window} reached")]
    RateLimited { window: String, limit: i64 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// Machine-readable code for HTTP responses and log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        match err {
            SqlxError::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::Database(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_message_names_window_and_ceiling() {
        let err = AppError::RateLimited {
            window: "hour".to_string(),
            limit: 50,
        };
        assert_eq!(err.to_string(), "Upload limit of 50 per hour reached");
        assert_eq!(err.code(), "RATE_LIMITED");
    }

    #[test]
    fn quota_error_carries_usage() {
        let err = AppError::QuotaExceeded {
            used: 90,
            limit: 100,
        };
        assert!(err.to_string().contains("90"));
        assert_eq!(err.code(), "QUOTA_EXCEEDED");
    }
}
