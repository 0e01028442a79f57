pub mod configs;
pub mod recycle;
pub mod upload;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use keepsake_core::AppError;

use crate::error::HttpAppError;

/// Caller identity from the `X-User-Id` header. Session handling proper
/// lives in front of this service; here the header is trusted as-is.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub i64);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| {
                AppError::InvalidInput("Missing or invalid X-User-Id header".to_string())
            })?;

        Ok(CurrentUser(user_id))
    }
}
