//! Configuration endpoints.

use axum::{extract::State, Json};
use keepsake_core::constants::ADMIN_USER_ID;
use keepsake_core::models::ConfigEntry;
use keepsake_core::AppError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::HttpAppError;
use crate::handlers::CurrentUser;
use crate::state::AppState;

/// `GET /api/configs` — the caller's effective configuration: every
/// system key with their overrides substituted.
pub async fn get_configs(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<ConfigEntry>>, HttpAppError> {
    let entries = state.configs.effective_configs(user.0).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct ConfigUpsert {
    /// Scope of the entry: a user id, or null for the system default.
    pub user_id: Option<i64>,
    pub config_key: String,
    pub config_value: String,
}

/// Config writes are an administrative action for every scope. The
/// user-scoped keys are exactly the limits admission enforces against
/// that user (quota, file ceiling, extension allow-list), so a self-scope
/// write would let a caller raise their own limits.
fn ensure_admin(user_id: i64) -> Result<(), AppError> {
    if user_id != ADMIN_USER_ID {
        return Err(AppError::InvalidInput(
            "Only the admin may modify configuration".to_string(),
        ));
    }
    Ok(())
}

/// `PUT /api/configs` — upsert one entry in any scope. Admin only.
pub async fn put_config(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<ConfigUpsert>,
) -> Result<Json<Value>, HttpAppError> {
    ensure_admin(user.0)?;

    if payload.config_key.trim().is_empty() {
        return Err(AppError::InvalidInput("config_key is blank".to_string()).into());
    }

    state
        .configs
        .set_value(
            payload.user_id,
            payload.config_key.trim(),
            &payload.config_value,
        )
        .await?;

    Ok(Json(json!({ "updated": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_admin_passes_the_write_guard() {
        assert!(ensure_admin(ADMIN_USER_ID).is_ok());

        // A non-admin is rejected outright; in particular they cannot
        // write their own scope, which upload admission resolves first
        // when checking quotas and extension allow-lists.
        assert!(matches!(
            ensure_admin(2),
            Err(AppError::InvalidInput(_))
        ));
    }
}
