//! Recycle-bin endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use keepsake_core::models::Asset;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::HttpAppError;
use crate::handlers::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct IdsPayload {
    pub ids: Vec<Uuid>,
}

/// `GET /api/assets/recycle` — the caller's recycled assets, newest
/// deletion first.
pub async fn list_recycle(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Asset>>, HttpAppError> {
    let assets = state
        .recycle_service
        .list_deleted(user.0, query.page, query.per_page)
        .await?;
    Ok(Json(assets))
}

/// `POST /api/assets/recycle/delete` — move assets into the recycle bin.
pub async fn delete_assets(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<IdsPayload>,
) -> Result<Json<Value>, HttpAppError> {
    let moved = state.recycle_service.soft_delete(user.0, &payload.ids).await?;
    Ok(Json(json!({ "moved": moved })))
}

/// `POST /api/assets/recycle/restore` — bring assets back.
pub async fn restore_assets(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<IdsPayload>,
) -> Result<Json<Value>, HttpAppError> {
    let restored = state.recycle_service.restore(user.0, &payload.ids).await?;
    Ok(Json(json!({ "restored": restored })))
}
