//! Multipart upload endpoint.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keepsake_core::AppError;
use keepsake_services::{UploadOutcome, UploadedFile};
use serde_json::json;
use std::sync::Arc;

use crate::error::HttpAppError;
use crate::handlers::CurrentUser;
use crate::state::AppState;

/// `POST /api/file/upload` — multipart form with a `file` part, a
/// `category` part, and an optional `album_id` part.
#[tracing::instrument(skip(state, multipart), fields(user_id = user.0, operation = "upload_file"))]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<Response, HttpAppError> {
    let mut file: Option<UploadedFile> = None;
    let mut album_id: Option<i64> = None;
    let mut category: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        let part = field.name().unwrap_or_default().to_string();
        match part.as_str() {
            "file" => {
                let name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read file: {}", e)))?;
                file = Some(UploadedFile {
                    name,
                    data: data.to_vec(),
                });
            }
            "album_id" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read field: {}", e)))?;
                let raw = raw.trim().to_string();
                if !raw.is_empty() {
                    album_id = Some(raw.parse::<i64>().map_err(|_| {
                        AppError::InvalidInput(format!("album_id is not a number: {}", raw))
                    })?);
                }
            }
            "category" => {
                category = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| {
                            AppError::InvalidInput(format!("Failed to read field: {}", e))
                        })?
                        .trim()
                        .to_string(),
                );
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| AppError::InvalidInput("Missing file part".to_string()))?;
    let category =
        category.ok_or_else(|| AppError::InvalidInput("Missing category part".to_string()))?;

    let outcome = state
        .upload_service
        .handle_upload(user.0, file, album_id, &category)
        .await?;

    Ok(match outcome {
        UploadOutcome::Asset(asset) => (StatusCode::CREATED, Json(asset)).into_response(),
        UploadOutcome::Url(url) => {
            (StatusCode::CREATED, Json(json!({ "url": url }))).into_response()
        }
    })
}
