//! Route configuration and setup

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use keepsake_core::constants::DEFAULT_MAX_VIDEO_BYTES;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build the application router: API endpoints, the public file mount
/// and the shared middleware stack.
pub fn setup_routes(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Per-file limits are enforced in the upload service against the
    // resolved configuration; this outer cap only bounds request bodies
    // before multipart parsing (largest default ceiling plus headroom).
    let body_limit = RequestBodyLimitLayer::new((DEFAULT_MAX_VIDEO_BYTES as usize) * 2);

    Router::new()
        .route("/api/file/upload", post(handlers::upload::upload_file))
        .route("/api/assets/recycle", get(handlers::recycle::list_recycle))
        .route(
            "/api/assets/recycle/delete",
            post(handlers::recycle::delete_assets),
        )
        .route(
            "/api/assets/recycle/restore",
            post(handlers::recycle::restore_assets),
        )
        .route(
            "/api/configs",
            get(handlers::configs::get_configs).put(handlers::configs::put_config),
        )
        .nest_service("/uploads", ServeDir::new(&state.local_root))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(body_limit)
        .with_state(state)
}
