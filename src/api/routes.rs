use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::upload::MAX_FILES_PER_REQUEST;
use crate::AppState;

/// Room for multipart boundaries and text fields on top of the file bytes.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Bodies slightly over the per-file limit must still be read so the
    // handlers can answer with a proper 400.
    let file_limit = state.config.max_upload_size as usize;
    let single_limit = file_limit + MULTIPART_OVERHEAD;
    let bulk_limit = file_limit * MAX_FILES_PER_REQUEST + MULTIPART_OVERHEAD;

    Router::new()
        // Uploads
        .route(
            "/api/upload",
            post(handlers::upload_photo).layer(DefaultBodyLimit::max(single_limit)),
        )
        .route(
            "/api/upload/bulk",
            post(handlers::upload_bulk).layer(DefaultBodyLimit::max(bulk_limit)),
        )
        // Gallery
        .route("/api/photos", get(handlers::list_photos))
        .route("/api/image/", get(handlers::missing_image_id))
        .route("/api/image/:id", get(handlers::get_image))
        // Internal
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
