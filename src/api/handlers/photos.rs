use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery};
use crate::models::{Photo, PhotoPage};
use crate::object_store::ListQuery;
use crate::AppState;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 50;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPhotosParams {
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_photos(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListPhotosParams>,
) -> Result<Json<PhotoPage>, ApiError> {
    let folder_id = state.config.folder_id().ok_or_else(ApiError::not_configured)?;

    if params.page_size == 0 {
        return Err(ApiError::bad_request("pageSize must be greater than 0"));
    }

    let query = ListQuery {
        folder_id,
        page_size: params.page_size.min(MAX_PAGE_SIZE),
        page_token: params.page_token.as_deref().filter(|t| !t.is_empty()),
    };

    let page = state.object_store.list_images(query).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to list photos");
        ApiError::internal("Failed to load photos")
    })?;

    let photos: Vec<Photo> = page.objects.iter().map(Photo::from).collect();

    Ok(Json(PhotoPage {
        has_more: page.next_page_token.is_some(),
        next_page_token: page.next_page_token,
        photos,
    }))
}
