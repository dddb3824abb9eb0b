use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery};
use crate::imaging;
use crate::object_store::ObjectStoreError;
use crate::AppState;

/// Object ids never change content, so responses may be cached forever.
const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Deserialize)]
pub struct ImageParams {
    /// Target width, read leniently; anything unusable serves the stored
    /// bytes as they are.
    #[serde(default)]
    pub w: Option<String>,
}

impl ImageParams {
    /// Leading decimal digits of `w` (so `400px` is 400). Missing, signed,
    /// non-numeric or overflowing values give 0.
    pub fn width(&self) -> u32 {
        let Some(raw) = self.w.as_deref() else {
            return 0;
        };
        let raw = raw.trim_start();
        let digits = raw
            .find(|c: char| !c.is_ascii_digit())
            .map_or(raw, |end| &raw[..end]);
        digits.parse().unwrap_or(0)
    }
}

/// Serve a stored photo, optionally scaled down.
/// Route: GET /api/image/:id
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppQuery(params): AppQuery<ImageParams>,
) -> Result<Response, ApiError> {
    if id.trim().is_empty() {
        return Err(missing_id());
    }

    let original = state.object_store.get(&id).await.map_err(|e| match e {
        ObjectStoreError::NotFound(_) => ApiError::not_found("Image not found"),
        _ => {
            tracing::error!(photo_id = %id, error = %e, "Failed to fetch image");
            ApiError::internal("Failed to load the image")
        }
    })?;

    let width = params.width();
    let data = original.clone();
    let scaled = tokio::task::spawn_blocking(move || imaging::scale_for_delivery(&data, width))
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r.map_err(|e| e.to_string()))
        .map_err(|e| {
            tracing::error!(photo_id = %id, error = %e, "Failed to scale image");
            ApiError::internal("Failed to load the image")
        })?;

    let (content_type, body) = match scaled {
        Some(bytes) => (imaging::JPEG_MIME, bytes),
        None => (imaging::sniff_mime(&original), original),
    };

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE_CACHE));

    Ok(response)
}

/// Route: GET /api/image/ (no id)
pub async fn missing_image_id() -> ApiError {
    missing_id()
}

fn missing_id() -> ApiError {
    ApiError::bad_request("Image id is required")
}
