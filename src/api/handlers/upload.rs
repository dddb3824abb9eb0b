use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use tokio::task::JoinSet;

use crate::api::response::ApiError;
use crate::models::{BulkUploadResponse, UploadResponse, UploadResult};
use crate::upload::{self, IncomingFile, UploadError, UploadOptions, MAX_FILES_PER_REQUEST};
use crate::AppState;

const GENERIC_UPLOAD_ERROR: &str = "Failed to upload the photo. Please try again.";
const GENERIC_FILE_ERROR: &str = "Failed to process the image";

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_photo(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let folder_id = state
        .config
        .folder_id()
        .ok_or_else(ApiError::not_configured)?
        .to_string();

    let mut photo: Option<IncomingFile> = None;
    let mut guest_name: Option<String> = None;

    while let Some(field) = next_field(&mut multipart).await? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "photo" => photo = read_file(field).await?,
            "guestName" => guest_name = Some(read_text(field).await?),
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let photo = photo.ok_or_else(|| ApiError::bad_request("No photo was sent"))?;
    let options = UploadOptions {
        folder_id,
        guest_name: upload::sanitize_guest_name(guest_name.as_deref()),
        max_size: state.config.max_upload_size,
        unique_suffix: false,
    };

    let original_name = photo.original_name.clone();
    let descriptor = upload::process_file(Arc::clone(&state.object_store), &options, photo)
        .await
        .map_err(|e| {
            if e.is_client_error() {
                ApiError::bad_request(e.to_string())
            } else {
                tracing::error!(error = %e, original_name = %original_name, "Photo upload failed");
                ApiError::internal(GENERIC_UPLOAD_ERROR)
            }
        })?;

    tracing::info!(photo_id = %descriptor.id, guest = %options.guest_name, "Photo uploaded");

    Ok(Json(UploadResponse {
        photo: descriptor,
        success: true,
    }))
}

pub async fn upload_bulk(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<BulkUploadResponse>, ApiError> {
    let folder_id = state
        .config
        .folder_id()
        .ok_or_else(ApiError::not_configured)?
        .to_string();

    let mut files: Vec<IncomingFile> = Vec::new();
    let mut guest_name: Option<String> = None;

    while let Some(field) = next_field(&mut multipart).await? {
        let field_name = field.name().unwrap_or("").to_string();

        if field_name == "guestName" {
            guest_name = Some(read_text(field).await?);
        } else if field_name.starts_with("photo") {
            if field.file_name().is_none() {
                // Plain text values are not files
                continue;
            }
            if files.len() == MAX_FILES_PER_REQUEST {
                return Err(too_many_files());
            }
            if let Some(file) = read_file(field).await? {
                files.push(file);
            }
        }
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("No photos were sent"));
    }

    let options = Arc::new(UploadOptions {
        folder_id,
        guest_name: upload::sanitize_guest_name(guest_name.as_deref()),
        max_size: state.config.max_upload_size,
        unique_suffix: true,
    });

    // Every slot starts as a failure so a panicked task still gets reported.
    let mut results: Vec<UploadResult> = files
        .iter()
        .map(|f| UploadResult::failed(f.original_name.clone(), GENERIC_FILE_ERROR))
        .collect();

    let mut tasks = JoinSet::new();
    for (index, file) in files.into_iter().enumerate() {
        let store = Arc::clone(&state.object_store);
        let options = Arc::clone(&options);
        tasks.spawn(async move {
            let original_name = file.original_name.clone();
            let outcome = upload::process_file(store, &options, file).await;
            (index, file_result(original_name, outcome))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = result,
            Err(e) => tracing::error!(error = %e, "Bulk upload task failed"),
        }
    }

    let response = BulkUploadResponse::from_results(results);
    tracing::info!(
        guest = %options.guest_name,
        total = response.total,
        uploaded = response.uploaded,
        failed = response.failed,
        "Bulk upload finished"
    );

    Ok(Json(response))
}

// ============================================================================
// Helpers
// ============================================================================

fn too_many_files() -> ApiError {
    ApiError::bad_request(format!(
        "At most {MAX_FILES_PER_REQUEST} photos per request"
    ))
}

fn file_result(
    original_name: String,
    outcome: Result<crate::models::PhotoDescriptor, UploadError>,
) -> UploadResult {
    match outcome {
        Ok(photo) => UploadResult::succeeded(original_name, photo),
        Err(e) if e.is_client_error() => UploadResult::failed(original_name, e.to_string()),
        Err(e) => {
            tracing::error!(error = %e, original_name = %original_name, "Photo upload failed");
            UploadResult::failed(original_name, GENERIC_FILE_ERROR)
        }
    }
}

async fn next_field(multipart: &mut Multipart) -> Result<Option<Field<'_>>, ApiError> {
    multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))
}

/// Read a file part. Parts without a file name are plain values, and an
/// empty part with an empty file name is what browsers send for a file
/// input left blank; neither counts as a file.
async fn read_file(field: Field<'_>) -> Result<Option<IncomingFile>, ApiError> {
    let Some(file_name) = field.file_name().map(str::to_string) else {
        return Ok(None);
    };
    let content_type = field.content_type().map(str::to_string);

    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

    if data.is_empty() && file_name.is_empty() {
        return Ok(None);
    }

    Ok(Some(IncomingFile {
        content_type,
        data,
        original_name: if file_name.is_empty() {
            "photo".to_string()
        } else {
            file_name
        },
    }))
}

async fn read_text(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid form field: {e}")))
}
