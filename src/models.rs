use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::object_store::StoredObject;

/// Uploader shown for photos without a usable description.
pub const DEFAULT_GUEST_NAME: &str = "Guest";

/// Prefix of the description stored with every upload.
pub const DESCRIPTION_PREFIX: &str = "Uploaded by: ";

/// Width of the thumbnails referenced by listings and upload descriptors.
pub const THUMBNAIL_WIDTH: u32 = 400;

/// A photo as shown in the gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub created_at: String,
    pub full_size: String,
    pub id: String,
    pub name: String,
    pub thumbnail: String,
    pub uploaded_by: String,
}

/// Public record returned after a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoDescriptor {
    pub id: String,
    pub name: String,
    pub thumbnail: String,
    pub url: String,
}

/// Body of a successful single upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub photo: PhotoDescriptor,
    pub success: bool,
}

/// Outcome of one file in a bulk upload, keyed by the client's file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub original_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl UploadResult {
    pub fn succeeded(original_name: String, photo: PhotoDescriptor) -> Self {
        UploadResult {
            error: None,
            id: Some(photo.id),
            name: Some(photo.name),
            original_name,
            success: true,
            thumbnail: Some(photo.thumbnail),
            url: Some(photo.url),
        }
    }

    pub fn failed(original_name: String, error: impl Into<String>) -> Self {
        UploadResult {
            error: Some(error.into()),
            id: None,
            name: None,
            original_name,
            success: false,
            thumbnail: None,
            url: None,
        }
    }
}

/// Body of a bulk upload response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUploadResponse {
    pub failed: usize,
    pub results: Vec<UploadResult>,
    pub success: bool,
    pub total: usize,
    pub uploaded: usize,
}

impl BulkUploadResponse {
    pub fn from_results(results: Vec<UploadResult>) -> Self {
        let uploaded = results.iter().filter(|r| r.success).count();
        BulkUploadResponse {
            failed: results.len() - uploaded,
            success: true,
            total: results.len(),
            uploaded,
            results,
        }
    }
}

/// One page of the gallery listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoPage {
    pub has_more: bool,
    #[serde(default)]
    pub next_page_token: Option<String>,
    pub photos: Vec<Photo>,
}

pub fn image_url(id: &str) -> String {
    format!("/api/image/{id}")
}

pub fn thumbnail_url(id: &str) -> String {
    format!("/api/image/{id}?w={THUMBNAIL_WIDTH}")
}

pub fn upload_description(guest_name: &str) -> String {
    format!("{DESCRIPTION_PREFIX}{guest_name}")
}

/// Recover the uploader from a stored description.
pub fn uploader_from_description(description: Option<&str>) -> String {
    description
        .map(|d| d.replacen(DESCRIPTION_PREFIX, "", 1))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_GUEST_NAME.to_string())
}

impl From<&StoredObject> for Photo {
    fn from(object: &StoredObject) -> Self {
        Photo {
            created_at: object.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            full_size: image_url(&object.id),
            id: object.id.clone(),
            name: object.name.clone(),
            thumbnail: thumbnail_url(&object.id),
            uploaded_by: uploader_from_description(object.description.as_deref()),
        }
    }
}

impl From<&StoredObject> for PhotoDescriptor {
    fn from(object: &StoredObject) -> Self {
        PhotoDescriptor {
            id: object.id.clone(),
            name: object.name.clone(),
            thumbnail: thumbnail_url(&object.id),
            url: image_url(&object.id),
        }
    }
}
