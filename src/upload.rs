//! Upload pipeline shared by the single and bulk upload endpoints.
//!
//! validate -> transform -> name -> create -> grant public read

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::imaging::{self, TransformError};
use crate::models::{self, PhotoDescriptor, DEFAULT_GUEST_NAME};
use crate::object_store::{NewObject, ObjectStore, ObjectStoreError, StoredObject};

pub const ALLOWED_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/heic"];

pub const MAX_FILES_PER_REQUEST: usize = 10;

/// Extra letters kept in guest names besides ASCII alphanumerics.
const ACCENTED_LETTERS: &str = "áéíóúÁÉÍÓÚñÑ";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File type not allowed. Use JPG, PNG, WebP or HEIC")]
    DisallowedType(String),
    #[error("File too large (max {} MB)", .max_bytes / (1024 * 1024))]
    TooLarge { max_bytes: u64 },
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("Failed to store photo: {0}")]
    Store(#[source] ObjectStoreError),
    #[error("Failed to make photo {id} public: {source}")]
    Publish {
        id: String,
        #[source]
        source: ObjectStoreError,
    },
    #[error("Image processing task failed: {0}")]
    Task(String),
}

impl UploadError {
    /// Whether the caller sent something unacceptable, as opposed to a
    /// failure on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            UploadError::DisallowedType(_) | UploadError::TooLarge { .. }
        )
    }
}

/// A file received from a multipart upload.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub content_type: Option<String>,
    pub data: Bytes,
    pub original_name: String,
}

/// Per-request settings applied to every file of the request.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub folder_id: String,
    pub guest_name: String,
    pub max_size: u64,
    /// Append a random suffix to file names; concurrent uploads of a bulk
    /// request share a millisecond.
    pub unique_suffix: bool,
}

/// Content type of an upload: the declared one, or a guess from the file
/// name when the client sent none or a generic one.
pub fn effective_mime(content_type: Option<&str>, file_name: &str) -> String {
    content_type
        .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
        .map(|ct| ct.to_string())
        .or_else(|| mime_guess::from_path(file_name).first().map(|m| m.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Check type and size, returning the accepted content type.
pub fn validate(file: &IncomingFile, max_size: u64) -> Result<String, UploadError> {
    let mime = effective_mime(file.content_type.as_deref(), &file.original_name);
    if !ALLOWED_TYPES.contains(&mime.as_str()) {
        return Err(UploadError::DisallowedType(mime));
    }
    if file.data.len() as u64 > max_size {
        return Err(UploadError::TooLarge {
            max_bytes: max_size,
        });
    }
    Ok(mime)
}

/// Strip a guest name down to letters, digits and whitespace.
/// Blank results fall back to [`DEFAULT_GUEST_NAME`].
pub fn sanitize_guest_name(raw: Option<&str>) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || ACCENTED_LETTERS.contains(*c))
        .collect();

    match cleaned.trim() {
        "" => DEFAULT_GUEST_NAME.to_string(),
        name => name.to_string(),
    }
}

/// `{guest}_{unix millis}[_{suffix}].{extension}`
pub fn compose_file_name(
    guest_name: &str,
    uploaded_at: DateTime<Utc>,
    suffix: Option<&str>,
    extension: &str,
) -> String {
    let millis = uploaded_at.timestamp_millis();
    match suffix {
        Some(suffix) => format!("{guest_name}_{millis}_{suffix}.{extension}"),
        None => format!("{guest_name}_{millis}.{extension}"),
    }
}

fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}

/// Create the object, then grant public read on it.
///
/// Between the two calls the object exists but is not public. When the grant
/// fails the object is deleted again, best-effort; a failed delete leaves a
/// private orphan behind and is only logged.
pub async fn publish(
    store: &dyn ObjectStore,
    object: NewObject,
) -> Result<StoredObject, UploadError> {
    let stored = store.create(object).await.map_err(UploadError::Store)?;

    if let Err(source) = store.grant_public_read(&stored.id).await {
        if let Err(e) = store.delete(&stored.id).await {
            tracing::warn!(
                photo_id = %stored.id,
                error = %e,
                "Failed to remove photo after permission grant failed"
            );
        }
        return Err(UploadError::Publish {
            id: stored.id,
            source,
        });
    }

    Ok(stored)
}

/// Run one file through the whole pipeline.
pub async fn process_file(
    store: Arc<dyn ObjectStore>,
    options: &UploadOptions,
    file: IncomingFile,
) -> Result<PhotoDescriptor, UploadError> {
    let mime = validate(&file, options.max_size)?;

    let data = file.data;
    let prepared = tokio::task::spawn_blocking(move || imaging::prepare_upload(&data, &mime))
        .await
        .map_err(|e| UploadError::Task(e.to_string()))??;

    let suffix = options.unique_suffix.then(random_suffix);
    let name = compose_file_name(
        &options.guest_name,
        Utc::now(),
        suffix.as_deref(),
        &prepared.extension,
    );

    let stored = publish(
        store.as_ref(),
        NewObject {
            data: prepared.data,
            description: Some(models::upload_description(&options.guest_name)),
            folder_id: options.folder_id.clone(),
            mime_type: prepared.mime_type,
            name,
        },
    )
    .await?;

    tracing::debug!(
        photo_id = %stored.id,
        original_name = %file.original_name,
        "Uploaded photo"
    );

    Ok(PhotoDescriptor::from(&stored))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn file(name: &str, content_type: Option<&str>, len: usize) -> IncomingFile {
        IncomingFile {
            content_type: content_type.map(str::to_string),
            data: Bytes::from(vec![0u8; len]),
            original_name: name.to_string(),
        }
    }

    #[test]
    fn test_effective_mime_prefers_declared_type() {
        assert_eq!(effective_mime(Some("image/png"), "photo.jpg"), "image/png");
    }

    #[test]
    fn test_effective_mime_guesses_from_name() {
        assert_eq!(effective_mime(None, "IMG_0001.JPG"), "image/jpeg");
        assert_eq!(
            effective_mime(Some("application/octet-stream"), "a.webp"),
            "image/webp"
        );
        assert_eq!(effective_mime(None, "noext"), "application/octet-stream");
    }

    #[test]
    fn test_validate_accepts_allowed_types_at_limit() {
        for ct in ALLOWED_TYPES {
            let mime = validate(&file("x", Some(ct), 100), 100).unwrap();
            assert_eq!(mime, ct);
        }
    }

    #[test]
    fn test_validate_rejects_disallowed_type() {
        let err = validate(&file("doc.pdf", Some("application/pdf"), 10), 100).unwrap_err();
        assert!(matches!(err, UploadError::DisallowedType(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_validate_rejects_oversized_file() {
        let err = validate(&file("a.jpg", Some("image/jpeg"), 101), 100).unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { max_bytes: 100 }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_too_large_message_in_megabytes() {
        let err = UploadError::TooLarge {
            max_bytes: 10 * 1024 * 1024,
        };
        assert_eq!(err.to_string(), "File too large (max 10 MB)");
    }

    #[test]
    fn test_sanitize_guest_name() {
        assert_eq!(sanitize_guest_name(Some("  José & Ñoño!! ")), "José  Ñoño");
        assert_eq!(sanitize_guest_name(Some("Tía Ana <3")), "Tía Ana 3");
        assert_eq!(sanitize_guest_name(Some("../../etc")), "etc");
    }

    #[test]
    fn test_sanitize_guest_name_falls_back() {
        assert_eq!(sanitize_guest_name(None), DEFAULT_GUEST_NAME);
        assert_eq!(sanitize_guest_name(Some("   ")), DEFAULT_GUEST_NAME);
        assert_eq!(sanitize_guest_name(Some("🎉🎉")), DEFAULT_GUEST_NAME);
    }

    #[test]
    fn test_compose_file_name() {
        let at = Utc.timestamp_millis_opt(1_718_476_200_123).unwrap();
        assert_eq!(
            compose_file_name("Ana", at, None, "jpg"),
            "Ana_1718476200123.jpg"
        );
        assert_eq!(
            compose_file_name("Ana", at, Some("k3j9x2"), "heic"),
            "Ana_1718476200123_k3j9x2.heic"
        );
    }

    #[test]
    fn test_random_suffix_shape() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    /// Local store whose permission grants always fail.
    struct NoGrantStore(crate::object_store::LocalStore);

    #[async_trait::async_trait]
    impl ObjectStore for NoGrantStore {
        async fn list_images(
            &self,
            query: crate::object_store::ListQuery<'_>,
        ) -> Result<crate::object_store::ObjectPage, ObjectStoreError> {
            self.0.list_images(query).await
        }
        async fn get(&self, id: &str) -> Result<Bytes, ObjectStoreError> {
            self.0.get(id).await
        }
        async fn create(&self, object: NewObject) -> Result<StoredObject, ObjectStoreError> {
            self.0.create(object).await
        }
        async fn grant_public_read(&self, _id: &str) -> Result<(), ObjectStoreError> {
            Err(ObjectStoreError::Backend("permission denied".to_string()))
        }
        async fn delete(&self, id: &str) -> Result<(), ObjectStoreError> {
            self.0.delete(id).await
        }
    }

    fn new_object() -> NewObject {
        NewObject {
            data: Bytes::from_static(b"jpeg"),
            description: None,
            folder_id: "folder".to_string(),
            mime_type: "image/jpeg".to_string(),
            name: "Ana_1.jpg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_makes_object_public() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::object_store::LocalStore::new(dir.path()).unwrap();

        let stored = publish(&store, new_object()).await.unwrap();

        let page = store
            .list_images(crate::object_store::ListQuery {
                folder_id: "folder",
                page_size: 10,
                page_token: None,
            })
            .await
            .unwrap();
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].id, stored.id);
    }

    #[tokio::test]
    async fn test_publish_deletes_object_when_grant_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = NoGrantStore(crate::object_store::LocalStore::new(dir.path()).unwrap());

        let err = publish(&store, new_object()).await.unwrap_err();
        let UploadError::Publish { id, .. } = &err else {
            panic!("expected a publish error, got {err:?}");
        };
        assert!(!err.is_client_error());
        assert!(matches!(
            store.get(id).await,
            Err(ObjectStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_process_file_resizes_and_names_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> =
            Arc::new(crate::object_store::LocalStore::new(dir.path()).unwrap());
        let options = UploadOptions {
            folder_id: "folder".to_string(),
            guest_name: "Ana".to_string(),
            max_size: 10 * 1024 * 1024,
            unique_suffix: true,
        };
        let upload = IncomingFile {
            content_type: Some("image/jpeg".to_string()),
            data: Bytes::from(crate::testutil::jpeg_bytes(2500, 500)),
            original_name: "IMG_0001.jpg".to_string(),
        };

        let photo = process_file(store.clone(), &options, upload).await.unwrap();
        assert!(photo.name.starts_with("Ana_"));
        assert!(photo.name.ends_with(".jpg"));

        let stored = image::load_from_memory(&store.get(&photo.id).await.unwrap()).unwrap();
        assert_eq!((stored.width(), stored.height()), (2000, 400));
    }

    #[tokio::test]
    async fn test_process_file_rejects_before_storing() {
        let dir = tempfile::tempdir().unwrap();
        let local = crate::object_store::LocalStore::new(dir.path()).unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(local);
        let options = UploadOptions {
            folder_id: "folder".to_string(),
            guest_name: "Ana".to_string(),
            max_size: 10,
            unique_suffix: false,
        };
        let upload = IncomingFile {
            content_type: Some("image/jpeg".to_string()),
            data: Bytes::from(vec![0u8; 11]),
            original_name: "big.jpg".to_string(),
        };

        let err = process_file(store, &options, upload).await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
