mod drive;
mod local;

pub use drive::{DriveEndpoints, DriveStore};
pub use local::LocalStore;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// An object to be created in a folder of the store.
#[derive(Debug, Clone)]
pub struct NewObject {
    pub data: Bytes,
    /// Free-text metadata kept alongside the object
    pub description: Option<String>,
    pub folder_id: String,
    pub mime_type: String,
    pub name: String,
}

/// Provider-side record of a stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
    pub id: String,
    pub mime_type: String,
    pub name: String,
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<StoredObject>,
    /// Opaque continuation token; `None` when the listing is exhausted.
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ListQuery<'a> {
    pub folder_id: &'a str,
    pub page_size: u32,
    pub page_token: Option<&'a str>,
}

/// Abstraction over the remote file storage holding the photos.
///
/// Writes are two separate calls: `create` stores the object and
/// `grant_public_read` makes it readable by anyone. Callers own the window
/// between the two.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List non-trashed image objects in a folder, newest first.
    async fn list_images(&self, query: ListQuery<'_>) -> Result<ObjectPage, ObjectStoreError>;
    async fn get(&self, id: &str) -> Result<Bytes, ObjectStoreError>;
    async fn create(&self, object: NewObject) -> Result<StoredObject, ObjectStoreError>;
    async fn grant_public_read(&self, id: &str) -> Result<(), ObjectStoreError>;
    async fn delete(&self, id: &str) -> Result<(), ObjectStoreError>;
}
