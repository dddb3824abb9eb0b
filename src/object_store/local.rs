use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{ListQuery, NewObject, ObjectPage, ObjectStore, ObjectStoreError, StoredObject};

/// Local filesystem object store for development and testing.
///
/// Each object is two files: `<id>` holds the bytes and `<id>.json` its
/// metadata. Listings only include objects that have been made public.
pub struct LocalStore {
    base_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct LocalMetadata {
    created_at: DateTime<Utc>,
    #[serde(default)]
    description: Option<String>,
    folder_id: String,
    mime_type: String,
    name: String,
    #[serde(default)]
    public: bool,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Ids are generated here, so anything outside their alphabet cannot
    /// name an object.
    fn object_path(&self, id: &str) -> Result<PathBuf, ObjectStoreError> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ObjectStoreError::NotFound(id.to_string()));
        }
        Ok(self.base_path.join(id))
    }

    fn metadata_path(&self, id: &str) -> Result<PathBuf, ObjectStoreError> {
        Ok(self.object_path(id)?.with_extension("json"))
    }

    async fn read_metadata(&self, id: &str) -> Result<LocalMetadata, ObjectStoreError> {
        let path = self.metadata_path(id)?;
        if !path.exists() {
            return Err(ObjectStoreError::NotFound(id.to_string()));
        }
        let raw = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn write_metadata(&self, id: &str, meta: &LocalMetadata) -> Result<(), ObjectStoreError> {
        let path = self.metadata_path(id)?;
        // Readers only ever see a complete sidecar.
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, serde_json::to_vec_pretty(meta)?).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn list_images(&self, query: ListQuery<'_>) -> Result<ObjectPage, ObjectStoreError> {
        let offset = match query.page_token {
            Some(token) => decode_page_token(token)?,
            None => 0,
        };

        let mut objects = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Foreign or unreadable sidecars must not take the listing down.
            let meta = match self.read_metadata(id).await {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable metadata"
                    );
                    continue;
                }
            };
            if meta.folder_id != query.folder_id
                || !meta.public
                || !meta.mime_type.starts_with("image/")
            {
                continue;
            }
            objects.push(StoredObject {
                created_at: meta.created_at,
                description: meta.description,
                id: id.to_string(),
                mime_type: meta.mime_type,
                name: meta.name,
            });
        }

        objects.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = objects.len();
        let page_size = query.page_size.max(1) as usize;
        let objects: Vec<StoredObject> =
            objects.into_iter().skip(offset).take(page_size).collect();
        let next = offset + objects.len();

        Ok(ObjectPage {
            next_page_token: (next < total).then(|| encode_page_token(next)),
            objects,
        })
    }

    async fn get(&self, id: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self.object_path(id)?;
        if !path.exists() {
            return Err(ObjectStoreError::NotFound(id.to_string()));
        }
        let data = tokio::fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn create(&self, object: NewObject) -> Result<StoredObject, ObjectStoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let meta = LocalMetadata {
            created_at: Utc::now(),
            description: object.description,
            folder_id: object.folder_id,
            mime_type: object.mime_type,
            name: object.name,
            public: false,
        };

        tokio::fs::write(self.object_path(&id)?, &object.data).await?;
        self.write_metadata(&id, &meta).await?;

        Ok(StoredObject {
            created_at: meta.created_at,
            description: meta.description,
            id,
            mime_type: meta.mime_type,
            name: meta.name,
        })
    }

    async fn grant_public_read(&self, id: &str) -> Result<(), ObjectStoreError> {
        let mut meta = self.read_metadata(id).await?;
        meta.public = true;
        self.write_metadata(id, &meta).await
    }

    async fn delete(&self, id: &str) -> Result<(), ObjectStoreError> {
        for path in [self.object_path(id)?, self.metadata_path(id)?] {
            if path.exists() {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

fn encode_page_token(offset: usize) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(format!("offset:{offset}"))
}

fn decode_page_token(token: &str) -> Result<usize, ObjectStoreError> {
    let invalid = || ObjectStoreError::Backend(format!("Invalid page token: {token}"));
    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| invalid())?;
    String::from_utf8(raw)
        .ok()
        .and_then(|s| s.strip_prefix("offset:").and_then(|n| n.parse().ok()))
        .ok_or_else(invalid)
}
