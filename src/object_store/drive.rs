use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, Url};
use serde::Deserialize;

use super::{ListQuery, NewObject, ObjectPage, ObjectStore, ObjectStoreError, StoredObject};
use crate::config::DriveCredentials;

/// Access tokens are refreshed this long before Google says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const FILE_FIELDS: &str = "id, name, mimeType, description, createdTime";

/// Base URLs of the Google endpoints the store talks to.
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub api: String,
    pub token: String,
    pub upload: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            api: "https://www.googleapis.com/drive/v3".to_string(),
            token: "https://oauth2.googleapis.com/token".to_string(),
            upload: "https://www.googleapis.com/upload/drive/v3".to_string(),
        }
    }
}

/// Google Drive v3 backend acting as the drive owner through an OAuth
/// refresh token.
pub struct DriveStore {
    access_token: tokio::sync::RwLock<Option<AccessToken>>,
    client: Client,
    client_id: String,
    client_secret: String,
    endpoints: DriveEndpoints,
    refresh_token: String,
}

struct AccessToken {
    expires_at: Instant,
    value: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    created_time: DateTime<Utc>,
    #[serde(default)]
    description: Option<String>,
    id: String,
    #[serde(default)]
    mime_type: String,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl From<DriveFile> for StoredObject {
    fn from(file: DriveFile) -> Self {
        StoredObject {
            created_at: file.created_time,
            description: file.description,
            id: file.id,
            mime_type: file.mime_type,
            name: file.name,
        }
    }
}

impl DriveStore {
    /// Build the store and mint a first access token so bad credentials
    /// fail at startup rather than on the first guest upload.
    pub async fn new(
        credentials: &DriveCredentials,
        endpoints: DriveEndpoints,
    ) -> Result<Self, anyhow::Error> {
        let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            credentials.client_id.clone(),
            credentials.client_secret.clone(),
            credentials.refresh_token.clone(),
        ) else {
            anyhow::bail!("Google Drive credentials are incomplete");
        };

        let store = Self {
            access_token: tokio::sync::RwLock::new(None),
            client: Client::builder().build()?,
            client_id,
            client_secret,
            endpoints,
            refresh_token,
        };

        store.refresh_access_token().await?;
        Ok(store)
    }

    async fn access_token(&self) -> Result<String, ObjectStoreError> {
        if let Some(token) = self.access_token.read().await.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }
        self.refresh_access_token().await
    }

    async fn refresh_access_token(&self) -> Result<String, ObjectStoreError> {
        let resp = self
            .client
            .post(&self.endpoints.token)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(backend)?;

        let token: TokenResponse = ensure_success(resp, "token refresh")
            .await?
            .json()
            .await
            .map_err(backend)?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        let expires_at = Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN);

        let mut lock = self.access_token.write().await;
        *lock = Some(AccessToken {
            expires_at,
            value: token.access_token.clone(),
        });
        tracing::debug!(expires_in = lifetime.as_secs(), "Refreshed Drive access token");

        Ok(token.access_token)
    }

    /// `{api}/files/{id}/{rest..}` with the id percent-encoded as a path segment.
    fn file_url(&self, id: &str, rest: &[&str]) -> Result<Url, ObjectStoreError> {
        let mut url = Url::parse(&self.endpoints.api)
            .map_err(|e| ObjectStoreError::Backend(format!("Invalid Drive API URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ObjectStoreError::Backend("Drive API URL cannot be a base".into()))?
            .pop_if_empty()
            .push("files")
            .push(id)
            .extend(rest);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for DriveStore {
    async fn list_images(&self, query: ListQuery<'_>) -> Result<ObjectPage, ObjectStoreError> {
        let token = self.access_token().await?;

        let q = format!(
            "'{}' in parents and mimeType contains 'image/' and trashed = false",
            escape_query_literal(query.folder_id)
        );
        let fields = format!("nextPageToken, files({FILE_FIELDS})");
        let page_size = query.page_size.to_string();

        let mut params = vec![
            ("q", q.as_str()),
            ("fields", fields.as_str()),
            ("pageSize", page_size.as_str()),
            ("orderBy", "createdTime desc"),
        ];
        if let Some(page_token) = query.page_token {
            params.push(("pageToken", page_token));
        }

        let resp = self
            .client
            .get(format!("{}/files", self.endpoints.api))
            .bearer_auth(&token)
            .query(&params)
            .send()
            .await
            .map_err(backend)?;

        let list: FileList = ensure_success(resp, "list")
            .await?
            .json()
            .await
            .map_err(backend)?;

        Ok(ObjectPage {
            objects: list.files.into_iter().map(StoredObject::from).collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get(&self, id: &str) -> Result<Bytes, ObjectStoreError> {
        let token = self.access_token().await?;

        let mut url = self.file_url(id, &[])?;
        url.query_pairs_mut().append_pair("alt", "media");

        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(backend)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(id.to_string()));
        }

        ensure_success(resp, "download")
            .await?
            .bytes()
            .await
            .map_err(backend)
    }

    async fn create(&self, object: NewObject) -> Result<StoredObject, ObjectStoreError> {
        let token = self.access_token().await?;

        let metadata = serde_json::json!({
            "name": object.name,
            "parents": [object.folder_id],
            "description": object.description,
            "mimeType": object.mime_type,
        });
        let boundary = format!("photo-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &metadata, &object.mime_type, &object.data)?;

        let resp = self
            .client
            .post(format!("{}/files", self.endpoints.upload))
            .bearer_auth(&token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(backend)?;

        let file: DriveFile = ensure_success(resp, "upload")
            .await?
            .json()
            .await
            .map_err(backend)?;

        Ok(file.into())
    }

    async fn grant_public_read(&self, id: &str) -> Result<(), ObjectStoreError> {
        let token = self.access_token().await?;

        let resp = self
            .client
            .post(self.file_url(id, &["permissions"])?)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await
            .map_err(backend)?;

        ensure_success(resp, "permission grant").await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), ObjectStoreError> {
        let token = self.access_token().await?;

        let resp = self
            .client
            .delete(self.file_url(id, &[])?)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(backend)?;

        // 404 is fine -- object already gone
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(resp, "delete").await?;
        Ok(())
    }
}

fn backend(e: reqwest::Error) -> ObjectStoreError {
    ObjectStoreError::Backend(e.to_string())
}

async fn ensure_success(resp: Response, action: &str) -> Result<Response, ObjectStoreError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(ObjectStoreError::Backend(format!(
        "Drive {action} failed ({status}): {body}"
    )))
}

/// Escape a value for use inside a single-quoted Drive query literal.
fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Metadata and media in one `multipart/related` body, as Drive's
/// multipart upload expects.
fn multipart_related(
    boundary: &str,
    metadata: &serde_json::Value,
    media_type: &str,
    data: &[u8],
) -> Result<Bytes, ObjectStoreError> {
    let metadata = serde_json::to_vec(metadata)?;

    let mut body = BytesMut::with_capacity(data.len() + metadata.len() + 256);
    body.put_slice(format!("--{boundary}\r\n").as_bytes());
    body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.put_slice(&metadata);
    body.put_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.put_slice(format!("Content-Type: {media_type}\r\n\r\n").as_bytes());
    body.put_slice(data);
    body.put_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Ok(body.freeze())
}
