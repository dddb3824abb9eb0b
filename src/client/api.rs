use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use thiserror::Error;

use crate::models::{BulkUploadResponse, PhotoPage};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(String),
    #[error("Server answered {status}: {message}")]
    Server { status: u16, message: String },
}

/// A file queued for a bulk upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub data: Bytes,
    pub file_name: String,
    pub mime_type: String,
}

/// HTTP client for the gallery API.
#[derive(Clone)]
pub struct ApiClient {
    base: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            base: Url::parse(base_url).map_err(|e| ClientError::Url(format!("{base_url}: {e}")))?,
            client: Client::builder().build()?,
        })
    }

    /// Resolve a server path such as `/api/image/abc?w=400`.
    pub fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|e| ClientError::Url(format!("{path}: {e}")))
    }

    pub async fn list_photos(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<PhotoPage, ClientError> {
        let mut url = self.url("/api/photos")?;
        url.query_pairs_mut()
            .append_pair("pageSize", &page_size.to_string());
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        let resp = self.client.get(url).send().await?;
        Ok(ensure_success(resp).await?.json().await?)
    }

    /// Submit up to ten files in one request, as `photo0..photoN`.
    pub async fn upload_bulk(
        &self,
        guest_name: &str,
        files: &[UploadFile],
    ) -> Result<BulkUploadResponse, ClientError> {
        let mut form = Form::new().text("guestName", guest_name.to_string());
        for (index, file) in files.iter().enumerate() {
            let part = Part::bytes(file.data.to_vec())
                .file_name(file.file_name.clone())
                .mime_str(&file.mime_type)?;
            form = form.part(format!("photo{index}"), part);
        }

        let resp = self
            .client
            .post(self.url("/api/upload/bulk")?)
            .multipart(form)
            .send()
            .await?;
        Ok(ensure_success(resp).await?.json().await?)
    }

    /// Fetch image bytes from a path returned by the API.
    pub async fn fetch(&self, path: &str) -> Result<Bytes, ClientError> {
        let resp = self.client.get(self.url(path)?).send().await?;
        Ok(ensure_success(resp).await?.bytes().await?)
    }
}

async fn ensure_success(resp: Response) -> Result<Response, ClientError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp
        .json::<crate::api::response::ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_default();
    Err(ClientError::Server { status, message })
}
