//! Upload queue: intake checks, batching and per-file status.

use std::path::Path;

use bytes::Bytes;

use super::api::{ApiClient, UploadFile};
use crate::config::DEFAULT_MAX_UPLOAD_SIZE;
use crate::models::BulkUploadResponse;
use crate::upload::MAX_FILES_PER_REQUEST;

/// Extensions accepted at intake.
pub const ACCEPTED_EXTENSIONS: [&str; 5] = ["jpeg", "jpg", "png", "webp", "heic"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnsupportedType,
    TooLarge,
}

#[derive(Debug, Clone)]
pub struct QueuedFile {
    pub data: Bytes,
    pub id: u64,
    pub mime_type: String,
    pub name: String,
    pub status: FileStatus,
}

#[derive(Debug)]
pub struct UploadQueue {
    files: Vec<QueuedFile>,
    max_size: u64,
    next_id: u64,
}

impl Default for UploadQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_SIZE)
    }
}

impl UploadQueue {
    pub fn new(max_size: u64) -> Self {
        Self {
            files: Vec::new(),
            max_size,
            next_id: 0,
        }
    }

    pub fn files(&self) -> &[QueuedFile] {
        &self.files
    }

    /// Accept a dropped or browsed file as pending, or say why not.
    pub fn add(&mut self, name: &str, data: Bytes) -> Result<u64, Rejection> {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(Rejection::UnsupportedType);
        }
        if data.len() as u64 > self.max_size {
            return Err(Rejection::TooLarge);
        }

        let mime_type = match extension.as_str() {
            "heic" => "image/heic".to_string(),
            _ => mime_guess::from_ext(&extension)
                .first_or_octet_stream()
                .to_string(),
        };

        let id = self.next_id;
        self.next_id += 1;
        self.files.push(QueuedFile {
            data,
            id,
            mime_type,
            name: name.to_string(),
            status: FileStatus::Pending,
        });
        Ok(id)
    }

    /// Drop a file that is waiting or failed. Files being uploaded or
    /// already uploaded stay.
    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.files.len();
        self.files.retain(|f| {
            f.id != id || matches!(f.status, FileStatus::Uploading | FileStatus::Success)
        });
        self.files.len() != before
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    /// Ids of every file not yet uploaded, in batches of at most ten.
    pub fn plan_batches(&self) -> Vec<Vec<u64>> {
        let ids: Vec<u64> = self
            .files
            .iter()
            .filter(|f| f.status != FileStatus::Success)
            .map(|f| f.id)
            .collect();
        ids.chunks(MAX_FILES_PER_REQUEST)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Mark a batch as uploading and return its files ready for submission.
    pub fn begin_batch(&mut self, batch: &[u64]) -> Vec<UploadFile> {
        self.files
            .iter_mut()
            .filter(|f| batch.contains(&f.id))
            .map(|f| {
                f.status = FileStatus::Uploading;
                UploadFile {
                    data: f.data.clone(),
                    file_name: f.name.clone(),
                    mime_type: f.mime_type.clone(),
                }
            })
            .collect()
    }

    /// Record a batch outcome. Results are matched back by original file
    /// name; anything without a successful result is an error.
    pub fn finish_batch(&mut self, batch: &[u64], response: Option<&BulkUploadResponse>) {
        for file in self.files.iter_mut().filter(|f| batch.contains(&f.id)) {
            let succeeded = response
                .and_then(|r| r.results.iter().find(|res| res.original_name == file.name))
                .is_some_and(|res| res.success);
            file.status = if succeeded {
                FileStatus::Success
            } else {
                FileStatus::Error
            };
        }
    }

    /// Upload every file not yet marked success, one batch at a time.
    pub async fn upload_all(&mut self, api: &ApiClient, guest_name: &str) {
        for batch in self.plan_batches() {
            let files = self.begin_batch(&batch);
            match api.upload_bulk(guest_name, &files).await {
                Ok(response) => self.finish_batch(&batch, Some(&response)),
                Err(e) => {
                    tracing::warn!(error = %e, files = batch.len(), "Batch upload failed");
                    self.finish_batch(&batch, None);
                }
            }
        }
    }
}
