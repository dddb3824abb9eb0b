//! wedding-gallery - guest photo sharing backed by a cloud drive
//!
//! This crate provides:
//! - Single and bulk photo upload with EXIF auto-rotation and resizing
//! - A paginated gallery listing using the storage provider's cursors
//! - Image delivery with on-demand thumbnails and immutable caching
//! - Swappable storage backends (Google Drive, local filesystem)
//! - Client-side gallery and uploader state machines for the CLI

pub mod api;
pub mod client;
pub mod config;
pub mod imaging;
pub mod models;
pub mod object_store;
pub mod upload;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub object_store: Arc<dyn object_store::ObjectStore>,
}
