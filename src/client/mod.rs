//! Client side of the gallery: HTTP client plus the gallery and uploader
//! state machines driven by the CLI.

pub mod api;
pub mod gallery;
pub mod uploader;

pub use api::{ApiClient, ClientError, UploadFile};
pub use gallery::Gallery;
pub use uploader::UploadQueue;
