//! Shared test helpers for wedding-gallery tests.

use std::sync::Arc;

use image::{DynamicImage, ImageEncoder, ImageFormat, RgbImage};

use crate::config::{Config, StorageBackend, StorageConfig};
use crate::object_store::{LocalStore, ObjectStore};
use crate::AppState;

pub const TEST_FOLDER: &str = "wedding-folder";

/// Create a test AppState backed by a local object store in a temp dir.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let store = LocalStore::new(temp_dir.path().join("photos"))
        .expect("Failed to create test object store");
    state_with_store(Arc::new(store), Some(TEST_FOLDER))
}

pub fn state_with_store(
    object_store: Arc<dyn ObjectStore>,
    folder_id: Option<&str>,
) -> Arc<AppState> {
    let config = Config {
        bind_address: "127.0.0.1:0".to_string(),
        storage: StorageConfig {
            backend: StorageBackend::Local,
            folder_id: folder_id.map(str::to_string),
            ..Default::default()
        },
        max_upload_size: 10 * 1024 * 1024,
    };

    Arc::new(AppState {
        config,
        object_store,
    })
}

/// Serve the router on an ephemeral port and return its base URL.
pub async fn spawn_server(state: Arc<AppState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("listener has an address");
    let app = crate::api::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server failed");
    });
    format!("http://{addr}")
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// A gradient JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .expect("Failed to encode test JPEG");
    buf
}

/// The gradient in another encodable format (PNG, lossless WebP).
pub fn encoded_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(gradient(width, height))
        .write_to(&mut std::io::Cursor::new(&mut buf), format)
        .expect("Failed to encode test image");
    buf
}

/// The start of a HEIC file: an `ftyp` box with HEIF brands and some payload.
pub fn heic_bytes() -> Vec<u8> {
    let mut data = b"\0\0\0\x18ftypheic\0\0\0\0mif1heic".to_vec();
    data.extend_from_slice(&[0x42; 64]);
    data
}
