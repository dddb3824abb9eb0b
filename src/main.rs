use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wedding_gallery::{
    api,
    client::{gallery, uploader::FileStatus, ApiClient, Gallery, UploadQueue},
    config::{Config, StorageBackend},
    object_store as obj,
    AppState,
};

#[derive(Parser)]
#[command(name = "wedding-gallery", version, about = "Wedding photo sharing service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Upload photos to a running server
    Upload {
        /// Photos to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Name shown as the uploader
        #[arg(long, default_value = "")]
        guest: String,
        #[arg(long, default_value = "http://localhost:8080")]
        server: String,
    },
    /// Download every photo of the gallery
    Download {
        /// Directory the photos are written to
        #[arg(long, default_value = ".")]
        out: PathBuf,
        #[arg(long, default_value = "http://localhost:8080")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Upload {
            files,
            guest,
            server,
        } => upload(&server, &guest, &files).await,
        Command::Download { out, server } => download(&server, &out).await,
    }
}

fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "wedding-gallery starting");

    let config = Config::load()?;

    let object_store: Arc<dyn obj::ObjectStore> = match config.storage.backend {
        StorageBackend::Local => {
            let store = obj::LocalStore::new(&config.storage.local_storage_path)?;
            info!(
                "Using local storage backend at: {}",
                config.storage.local_storage_path
            );
            Arc::new(store)
        }
        StorageBackend::Drive => {
            let store =
                obj::DriveStore::new(&config.storage.drive, obj::DriveEndpoints::default()).await?;
            info!("Using Google Drive storage backend");
            Arc::new(store)
        }
    };

    if let Some(folder_id) = config.folder_id() {
        info!(folder_id = %folder_id, "Photos folder configured");
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        object_store,
    });

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on: {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn upload(server: &str, guest: &str, paths: &[PathBuf]) -> anyhow::Result<()> {
    let api = ApiClient::new(server)?;
    let mut queue = UploadQueue::default();

    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let data = tokio::fs::read(path).await?;
        if let Err(rejection) = queue.add(&name, data.into()) {
            tracing::warn!(file = %path.display(), reason = ?rejection, "Skipping file");
        }
    }

    queue.upload_all(&api, guest).await;

    for file in queue.files() {
        if file.status != FileStatus::Success {
            tracing::warn!(file = %file.name, "Not uploaded");
        }
    }
    info!(
        uploaded = queue.count(FileStatus::Success),
        failed = queue.count(FileStatus::Error),
        "Upload finished"
    );
    Ok(())
}

async fn download(server: &str, out: &Path) -> anyhow::Result<()> {
    let api = ApiClient::new(server)?;
    let mut feed = Gallery::new();

    let mut request = feed.start_initial_load();
    while let Some(page) = request {
        let result = api
            .list_photos(page.page_token.as_deref(), page.page_size)
            .await
            .map_err(|e| e.to_string());
        feed.finish_page_load(&page, result);
        if let Some(error) = feed.error() {
            anyhow::bail!("Failed to load photos: {error}");
        }
        request = feed.on_sentinel_visible();
    }

    feed.toggle_selection_mode();
    feed.toggle_select_all();
    tokio::fs::create_dir_all(out).await?;

    let mut taken = HashSet::new();
    let summary = gallery::download_sequentially(
        feed.selected_photos(),
        gallery::DOWNLOAD_DELAY,
        |photo| {
            let api = api.clone();
            let file_name =
                gallery::unique_file_name(&mut taken, gallery::download_file_name(&photo));
            let path = out.join(file_name);
            async move {
                let data = api.fetch(&photo.full_size).await?;
                tokio::fs::write(&path, &data).await.map_err(anyhow::Error::from)?;
                Ok::<(), anyhow::Error>(())
            }
        },
    )
    .await;
    feed.finish_batch_download();

    info!(
        downloaded = summary.downloaded,
        failed = summary.failed,
        "Download finished"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
