use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub storage: StorageConfig,
    /// Maximum accepted size of a single photo in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Drive,
    Local,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Folder that receives uploads and is listed by the gallery.
    /// When absent, upload and list endpoints answer with a fixed error.
    pub folder_id: Option<String>,
    /// Directory for local storage backend
    pub local_storage_path: String,
    pub drive: DriveCredentials,
}

/// OAuth client and owner refresh token used to act on the owner's drive.
#[derive(Debug, Clone, Default)]
pub struct DriveCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024;

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Drive,
            folder_id: None,
            local_storage_path: "./photos".to_string(),
            drive: DriveCredentials::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            storage: StorageConfig::default(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_SIZE);

        let backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "drive".to_string())
            .to_lowercase()
            .as_str()
        {
            "local" => StorageBackend::Local,
            _ => StorageBackend::Drive,
        };

        let local_storage_path =
            std::env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./photos".to_string());

        let config = Config {
            bind_address,
            storage: StorageConfig {
                backend,
                folder_id: non_empty_var("GOOGLE_DRIVE_FOLDER_ID"),
                local_storage_path,
                drive: DriveCredentials {
                    client_id: non_empty_var("GOOGLE_CLIENT_ID"),
                    client_secret: non_empty_var("GOOGLE_CLIENT_SECRET"),
                    refresh_token: non_empty_var("GOOGLE_REFRESH_TOKEN"),
                },
            },
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Drive {
            let creds = &self.storage.drive;
            let missing: Vec<&str> = [
                ("GOOGLE_CLIENT_ID", creds.client_id.is_none()),
                ("GOOGLE_CLIENT_SECRET", creds.client_secret.is_none()),
                ("GOOGLE_REFRESH_TOKEN", creds.refresh_token.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();

            if !missing.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} required when STORAGE_BACKEND=drive",
                    missing.join(", ")
                )));
            }
        }

        if self.storage.folder_id.is_none() {
            tracing::warn!(
                "GOOGLE_DRIVE_FOLDER_ID is not set. Upload and gallery endpoints will report \
                 that storage is not configured."
            );
        }

        Ok(())
    }

    /// Destination folder for uploads and listings, if configured.
    pub fn folder_id(&self) -> Option<&str> {
        self.storage.folder_id.as_deref()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
