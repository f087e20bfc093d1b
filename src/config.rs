use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub uploads: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the redb database file
    pub data_dir: String,
    /// Root of the study-set file tree (staging, trash and owner directories)
    pub upload_dir: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum size of a single uploaded file in bytes
    pub max_upload_size: u64,
    /// Maximum number of files accepted in one create/update request
    pub max_files_per_request: usize,
    /// Upper bound on any single file-store operation
    pub file_op_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5001".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            upload_dir: "./uploads".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 50 * 1024 * 1024, // 50MB
            max_files_per_request: 5,
            file_op_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let server_defaults = ServerConfig::default();
        let storage_defaults = StorageConfig::default();
        let defaults = UploadConfig::default();

        let bind_address = std::env::var("BIND_ADDRESS").unwrap_or(server_defaults.bind_address);

        let data_dir = std::env::var("DATA_DIR").unwrap_or(storage_defaults.data_dir);
        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or(storage_defaults.upload_dir);

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_upload_size);

        let max_files_per_request = std::env::var("MAX_FILES_PER_REQUEST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_files_per_request);

        let file_op_timeout = std::env::var("FILE_OP_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.file_op_timeout);

        let config = Config {
            server: ServerConfig { bind_address },
            storage: StorageConfig {
                data_dir,
                upload_dir,
            },
            uploads: UploadConfig {
                max_upload_size,
                max_files_per_request,
                file_op_timeout,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.upload_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "UPLOAD_DIR cannot be empty".to_string(),
            ));
        }

        if self.uploads.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.uploads.max_files_per_request == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_FILES_PER_REQUEST must be greater than 0".to_string(),
            ));
        }

        if self.uploads.file_op_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "FILE_OP_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        if self.uploads.max_files_per_request > 20 {
            tracing::warn!(
                "MAX_FILES_PER_REQUEST is {}. Large fan-outs hold the study-set lock \
                 for the whole batch.",
                self.uploads.max_files_per_request
            );
        }

        Ok(())
    }
}
