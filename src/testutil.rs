//! Shared test helpers for in-crate handler tests.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, ServerConfig, StorageConfig, UploadConfig};
use crate::file_store::LocalFileStore;
use crate::lifecycle::StudySetManager;
use crate::storage::Database;
use crate::AppState;

/// Create a test AppState with a temporary database and upload tree.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    test_state_with_limits(temp_dir, 10 * 1024 * 1024, 5) // 10MB for tests
}

/// Like [`test_state`], with explicit per-file size and per-request file limits.
pub fn test_state_with_limits(
    temp_dir: &tempfile::TempDir,
    max_upload_size: u64,
    max_files_per_request: usize,
) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let upload_dir = temp_dir.path().join("uploads");

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
        },
        storage: StorageConfig {
            data_dir: data_dir.to_string_lossy().to_string(),
            upload_dir: upload_dir.to_string_lossy().to_string(),
        },
        uploads: UploadConfig {
            max_upload_size,
            max_files_per_request,
            file_op_timeout: Duration::from_secs(5),
        },
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let files = LocalFileStore::new(&upload_dir).expect("Failed to create test file store");
    let manager = StudySetManager::new(db, Arc::new(files), config.uploads.file_op_timeout);

    Arc::new(AppState { config, manager })
}
