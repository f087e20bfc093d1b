mod local;

pub use local::LocalFileStore;

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Abstraction over the file tree that holds study-set uploads.
/// Keys are `/`-separated paths relative to the store root.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Write `data` at `key`, creating parent directories.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), FileStoreError>;
    /// Create the directory at `key` and its parents. Succeeds if it already exists.
    async fn ensure_directory(&self, key: &str) -> Result<(), FileStoreError>;
    /// Rename `from` to `to`, returning the absolute final path.
    async fn move_file(&self, from: &str, to: &str) -> Result<PathBuf, FileStoreError>;
    /// Remove a single file. Missing files are not an error.
    async fn delete_file(&self, key: &str) -> Result<(), FileStoreError>;
    /// Remove a directory and everything under it. Missing directories are not an error.
    async fn delete_directory_recursive(&self, key: &str) -> Result<(), FileStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, FileStoreError>;
    /// Absolute location of `key` on disk.
    fn resolve(&self, key: &str) -> Result<PathBuf, FileStoreError>;
}
