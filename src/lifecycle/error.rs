use std::time::Duration;

use thiserror::Error;

use crate::file_store::FileStoreError;
use crate::storage::DatabaseError;

/// Failure of a study-set lifecycle operation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Missing or empty required input. Raised before any store access.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    /// The database or the file store failed during an otherwise valid operation.
    #[error("{0}")]
    Storage(String),
}

impl From<DatabaseError> for LifecycleError {
    fn from(e: DatabaseError) -> Self {
        LifecycleError::Storage(e.to_string())
    }
}

impl From<FileStoreError> for LifecycleError {
    fn from(e: FileStoreError) -> Self {
        LifecycleError::Storage(e.to_string())
    }
}

/// A bounded file-store call that did not succeed.
#[derive(Debug, Error)]
pub(super) enum FileOpError {
    #[error(transparent)]
    Failed(#[from] FileStoreError),
    /// The deadline passed. The underlying call may still take effect later.
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
}

impl FileOpError {
    pub(super) fn is_timeout(&self) -> bool {
        matches!(self, FileOpError::TimedOut { .. })
    }
}

impl From<FileOpError> for LifecycleError {
    fn from(e: FileOpError) -> Self {
        LifecycleError::Storage(e.to_string())
    }
}
