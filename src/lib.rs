//! study-sets - backend for a study-aid application
//!
//! This crate owns study sets and the course documents uploaded into them:
//! - redb embedded database for study-set and file records (ACID, MVCC, crash-safe)
//! - Local file tree keyed by `{owner_id}/{study_set_id}/`
//! - Intent log reconciling database and file-tree effects after failures
//! - REST API with multipart upload support

pub mod api;
pub mod config;
pub mod file_store;
pub mod lifecycle;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use config::Config;
use lifecycle::StudySetManager;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub manager: StudySetManager,
}
