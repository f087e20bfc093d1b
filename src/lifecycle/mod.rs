//! Study-set lifecycle: create, read, update and delete of study sets and
//! their uploaded files.

mod error;
mod locks;
mod manager;
mod recovery;

pub use error::LifecycleError;
pub use locks::{StudySetGuard, StudySetLocks};
pub use manager::{
    study_set_directory, DeletedStudySet, IncomingFile, PlacedFile, StudySetDetails,
    StudySetManager, StudySetWithUploads, STAGING_DIR, TRASH_DIR,
};
pub use recovery::RecoveryReport;
