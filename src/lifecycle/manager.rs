use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use redb::WriteTransaction;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::{FileOpError, LifecycleError};
use super::locks::StudySetLocks;
use crate::file_store::{FileStore, FileStoreError};
use crate::storage::models::{
    IntentKind, IntentRecord, ParkedPath, PlannedMove, StudySet, StudySetFile,
};
use crate::storage::{
    insert_study_set, insert_study_set_file, next_id, put_intent, remove_intent,
    remove_study_set, remove_study_set_file, remove_study_set_files, update_study_set, Database,
    INTENT_SEQUENCE, STUDY_SET_FILE_SEQUENCE, STUDY_SET_SEQUENCE,
};

/// Staging area for uploads that have not been attached to a study set yet.
pub const STAGING_DIR: &str = "tmp";
/// Parking area for paths whose rows are being deleted.
pub const TRASH_DIR: &str = ".trash";

/// An uploaded file sitting in the staging area.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingFile {
    pub original_name: String,
    pub staged_key: String,
}

/// Where an incoming file ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedFile {
    pub original_name: String,
    pub final_path: String,
}

#[derive(Debug, Clone)]
pub struct StudySetWithUploads {
    pub study_set: StudySet,
    pub files: Vec<PlacedFile>,
}

#[derive(Debug, Clone)]
pub struct StudySetDetails {
    pub study_set: StudySet,
    pub files: Vec<StudySetFile>,
}

#[derive(Debug, Clone)]
pub struct DeletedStudySet {
    pub study_set: StudySet,
    pub files_removed: usize,
}

/// A recorded `Place` intent and the moves it covers.
struct Placement {
    intent: IntentRecord,
    study_set_id: u64,
    directory: String,
    moves: Vec<PlannedMove>,
}

/// Owns study-set records and the directory tree `{owner_id}/{study_set_id}/`.
///
/// Rows live in redb, files in a [`FileStore`]. Every operation that touches
/// both records an intent first, so that a crash or a failed step can be
/// reconciled by [`StudySetManager::recover`].
pub struct StudySetManager {
    pub(super) db: Database,
    pub(super) files: Arc<dyn FileStore>,
    locks: StudySetLocks,
    file_op_timeout: Duration,
}

impl StudySetManager {
    pub fn new(db: Database, files: Arc<dyn FileStore>, file_op_timeout: Duration) -> Self {
        Self {
            db,
            files,
            locks: StudySetLocks::new(),
            file_op_timeout,
        }
    }

    // ========================================================================
    // Staging
    // ========================================================================

    /// Write an upload into the staging area under a collision-free name that
    /// keeps the original extension.
    pub async fn stage(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<IncomingFile, LifecycleError> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        let staged_key = format!("{STAGING_DIR}/{}{extension}", uuid::Uuid::new_v4());

        self.bounded("stage upload", self.files.put(&staged_key, data))
            .await?;

        Ok(IncomingFile {
            original_name: original_name.to_string(),
            staged_key,
        })
    }

    /// Remove staged files that will never be attached.
    pub async fn discard_staged(&self, incoming: &[IncomingFile]) {
        for file in incoming {
            if let Err(e) = self
                .bounded("discard staged file", self.files.delete_file(&file.staged_key))
                .await
            {
                warn!(staged = %file.staged_key, error = %e, "Failed to discard staged file");
            }
        }
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    pub async fn create_study_set(
        &self,
        owner_id: u64,
        name: &str,
        description: Option<&str>,
        incoming: Vec<IncomingFile>,
    ) -> Result<StudySetWithUploads, LifecycleError> {
        let validated = validate_owner(owner_id).and_then(|_| validate_name(name));
        let name = match validated {
            Ok(name) => name,
            Err(e) => {
                self.discard_staged(&incoming).await;
                return Err(e);
            }
        };
        let description = normalize_description(description);

        let id = match self.db.reserve_id(STUDY_SET_SEQUENCE) {
            Ok(id) => id,
            Err(e) => {
                self.discard_staged(&incoming).await;
                return Err(e.into());
            }
        };

        let now = Utc::now();
        let study_set = StudySet {
            id,
            owner_id,
            name,
            description,
            created_at: now,
            modified_at: now,
        };

        let directory = study_set_directory(owner_id, id);
        let placement = self
            .begin_placement(id, &directory, true, &incoming)
            .await?;
        self.prepare_directory(&placement).await?;

        let ((), files) = self
            .place_files(placement, incoming, |txn| {
                insert_study_set(txn, &study_set)?;
                Ok(())
            })
            .await?;

        info!(study_set_id = id, owner_id, files = files.len(), "Created study set");
        Ok(StudySetWithUploads { study_set, files })
    }

    pub fn get_all_study_sets(&self, owner_id: u64) -> Result<Vec<StudySet>, LifecycleError> {
        validate_owner(owner_id)?;
        Ok(self.db.list_study_sets_by_owner(owner_id)?)
    }

    pub fn get_study_set_details(&self, id: u64) -> Result<StudySetDetails, LifecycleError> {
        let study_set = self
            .db
            .get_study_set(id)?
            .ok_or_else(study_set_not_found)?;
        let files = self.db.list_study_set_files(id)?;
        Ok(StudySetDetails { study_set, files })
    }

    /// File rows of a study set. An unknown study set has no files.
    pub fn get_files_for_study_set(&self, id: u64) -> Result<Vec<StudySetFile>, LifecycleError> {
        Ok(self.db.list_study_set_files(id)?)
    }

    /// Absolute on-disk paths of a study set's files, as consumed by content
    /// generation.
    pub fn study_set_file_paths(&self, id: u64) -> Result<Vec<PathBuf>, LifecycleError> {
        let details = self.get_study_set_details(id)?;
        details
            .files
            .iter()
            .map(|f| self.files.resolve(&f.file_path).map_err(LifecycleError::from))
            .collect()
    }

    pub async fn update_study_set(
        &self,
        id: u64,
        name: &str,
        description: Option<&str>,
        incoming: Vec<IncomingFile>,
    ) -> Result<StudySetWithUploads, LifecycleError> {
        let validated = if id == 0 {
            Err(LifecycleError::Validation(
                "Name and Study Set ID are required.".to_string(),
            ))
        } else {
            validate_name(name)
        };
        let name = match validated {
            Ok(name) => name,
            Err(e) => {
                self.discard_staged(&incoming).await;
                return Err(e);
            }
        };
        let description = normalize_description(description);

        let _guard = self.locks.acquire(id).await;

        let existing = match self.db.get_study_set(id) {
            Ok(Some(study_set)) => study_set,
            Ok(None) => {
                self.discard_staged(&incoming).await;
                return Err(study_set_not_found());
            }
            Err(e) => {
                self.discard_staged(&incoming).await;
                return Err(e.into());
            }
        };

        let now = Utc::now();
        let apply = |txn: &WriteTransaction| -> Result<StudySet, LifecycleError> {
            update_study_set(txn, id, &name, description.as_deref(), now)?
                .ok_or_else(study_set_not_found)
        };

        if incoming.is_empty() {
            let study_set = self.db.write(apply)?;
            info!(study_set_id = id, "Updated study set");
            return Ok(StudySetWithUploads {
                study_set,
                files: Vec::new(),
            });
        }

        let directory = study_set_directory(existing.owner_id, id);
        let placement = self
            .begin_placement(id, &directory, false, &incoming)
            .await?;
        self.prepare_directory(&placement).await?;

        let (study_set, files) = self.place_files(placement, incoming, apply).await?;

        info!(study_set_id = id, files = files.len(), "Updated study set");
        Ok(StudySetWithUploads { study_set, files })
    }

    pub async fn delete_study_set(&self, id: u64) -> Result<DeletedStudySet, LifecycleError> {
        if id == 0 {
            return Err(LifecycleError::Validation(
                "Study set ID is required.".to_string(),
            ));
        }

        let _guard = self.locks.acquire(id).await;

        let existing = self
            .db
            .get_study_set(id)?
            .ok_or_else(study_set_not_found)?;
        let directory = study_set_directory(existing.owner_id, id);

        let intent_id = self.db.reserve_id(INTENT_SEQUENCE)?;
        let mut parked = Vec::new();
        if self
            .bounded("check directory", self.files.exists(&directory))
            .await?
        {
            parked.push(ParkedPath {
                original: directory,
                parked: format!("{}/{id}", trash_directory(intent_id)),
            });
        }

        let (study_set, files_removed) = self
            .remove_with_intent(intent_id, id, None, parked, |txn| {
                let files = remove_study_set_files(txn, id)?;
                let removed = remove_study_set(txn, id)?.ok_or_else(study_set_not_found)?;
                Ok((removed, files.len()))
            })
            .await?;

        info!(
            study_set_id = id,
            owner_id = study_set.owner_id,
            files_removed,
            "Deleted study set"
        );
        Ok(DeletedStudySet {
            study_set,
            files_removed,
        })
    }

    pub async fn delete_file_from_study_set(
        &self,
        file_id: u64,
    ) -> Result<StudySetFile, LifecycleError> {
        if file_id == 0 {
            return Err(LifecycleError::Validation("File ID is required.".to_string()));
        }

        let file = self
            .db
            .get_study_set_file(file_id)?
            .ok_or_else(file_not_found)?;

        let _guard = self.locks.acquire(file.study_set_id).await;

        // The row may have gone while waiting for the lock.
        let file = self
            .db
            .get_study_set_file(file_id)?
            .ok_or_else(file_not_found)?;

        let intent_id = self.db.reserve_id(INTENT_SEQUENCE)?;
        let mut parked = Vec::new();
        if self
            .bounded("check file", self.files.exists(&file.file_path))
            .await?
        {
            let file_name = Path::new(&file.file_path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("file");
            parked.push(ParkedPath {
                original: file.file_path.clone(),
                parked: format!("{}/{file_name}", trash_directory(intent_id)),
            });
        } else {
            warn!(file_id, path = %file.file_path, "File missing on disk, removing row only");
        }

        let removed = self
            .remove_with_intent(intent_id, file.study_set_id, Some(file_id), parked, |txn| {
                remove_study_set_file(txn, file_id)?.ok_or_else(file_not_found)
            })
            .await?;

        info!(file_id, study_set_id = removed.study_set_id, "Deleted study set file");
        Ok(removed)
    }

    // ========================================================================
    // Placement protocol
    // ========================================================================

    /// Record the `Place` intent for moving `incoming` into `directory`.
    ///
    /// Nothing may be created under `directory` before this returns, so that
    /// anything an interrupted placement leaves behind is covered by an
    /// intent. On failure the staged files are discarded.
    async fn begin_placement(
        &self,
        study_set_id: u64,
        directory: &str,
        created_directory: bool,
        incoming: &[IncomingFile],
    ) -> Result<Placement, LifecycleError> {
        let moves: Vec<PlannedMove> = incoming
            .iter()
            .map(|file| {
                let stored_name = Path::new(&file.staged_key)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(&file.staged_key);
                PlannedMove {
                    staged: file.staged_key.clone(),
                    target: format!("{directory}/{stored_name}"),
                }
            })
            .collect();

        let recorded = self.db.reserve_id(INTENT_SEQUENCE).and_then(|id| {
            let intent = IntentRecord {
                id,
                kind: IntentKind::Place {
                    study_set_id,
                    directory: directory.to_string(),
                    created_directory,
                    moves: moves.clone(),
                },
                recorded_at: Utc::now(),
            };
            self.db.record_intent(&intent).map(|_| intent)
        });

        match recorded {
            Ok(intent) => Ok(Placement {
                intent,
                study_set_id,
                directory: directory.to_string(),
                moves,
            }),
            Err(e) => {
                self.discard_staged(incoming).await;
                Err(e.into())
            }
        }
    }

    /// Make sure the placement's directory exists, abandoning the placement
    /// if it cannot be created.
    async fn prepare_directory(&self, placement: &Placement) -> Result<(), LifecycleError> {
        let created = self
            .bounded(
                "create directory",
                self.files.ensure_directory(&placement.directory),
            )
            .await;

        match created {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    study_set_id = placement.study_set_id,
                    error = %e,
                    "Failed to create study set directory"
                );
                self.abandon_placement(&placement.intent, !e.is_timeout())
                    .await;
                Err(e.into())
            }
        }
    }

    /// Move staged files into place and commit their rows together with
    /// whatever `commit` writes.
    ///
    /// All moves run concurrently and are awaited before deciding. If any of
    /// them fails, or the transaction does, every moved and staged file is
    /// deleted and nothing is written.
    async fn place_files<T, F>(
        &self,
        placement: Placement,
        incoming: Vec<IncomingFile>,
        commit: F,
    ) -> Result<(T, Vec<PlacedFile>), LifecycleError>
    where
        F: FnOnce(&WriteTransaction) -> Result<T, LifecycleError>,
    {
        let Placement {
            intent,
            study_set_id,
            moves,
            ..
        } = placement;

        let results = join_all(
            moves
                .iter()
                .map(|m| self.bounded("move file", self.files.move_file(&m.staged, &m.target))),
        )
        .await;

        let failures: Vec<&FileOpError> = results
            .iter()
            .zip(&moves)
            .filter_map(|(result, m)| {
                result.as_ref().err().map(|e| {
                    warn!(study_set_id, staged = %m.staged, error = %e, "Failed to move file");
                    e
                })
            })
            .collect();

        if let Some(first) = failures.first() {
            let message = format!(
                "Error uploading files: {} of {} failed ({first})",
                failures.len(),
                moves.len(),
            );
            // A timed-out move may still land after this returns.
            let settled = failures.iter().all(|e| !e.is_timeout());
            self.abandon_placement(&intent, settled).await;
            return Err(LifecycleError::Storage(message));
        }

        let committed: Result<T, LifecycleError> = self.db.write(|txn| {
            let value = commit(txn)?;
            for m in &moves {
                let file = StudySetFile {
                    id: next_id(txn, STUDY_SET_FILE_SEQUENCE)?,
                    study_set_id,
                    file_path: m.target.clone(),
                };
                insert_study_set_file(txn, &file)?;
            }
            remove_intent(txn, intent.id)?;
            Ok(value)
        });

        match committed {
            Ok(value) => {
                let placed = incoming
                    .into_iter()
                    .zip(moves)
                    .map(|(file, m)| PlacedFile {
                        original_name: file.original_name,
                        final_path: m.target,
                    })
                    .collect();
                Ok((value, placed))
            }
            Err(e) => {
                warn!(study_set_id, error = %e, "Failed to commit placed files");
                self.abandon_placement(&intent, true).await;
                Err(e)
            }
        }
    }

    /// Undo a placement. The intent is dropped only when every file call has
    /// settled and the undo was complete; otherwise it is left for
    /// [`StudySetManager::recover`].
    async fn abandon_placement(&self, intent: &IntentRecord, settled: bool) {
        let clean = self.undo_placement(intent).await;
        if clean && settled {
            self.clear_intent_quietly(intent.id);
        } else {
            warn!(intent_id = intent.id, settled, "Placement left for recovery");
        }
    }

    /// Delete every moved and staged file of a `Place` intent. Returns whether
    /// every step succeeded.
    pub(super) async fn undo_placement(&self, intent: &IntentRecord) -> bool {
        let IntentKind::Place {
            directory,
            created_directory,
            moves,
            ..
        } = &intent.kind
        else {
            return false;
        };

        let mut clean = true;
        for m in moves {
            for key in [&m.target, &m.staged] {
                if let Err(e) = self
                    .bounded("delete file", self.files.delete_file(key))
                    .await
                {
                    warn!(intent_id = intent.id, path = %key, error = %e, "Failed to delete file");
                    clean = false;
                }
            }
        }

        if *created_directory {
            if let Err(e) = self
                .bounded(
                    "delete directory",
                    self.files.delete_directory_recursive(directory),
                )
                .await
            {
                warn!(intent_id = intent.id, error = %e, "Failed to delete directory");
                clean = false;
            }
        }

        clean
    }

    // ========================================================================
    // Removal protocol
    // ========================================================================

    /// Park `parked` paths in the trash, run `commit` with the intent marked
    /// committed, then purge the trash.
    ///
    /// A failure before the commit restores the parked paths. A park that
    /// timed out may still complete later, so its intent is kept untouched for
    /// recovery. A failed purge is logged and left to recovery; the rows are
    /// already gone and nothing remains under the owner's directory.
    async fn remove_with_intent<T, F>(
        &self,
        intent_id: u64,
        study_set_id: u64,
        file_id: Option<u64>,
        parked: Vec<ParkedPath>,
        commit: F,
    ) -> Result<T, LifecycleError>
    where
        F: FnOnce(&WriteTransaction) -> Result<T, LifecycleError>,
    {
        let mut intent = IntentRecord {
            id: intent_id,
            kind: IntentKind::Remove {
                study_set_id,
                file_id,
                parked: parked.clone(),
                committed: false,
            },
            recorded_at: Utc::now(),
        };
        self.db.record_intent(&intent)?;

        for (index, path) in parked.iter().enumerate() {
            if let Err(e) = self
                .bounded("park path", self.files.move_file(&path.original, &path.parked))
                .await
            {
                warn!(study_set_id, path = %path.original, error = %e, "Failed to park path");
                if e.is_timeout() {
                    warn!(study_set_id, intent_id, "Park did not settle, left for recovery");
                } else if self.restore_parked(intent_id, &parked[..index]).await {
                    self.clear_intent_quietly(intent_id);
                }
                return Err(e.into());
            }
        }

        intent.kind = IntentKind::Remove {
            study_set_id,
            file_id,
            parked: parked.clone(),
            committed: true,
        };
        let committed: Result<T, LifecycleError> = self.db.write(|txn| {
            let value = commit(txn)?;
            put_intent(txn, &intent)?;
            Ok(value)
        });

        let value = match committed {
            Ok(value) => value,
            Err(e) => {
                warn!(study_set_id, error = %e, "Failed to commit removal");
                if self.restore_parked(intent_id, &parked).await {
                    self.clear_intent_quietly(intent_id);
                }
                return Err(e);
            }
        };

        match self.purge_trash(intent_id).await {
            Ok(()) => self.clear_intent_quietly(intent_id),
            Err(e) => {
                warn!(study_set_id, intent_id, error = %e, "Failed to purge trash, left for recovery");
            }
        }

        Ok(value)
    }

    /// Move parked paths back where they came from. Returns whether every
    /// path was restored.
    ///
    /// A path that was recreated in the meantime is not overwritten; its
    /// parked copy stays in the trash and the restore counts as incomplete.
    pub(super) async fn restore_parked(&self, intent_id: u64, parked: &[ParkedPath]) -> bool {
        let mut clean = true;
        for path in parked {
            let restore = async {
                if !self.files.exists(&path.parked).await? {
                    return Ok(true);
                }
                if self.files.exists(&path.original).await? {
                    return Ok(false);
                }
                self.files.move_file(&path.parked, &path.original).await?;
                Ok::<_, FileStoreError>(true)
            };
            match self.bounded("restore path", restore).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(intent_id, path = %path.original, "Path was recreated, keeping parked copy");
                    clean = false;
                }
                Err(e) => {
                    warn!(intent_id, path = %path.original, error = %e, "Failed to restore parked path");
                    clean = false;
                }
            }
        }

        if clean {
            if let Err(e) = self.purge_trash(intent_id).await {
                debug!(intent_id, error = %e, "Failed to remove empty trash directory");
            }
        }
        clean
    }

    pub(super) async fn purge_trash(&self, intent_id: u64) -> Result<(), LifecycleError> {
        let trash = trash_directory(intent_id);
        self.bounded("purge trash", self.files.delete_directory_recursive(&trash))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Run a file-store call under the configured timeout.
    pub(super) async fn bounded<T, F>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> Result<T, FileOpError>
    where
        F: Future<Output = Result<T, FileStoreError>>,
    {
        match tokio::time::timeout(self.file_op_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(FileOpError::TimedOut {
                operation,
                after: self.file_op_timeout,
            }),
        }
    }

    fn clear_intent_quietly(&self, intent_id: u64) {
        if let Err(e) = self.db.clear_intent(intent_id) {
            warn!(intent_id, error = %e, "Failed to clear intent");
        }
    }
}

/// Directory owned by a study set, relative to the file-store root
pub fn study_set_directory(owner_id: u64, study_set_id: u64) -> String {
    format!("{owner_id}/{study_set_id}")
}

fn trash_directory(intent_id: u64) -> String {
    format!("{TRASH_DIR}/{intent_id}")
}

fn validate_owner(owner_id: u64) -> Result<(), LifecycleError> {
    if owner_id == 0 {
        return Err(LifecycleError::Validation("User ID is required.".to_string()));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<String, LifecycleError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LifecycleError::Validation(
            "Study set name is required.".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

fn study_set_not_found() -> LifecycleError {
    LifecycleError::NotFound("Study set not found.".to_string())
}

fn file_not_found() -> LifecycleError {
    LifecycleError::NotFound("File not found.".to_string())
}
