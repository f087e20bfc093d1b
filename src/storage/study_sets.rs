use chrono::{DateTime, Utc};
use redb::{ReadableTable, TableDefinition, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::{StudySet, StudySetFile};
use super::tables::*;

impl Database {
    // ========================================================================
    // Study set reads
    // ========================================================================

    /// Get a study set by id
    pub fn get_study_set(&self, id: u64) -> Result<Option<StudySet>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(STUDY_SETS)?;

        match table.get(id)? {
            Some(data) => {
                let study_set: StudySet = rmp_serde::from_slice(data.value())?;
                Ok(Some(study_set))
            }
            None => Ok(None),
        }
    }

    /// All study sets of an owner, in creation order
    pub fn list_study_sets_by_owner(&self, owner_id: u64) -> Result<Vec<StudySet>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owner_table = read_txn.open_table(OWNER_STUDY_SETS)?;
        let sets_table = read_txn.open_table(STUDY_SETS)?;

        let ids: Vec<u64> = match owner_table.get(owner_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut study_sets = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = sets_table.get(id)? {
                study_sets.push(rmp_serde::from_slice(data.value())?);
            }
        }

        Ok(study_sets)
    }

    // ========================================================================
    // Study set file reads
    // ========================================================================

    /// Get a study set file by id
    pub fn get_study_set_file(&self, id: u64) -> Result<Option<StudySetFile>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(STUDY_SET_FILES)?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// All files of a study set, in attachment order
    pub fn list_study_set_files(
        &self,
        study_set_id: u64,
    ) -> Result<Vec<StudySetFile>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index_table = read_txn.open_table(STUDY_SET_FILE_IDS)?;
        let files_table = read_txn.open_table(STUDY_SET_FILES)?;

        let file_ids: Vec<u64> = match index_table.get(study_set_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut files = Vec::with_capacity(file_ids.len());
        for file_id in file_ids {
            if let Some(data) = files_table.get(file_id)? {
                files.push(rmp_serde::from_slice(data.value())?);
            }
        }

        Ok(files)
    }
}

// ============================================================================
// Transactional writes
// ============================================================================

/// Insert a study set row and add it to its owner's index
pub fn insert_study_set(txn: &WriteTransaction, study_set: &StudySet) -> Result<(), DatabaseError> {
    debug_assert!(
        !study_set.name.trim().is_empty(),
        "study set name must not be empty"
    );

    {
        let mut table = txn.open_table(STUDY_SETS)?;
        let data = rmp_serde::to_vec_named(study_set)?;
        table.insert(study_set.id, data.as_slice())?;
    }

    index_push(txn, OWNER_STUDY_SETS, study_set.owner_id, study_set.id)
}

/// Rewrite the mutable fields of a study set. Returns the updated row, or
/// `None` when no such study set exists.
pub fn update_study_set(
    txn: &WriteTransaction,
    id: u64,
    name: &str,
    description: Option<&str>,
    modified_at: DateTime<Utc>,
) -> Result<Option<StudySet>, DatabaseError> {
    let mut table = txn.open_table(STUDY_SETS)?;

    let existing: Option<StudySet> = match table.get(id)? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };

    let Some(mut study_set) = existing else {
        return Ok(None);
    };

    study_set.name = name.to_string();
    study_set.description = description.map(|d| d.to_string());
    study_set.modified_at = modified_at;

    let data = rmp_serde::to_vec_named(&study_set)?;
    table.insert(id, data.as_slice())?;
    Ok(Some(study_set))
}

/// Delete a study set row and its owner index entry. File rows are left to
/// [`remove_study_set_files`].
pub fn remove_study_set(txn: &WriteTransaction, id: u64) -> Result<Option<StudySet>, DatabaseError> {
    let removed: Option<StudySet> = {
        let mut table = txn.open_table(STUDY_SETS)?;
        let result = match table.remove(id)? {
            Some(data) => Some(rmp_serde::from_slice(data.value())?),
            None => None,
        };
        result
    };

    if let Some(ref study_set) = removed {
        index_retain(txn, OWNER_STUDY_SETS, study_set.owner_id, |sid| sid != id)?;
    }

    Ok(removed)
}

/// Insert a file row and append it to its study set's file index
pub fn insert_study_set_file(
    txn: &WriteTransaction,
    file: &StudySetFile,
) -> Result<(), DatabaseError> {
    debug_assert!(!file.file_path.is_empty(), "file path must not be empty");

    {
        let mut table = txn.open_table(STUDY_SET_FILES)?;
        let data = rmp_serde::to_vec_named(file)?;
        table.insert(file.id, data.as_slice())?;
    }

    index_push(txn, STUDY_SET_FILE_IDS, file.study_set_id, file.id)
}

/// Delete every file row of a study set, returning the removed rows
pub fn remove_study_set_files(
    txn: &WriteTransaction,
    study_set_id: u64,
) -> Result<Vec<StudySetFile>, DatabaseError> {
    let file_ids: Vec<u64> = {
        let mut index_table = txn.open_table(STUDY_SET_FILE_IDS)?;
        let result = match index_table.remove(study_set_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => Vec::new(),
        };
        result
    };

    let mut table = txn.open_table(STUDY_SET_FILES)?;
    let mut removed = Vec::with_capacity(file_ids.len());
    for file_id in file_ids {
        if let Some(data) = table.remove(file_id)? {
            removed.push(rmp_serde::from_slice(data.value())?);
        }
    }

    Ok(removed)
}

/// Delete a single file row and its index entry
pub fn remove_study_set_file(
    txn: &WriteTransaction,
    file_id: u64,
) -> Result<Option<StudySetFile>, DatabaseError> {
    let removed: Option<StudySetFile> = {
        let mut table = txn.open_table(STUDY_SET_FILES)?;
        let result = match table.remove(file_id)? {
            Some(data) => Some(rmp_serde::from_slice(data.value())?),
            None => None,
        };
        result
    };

    if let Some(ref file) = removed {
        index_retain(txn, STUDY_SET_FILE_IDS, file.study_set_id, |fid| fid != file_id)?;
    }

    Ok(removed)
}

// ============================================================================
// Index helpers
// ============================================================================

fn read_index(
    txn: &WriteTransaction,
    index: TableDefinition<u64, &[u8]>,
    key: u64,
) -> Result<Vec<u64>, DatabaseError> {
    let table = txn.open_table(index)?;
    let ids = match table.get(key)? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => Vec::new(),
    };
    Ok(ids)
}

fn index_push(
    txn: &WriteTransaction,
    index: TableDefinition<u64, &[u8]>,
    key: u64,
    id: u64,
) -> Result<(), DatabaseError> {
    let mut ids = read_index(txn, index, key)?;
    if !ids.contains(&id) {
        ids.push(id);
        let data = rmp_serde::to_vec_named(&ids)?;
        let mut table = txn.open_table(index)?;
        table.insert(key, data.as_slice())?;
    }
    Ok(())
}

fn index_retain(
    txn: &WriteTransaction,
    index: TableDefinition<u64, &[u8]>,
    key: u64,
    keep: impl Fn(u64) -> bool,
) -> Result<(), DatabaseError> {
    let mut ids = read_index(txn, index, key)?;
    ids.retain(|id| keep(*id));

    let mut table = txn.open_table(index)?;
    if ids.is_empty() {
        table.remove(key)?;
    } else {
        let data = rmp_serde::to_vec_named(&ids)?;
        table.insert(key, data.as_slice())?;
    }
    Ok(())
}
