use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A study set record stored in redb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySet {
    pub id: u64,
    pub owner_id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A file attached to a study set. `file_path` is relative to the file-store root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySetFile {
    pub id: u64,
    pub study_set_id: u64,
    pub file_path: String,
}

/// A staged file and the location it is headed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedMove {
    pub staged: String,
    pub target: String,
}

/// A path moved into the trash area, pending purge or restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkedPath {
    pub original: String,
    pub parked: String,
}

/// Planned file-system effects of an in-flight lifecycle operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntentKind {
    /// Staged files are being moved into a study-set directory. Cleared in the
    /// same transaction that inserts the file rows, so a surviving `Place`
    /// always means the rows were never committed.
    Place {
        study_set_id: u64,
        directory: String,
        created_directory: bool,
        moves: Vec<PlannedMove>,
    },
    /// Paths are being parked in the trash before their rows are deleted.
    /// `committed` flips in the row-deleting transaction. `file_id` is set
    /// when a single file row is being removed rather than the whole set.
    Remove {
        study_set_id: u64,
        #[serde(default)]
        file_id: Option<u64>,
        parked: Vec<ParkedPath>,
        committed: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub id: u64,
    pub kind: IntentKind,
    pub recorded_at: DateTime<Utc>,
}
