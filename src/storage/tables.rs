use redb::TableDefinition;

/// Study sets: id -> StudySet (msgpack)
pub const STUDY_SETS: TableDefinition<u64, &[u8]> = TableDefinition::new("study_sets");

/// Study set files: id -> StudySetFile (msgpack)
pub const STUDY_SET_FILES: TableDefinition<u64, &[u8]> = TableDefinition::new("study_set_files");

/// Owner index: owner_id -> msgpack Vec of study set ids, in insertion order
pub const OWNER_STUDY_SETS: TableDefinition<u64, &[u8]> = TableDefinition::new("owner_study_sets");

/// File index: study_set_id -> msgpack Vec of file ids, in insertion order
pub const STUDY_SET_FILE_IDS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("study_set_file_ids");

/// Auto-increment counters: sequence name -> last issued id
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Intent log: intent id -> IntentRecord (msgpack)
pub const INTENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("intents");

pub const STUDY_SET_SEQUENCE: &str = "study_sets";
pub const STUDY_SET_FILE_SEQUENCE: &str = "study_set_files";
pub const INTENT_SEQUENCE: &str = "intents";
