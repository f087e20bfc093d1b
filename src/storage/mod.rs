pub mod db;
mod intents;
pub mod models;
mod study_sets;
mod tables;

pub use db::{next_id, Database, DatabaseError};
pub use intents::{put_intent, remove_intent};
pub use study_sets::{
    insert_study_set, insert_study_set_file, remove_study_set, remove_study_set_file,
    remove_study_set_files, update_study_set,
};
pub use tables::*;
