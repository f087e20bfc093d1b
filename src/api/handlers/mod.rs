mod health;
mod study_sets;

pub use health::health;
pub use study_sets::{
    create_study_set, delete_file_from_study_set, delete_study_set, get_study_set,
    list_study_set_files, list_study_sets, update_study_set,
};
