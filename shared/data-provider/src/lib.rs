mod hub;
mod local;
mod table;

pub use hub::{download_model_repo_sync, resolve_model_files};
pub use local::{dev_path, discover_subjects, test_path, SubjectData};
pub use table::{Example, ExampleTable, Letter, ParseLetterError, TableError, NUM_COLUMNS};
