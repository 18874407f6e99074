use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::table::{ExampleTable, TableError};

const TEST_SUFFIX: &str = "_test.csv";
const DEV_SUFFIX: &str = "_dev.csv";

pub fn dev_path(data_dir: &Path, subject: &str) -> PathBuf {
    data_dir.join("dev").join(format!("{subject}{DEV_SUFFIX}"))
}

pub fn test_path(data_dir: &Path, subject: &str) -> PathBuf {
    data_dir.join("test").join(format!("{subject}{TEST_SUFFIX}"))
}

/// Every subject with a `<subject>_test.csv` under `<data_dir>/test`, sorted by name.
pub fn discover_subjects(data_dir: &Path) -> Result<Vec<String>, TableError> {
    let dir = data_dir.join("test");
    let entries = std::fs::read_dir(&dir).map_err(|source| TableError::ReadDir {
        dir: dir.clone(),
        source,
    })?;
    let mut subjects = entries
        .flatten()
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_suffix(TEST_SUFFIX))
                .filter(|subject| !subject.is_empty())
                .map(str::to_owned)
        })
        .collect::<Vec<_>>();
    if subjects.is_empty() {
        return Err(TableError::NoSubjects(dir));
    }
    subjects.sort();
    info!("Found {} subjects in {}", subjects.len(), dir.display());
    Ok(subjects)
}

/// The few-shot pool and evaluation set of one subject.
#[derive(Debug, Clone)]
pub struct SubjectData {
    pub subject: String,
    pub dev: ExampleTable,
    pub test: ExampleTable,
}

impl SubjectData {
    pub fn load(data_dir: &Path, subject: &str) -> Result<Self, TableError> {
        let dev = ExampleTable::from_path(dev_path(data_dir, subject))?;
        let test = ExampleTable::from_path(test_path(data_dir, subject))?;
        debug!(
            "{subject}: {} dev examples from {}, {} test examples from {}",
            dev.len(),
            dev.path().display(),
            test.len(),
            test.path().display()
        );
        Ok(Self {
            subject: subject.to_owned(),
            dev,
            test,
        })
    }
}
