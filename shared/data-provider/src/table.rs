use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;

/// Number of columns in a subject table: question, four options, answer.
pub const NUM_COLUMNS: usize = 6;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to open {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read csv from {path:?}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{path:?} row {row}: expected 6 columns, found {found}")]
    ColumnCount {
        path: PathBuf,
        row: usize,
        found: usize,
    },

    #[error("{path:?} row {row}: answer {answer:?} is not one of A, B, C, D")]
    InvalidAnswer {
        path: PathBuf,
        row: usize,
        answer: String,
    },

    #[error("couldn't list subjects in {dir:?}: {source}")]
    ReadDir {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("no *_test.csv files in {0:?}")]
    NoSubjects(PathBuf),
}

#[derive(Debug, Error)]
#[error("{0:?} is not an answer letter")]
pub struct ParseLetterError(pub String);

/// One of the four answer letters of a multiple-choice question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Letter {
    A,
    B,
    C,
    D,
}

impl Letter {
    pub const ALL: [Letter; 4] = [Letter::A, Letter::B, Letter::C, Letter::D];

    pub const fn as_str(self) -> &'static str {
        match self {
            Letter::A => "A",
            Letter::B => "B",
            Letter::C => "C",
            Letter::D => "D",
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Letter {
    type Err = ParseLetterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" => Ok(Letter::A),
            "B" => Ok(Letter::B),
            "C" => Ok(Letter::C),
            "D" => Ok(Letter::D),
            other => Err(ParseLetterError(other.to_owned())),
        }
    }
}

impl Display for Letter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub question: String,
    pub options: [String; 4],
    pub answer: Letter,
}

impl Example {
    pub fn option(&self, letter: Letter) -> &str {
        &self.options[letter.index()]
    }
}

/// The rows of one header-less subject csv, in file order.
#[derive(Debug, Clone)]
pub struct ExampleTable {
    path: PathBuf,
    examples: Vec<Example>,
}

impl ExampleTable {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| TableError::Io {
            path: path.clone(),
            source,
        })?;
        let table = Self::from_reader(file, path)?;
        debug!(
            "Loaded {} examples from {}",
            table.len(),
            table.path.display()
        );
        Ok(table)
    }

    /// `path` is only used to label errors.
    pub fn from_reader<R: Read>(reader: R, path: PathBuf) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut examples = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let row = idx + 1;
            let record = record.map_err(|source| TableError::Csv {
                path: path.clone(),
                source,
            })?;
            if record.len() != NUM_COLUMNS {
                return Err(TableError::ColumnCount {
                    path,
                    row,
                    found: record.len(),
                });
            }
            let answer = &record[NUM_COLUMNS - 1];
            let answer = answer
                .parse::<Letter>()
                .map_err(|_| TableError::InvalidAnswer {
                    path: path.clone(),
                    row,
                    answer: answer.to_owned(),
                })?;
            examples.push(Example {
                question: record[0].to_owned(),
                options: [
                    record[1].to_owned(),
                    record[2].to_owned(),
                    record[3].to_owned(),
                    record[4].to_owned(),
                ],
                answer,
            });
        }
        Ok(Self { path, examples })
    }

    pub fn from_examples(path: PathBuf, examples: Vec<Example>) -> Self {
        Self { path, examples }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ExampleTable, TableError> {
        ExampleTable::from_reader(text.as_bytes(), PathBuf::from("inline.csv"))
    }

    #[test]
    fn test_parses_quoted_rows() {
        let table = parse(
            "\"What is 1 + 1, in base 10?\",1,2,3,4,B\nSecond question,\"a, b\",c,d,e, D \n",
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.examples()[0].question, "What is 1 + 1, in base 10?");
        assert_eq!(table.examples()[0].answer, Letter::B);
        assert_eq!(table.examples()[1].option(Letter::A), "a, b");
        assert_eq!(table.examples()[1].answer, Letter::D);
    }

    #[test]
    fn test_rejects_wrong_column_count() {
        let err = parse("q,a,b,c,A\n").unwrap_err();
        assert!(matches!(
            err,
            TableError::ColumnCount {
                row: 1, found: 5, ..
            }
        ));
    }

    #[test]
    fn test_rejects_unknown_answer() {
        let err = parse("q,a,b,c,d,A\nq,a,b,c,d,E\n").unwrap_err();
        match err {
            TableError::InvalidAnswer { row, answer, .. } => {
                assert_eq!(row, 2);
                assert_eq!(answer, "E");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_empty_table() {
        let table = parse("").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_letter_index_round_trip() {
        for (i, letter) in Letter::ALL.iter().enumerate() {
            assert_eq!(letter.index(), i);
            assert_eq!(letter.as_str().parse::<Letter>().unwrap(), *letter);
        }
    }
}
