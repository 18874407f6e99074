use serde::Deserialize;
use std::{collections::HashMap, path::Path};
use thiserror::Error;

const BUILTIN: &str = include_str!("taxonomy.toml");

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("failed to read taxonomy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse taxonomy: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("subject {0} is listed more than once")]
    DuplicateSubject(String),

    #[error("subcategory {subcategory} belongs to both {first} and {second}")]
    DuplicateSubcategory {
        subcategory: String,
        first: String,
        second: String,
    },

    #[error("subcategory {subcategory} of subject {subject} belongs to no category")]
    UnassignedSubcategory { subject: String, subcategory: String },
}

#[derive(Deserialize)]
struct TaxonomyFile {
    category: Vec<Entry>,
    subject: Vec<Entry>,
}

#[derive(Deserialize)]
struct Entry {
    name: String,
    subcategories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub subcategories: Vec<String>,
}

/// Static many-to-many grouping of subjects into subcategories,
/// and of subcategories into exactly one category each.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    subjects: HashMap<String, Vec<String>>,
    subcategories: Vec<String>,
    categories: Vec<Category>,
    category_of: HashMap<String, usize>,
}

impl Taxonomy {
    /// The standard MMLU grouping of its 57 subjects.
    pub fn builtin() -> Result<Self, TaxonomyError> {
        Self::from_toml_str(BUILTIN)
    }

    pub fn from_path(path: &Path) -> Result<Self, TaxonomyError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, TaxonomyError> {
        let file: TaxonomyFile = toml::from_str(text)?;

        let mut category_of = HashMap::new();
        for (idx, category) in file.category.iter().enumerate() {
            for subcategory in &category.subcategories {
                if let Some(prev) = category_of.insert(subcategory.clone(), idx) {
                    return Err(TaxonomyError::DuplicateSubcategory {
                        subcategory: subcategory.clone(),
                        first: file.category[prev].name.clone(),
                        second: category.name.clone(),
                    });
                }
            }
        }

        let mut subjects = HashMap::new();
        let mut subcategories: Vec<String> = Vec::new();
        for subject in file.subject {
            for subcategory in &subject.subcategories {
                if !category_of.contains_key(subcategory) {
                    return Err(TaxonomyError::UnassignedSubcategory {
                        subject: subject.name,
                        subcategory: subcategory.clone(),
                    });
                }
                if !subcategories.contains(subcategory) {
                    subcategories.push(subcategory.clone());
                }
            }
            if subjects.contains_key(&subject.name) {
                return Err(TaxonomyError::DuplicateSubject(subject.name));
            }
            subjects.insert(subject.name, subject.subcategories);
        }

        Ok(Self {
            subjects,
            subcategories,
            categories: file
                .category
                .into_iter()
                .map(|x| Category {
                    name: x.name,
                    subcategories: x.subcategories,
                })
                .collect(),
            category_of,
        })
    }

    pub fn subcategories_of(&self, subject: &str) -> Option<&[String]> {
        self.subjects.get(subject).map(Vec::as_slice)
    }

    /// Subcategories in order of first appearance among the subjects.
    pub fn subcategories(&self) -> &[String] {
        &self.subcategories
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category_of(&self, subcategory: &str) -> Option<&Category> {
        self.category_of
            .get(subcategory)
            .map(|idx| &self.categories[*idx])
    }

    pub fn num_subjects(&self) -> usize {
        self.subjects.len()
    }
}
