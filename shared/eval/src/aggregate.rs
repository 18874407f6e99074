use serde::Serialize;
use std::{
    collections::HashMap,
    ops::{Add, AddAssign},
};
use tracing::{debug, warn};

use crate::taxonomy::Taxonomy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccuracyCounts {
    pub correct: u64,
    pub total: u64,
}

impl AccuracyCounts {
    pub fn new(correct: u64, total: u64) -> Self {
        Self { correct, total }
    }

    /// `0.0` when nothing was counted.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl Add for AccuracyCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            correct: self.correct + rhs.correct,
            total: self.total + rhs.total,
        }
    }
}

impl AddAssign for AccuracyCounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for AccuracyCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAccuracy {
    pub name: String,
    pub correct: u64,
    pub total: u64,
    pub accuracy: f64,
}

impl GroupAccuracy {
    fn new(name: &str, counts: AccuracyCounts) -> Self {
        Self {
            name: name.to_owned(),
            correct: counts.correct,
            total: counts.total,
            accuracy: counts.accuracy(),
        }
    }

    pub fn counts(&self) -> AccuracyCounts {
        AccuracyCounts::new(self.correct, self.total)
    }

    pub fn line(&self) -> String {
        format!("Average accuracy {:.3} - {}", self.accuracy, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub subjects: Vec<GroupAccuracy>,
    pub subcategories: Vec<GroupAccuracy>,
    pub categories: Vec<GroupAccuracy>,
    pub overall: AccuracyCounts,
    pub overall_accuracy: f64,
}

impl AccuracyReport {
    /// Subcategory lines, then category lines, then the overall line.
    pub fn summary_lines(&self) -> Vec<String> {
        self.subcategories
            .iter()
            .chain(self.categories.iter())
            .map(GroupAccuracy::line)
            .chain(std::iter::once(format!(
                "Average accuracy: {:.3}",
                self.overall_accuracy
            )))
            .collect()
    }
}

/// Rolls per-subject counts up the taxonomy. Every level sums counts
/// first and divides once, so larger subjects weigh more.
pub struct Aggregator<'a> {
    taxonomy: &'a Taxonomy,
    subjects: Vec<(String, AccuracyCounts)>,
}

impl<'a> Aggregator<'a> {
    pub fn new(taxonomy: &'a Taxonomy) -> Self {
        Self {
            taxonomy,
            subjects: Vec::new(),
        }
    }

    pub fn record(&mut self, subject: &str, counts: AccuracyCounts) {
        if self.taxonomy.subcategories_of(subject).is_none() {
            warn!("Subject {subject} is not in the taxonomy, it only counts toward the overall accuracy");
        }
        self.subjects.push((subject.to_owned(), counts));
    }

    pub fn report(&self) -> AccuracyReport {
        let mut by_subcategory: HashMap<&str, AccuracyCounts> = HashMap::new();
        for (subject, counts) in &self.subjects {
            for subcategory in self.taxonomy.subcategories_of(subject).unwrap_or_default() {
                *by_subcategory.entry(subcategory.as_str()).or_default() += *counts;
            }
        }

        let subcategories = self
            .taxonomy
            .subcategories()
            .iter()
            .filter_map(|name| match by_subcategory.get(name.as_str()) {
                Some(counts) if counts.total > 0 => Some(GroupAccuracy::new(name, *counts)),
                _ => {
                    debug!("No examples evaluated for subcategory {name}");
                    None
                }
            })
            .collect::<Vec<_>>();

        let mut by_category: HashMap<&str, AccuracyCounts> = HashMap::new();
        for (subcategory, counts) in &by_subcategory {
            if let Some(category) = self.taxonomy.category_of(subcategory) {
                *by_category.entry(category.name.as_str()).or_default() += *counts;
            }
        }

        let categories = self
            .taxonomy
            .categories()
            .iter()
            .filter_map(|category| match by_category.get(category.name.as_str()) {
                Some(counts) if counts.total > 0 => Some(GroupAccuracy::new(&category.name, *counts)),
                _ => {
                    debug!("No examples evaluated for category {}", category.name);
                    None
                }
            })
            .collect::<Vec<_>>();

        let overall = self.subjects.iter().map(|(_, x)| *x).sum::<AccuracyCounts>();

        AccuracyReport {
            subjects: self
                .subjects
                .iter()
                .map(|(name, counts)| GroupAccuracy::new(name, *counts))
                .collect(),
            subcategories,
            categories,
            overall,
            overall_accuracy: overall.accuracy(),
        }
    }
}
