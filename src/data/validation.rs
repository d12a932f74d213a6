//! Dataset sanity checks run before training

use super::{ColumnKind, Dataset};
use crate::error::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Serialize)]
pub struct BasicChecks {
    pub is_empty: bool,
    pub rows: usize,
    pub columns: usize,
    pub duplicate_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnCheck {
    pub dtype: String,
    pub unique_values: usize,
    pub missing_count: usize,
    pub missing_percentage: f64,
    /// Categorical column with too many levels for one-hot encoding
    pub high_cardinality: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetCheck {
    pub dtype: String,
    pub unique_values: usize,
    pub missing_values: usize,
    /// Most frequent values, at most ten
    pub top_values: Vec<(String, usize)>,
}

/// Result of [`DataValidator::validate`]
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub warnings: Vec<String>,
    pub basic_checks: BasicChecks,
    pub columns: HashMap<String, ColumnCheck>,
    pub total_missing: usize,
    pub missing_percentage_overall: f64,
    pub target_column: Option<TargetCheck>,
}

pub struct DataValidator<'a> {
    data: &'a Dataset,
    max_categorical_unique: usize,
}

impl<'a> DataValidator<'a> {
    pub fn new(data: &'a Dataset) -> Self {
        Self { data, max_categorical_unique: 20 }
    }

    pub fn with_max_categorical_unique(mut self, n: usize) -> Self {
        self.max_categorical_unique = n;
        self
    }

    /// Run every check; fails only when the target column does not exist
    pub fn validate(&self, target_column: Option<&str>) -> Result<ValidationReport> {
        let mut warnings = Vec::new();
        let n_rows = self.data.n_rows();

        let duplicate_rows = self.count_duplicates();
        if self.data.is_empty() {
            warnings.push("Dataset is empty".to_string());
        }
        if duplicate_rows > 0 {
            warnings.push(format!("Found {} duplicate rows", duplicate_rows));
        }

        let mut columns = HashMap::new();
        let mut total_missing = 0;
        for col in self.data.columns() {
            let missing = col.missing_count();
            total_missing += missing;
            let pct = if n_rows > 0 { missing as f64 / n_rows as f64 * 100.0 } else { 0.0 };
            if pct > 50.0 {
                warnings.push(format!("Column '{}' has {:.1}% missing values", col.name, pct));
            }
            let kind = col.kind();
            let unique = col.unique_count();
            let high_cardinality = kind == ColumnKind::Categorical && unique > self.max_categorical_unique;
            if high_cardinality {
                warnings.push(format!(
                    "Column '{}' has {} categories; one-hot encoding will be wide",
                    col.name, unique
                ));
            }
            columns.insert(
                col.name.clone(),
                ColumnCheck {
                    dtype: kind.dtype_name().to_string(),
                    unique_values: unique,
                    missing_count: missing,
                    missing_percentage: pct,
                    high_cardinality,
                },
            );
        }

        let cells = n_rows * self.data.n_cols();
        let missing_percentage_overall = if cells > 0 {
            total_missing as f64 / cells as f64 * 100.0
        } else {
            0.0
        };

        let target = match target_column {
            Some(name) => {
                let col = self.data.column(name)?;
                let missing_values = col.missing_count();
                if missing_values as f64 > n_rows as f64 * 0.5 {
                    warnings.push(format!("Target column '{}' has >50% missing values", name));
                }
                let mut counts: HashMap<String, usize> = HashMap::new();
                for v in col.values.iter().filter_map(|v| v.as_category()) {
                    *counts.entry(v).or_insert(0) += 1;
                }
                let unique_values = counts.len();
                let mut top_values: Vec<(String, usize)> = counts.into_iter().collect();
                top_values.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                top_values.truncate(10);
                Some(TargetCheck {
                    dtype: col.kind().dtype_name().to_string(),
                    unique_values,
                    missing_values,
                    top_values,
                })
            }
            None => None,
        };

        let is_valid = !self.data.is_empty()
            && target.as_ref().map_or(true, |t| t.missing_values < n_rows);

        Ok(ValidationReport {
            is_valid,
            warnings,
            basic_checks: BasicChecks {
                is_empty: self.data.is_empty(),
                rows: n_rows,
                columns: self.data.n_cols(),
                duplicate_rows,
            },
            columns,
            total_missing,
            missing_percentage_overall,
            target_column: target,
        })
    }

    fn count_duplicates(&self) -> usize {
        let mut seen = HashSet::with_capacity(self.data.n_rows());
        let mut dupes = 0;
        for i in 0..self.data.n_rows() {
            let key: Vec<String> = self
                .data
                .columns()
                .iter()
                .map(|c| c.values[i].as_category().unwrap_or_default())
                .collect();
            if !seen.insert(key) {
                dupes += 1;
            }
        }
        dupes
    }
}
