//! Tabular datasets
//!
//! A [`Dataset`] is a column-major table of loosely-typed cells. It is what the
//! upload endpoint produces and what the preprocessing adapter consumes.

mod ingestion;
mod validation;

pub use ingestion::{dataset_from_frame, load_csv, parse_csv_bytes, DatasetStore, StoredDataset};
pub use validation::{DataValidator, ValidationReport};

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Null, NaN, and blank strings all count as missing
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Number(v) => v.is_nan(),
            CellValue::Text(s) => s.trim().is_empty(),
        }
    }

    /// Numeric view of the cell; text is parsed after trimming.
    /// Non-finite values (`NaN`, `inf`, `1e999`) have no numeric view.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Null => None,
            CellValue::Number(v) => Some(*v).filter(|v| v.is_finite()),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Categorical key for the cell, `None` when missing
    pub fn as_category(&self) -> Option<String> {
        if self.is_missing() {
            return None;
        }
        match self {
            CellValue::Number(v) => Some(format_number(*v)),
            CellValue::Text(s) => Some(s.trim().to_string()),
            CellValue::Null => None,
        }
    }

    /// Convert an arbitrary JSON value (from a request body) into a cell
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(b) => CellValue::Number(if *b { 1.0 } else { 0.0 }),
            serde_json::Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Null),
            serde_json::Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Number(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Render integral floats without a trailing `.0` so "3" and 3.0 map to one category
pub(crate) fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// Inferred semantic kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl ColumnKind {
    pub fn dtype_name(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "float64",
            ColumnKind::Categorical => "object",
        }
    }
}

/// A named column of cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        Self { name: name.into(), values }
    }

    pub fn numeric(name: impl Into<String>, values: &[f64]) -> Self {
        Self::new(name, values.iter().map(|&v| CellValue::Number(v)).collect())
    }

    pub fn text(name: impl Into<String>, values: &[&str]) -> Self {
        Self::new(name, values.iter().map(|v| CellValue::Text(v.to_string())).collect())
    }

    /// Numeric if every non-missing cell parses as a number
    pub fn kind(&self) -> ColumnKind {
        let all_numeric = self
            .values
            .iter()
            .filter(|v| !v.is_missing())
            .all(|v| matches!(v, CellValue::Number(_)) || v.as_f64().is_some());
        if all_numeric {
            ColumnKind::Numeric
        } else {
            ColumnKind::Categorical
        }
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    pub fn unique_count(&self) -> usize {
        self.values
            .iter()
            .filter_map(|v| v.as_category())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn first_present(&self) -> CellValue {
        self.values
            .iter()
            .find(|v| !v.is_missing())
            .cloned()
            .unwrap_or(CellValue::Null)
    }
}

/// Column summary returned by the columns endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
    pub unique_count: usize,
    pub missing_count: usize,
    pub example_value: CellValue,
}

/// Column-major table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Dataset {
    /// Build a dataset; all columns must have the same length and distinct names
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        let mut seen = HashSet::new();
        for col in &columns {
            if col.values.len() != n_rows {
                return Err(PipelineError::ShapeError {
                    expected: format!("{} rows in column '{}'", n_rows, col.name),
                    actual: format!("{} rows", col.values.len()),
                });
            }
            if !seen.insert(col.name.as_str()) {
                return Err(PipelineError::DataError(format!(
                    "Duplicate column name '{}'",
                    col.name
                )));
            }
        }
        Ok(Self { columns, n_rows })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0 || self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| PipelineError::FeatureNotFound(name.to_string()))
    }

    pub fn column_info(&self) -> Vec<ColumnInfo> {
        self.columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                dtype: c.kind().dtype_name().to_string(),
                unique_count: c.unique_count(),
                missing_count: c.missing_count(),
                example_value: c.first_present(),
            })
            .collect()
    }

    /// First `n` rows as JSON objects
    pub fn head(&self, n: usize) -> Vec<serde_json::Map<String, serde_json::Value>> {
        (0..self.n_rows.min(n))
            .map(|i| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[i].to_json()))
                    .collect()
            })
            .collect()
    }

    /// Keep only the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Dataset {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), indices.iter().map(|&i| c.values[i].clone()).collect()))
            .collect();
        Dataset { columns, n_rows: indices.len() }
    }
}
