//! CSV ingestion and the uploaded-dataset store

use super::{CellValue, Column, Dataset};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Load a CSV file from disk
pub fn load_csv(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| PipelineError::DataError(format!("{}: {}", path.display(), e)))?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .into_reader_with_file_handle(file)
        .finish()?;

    dataset_from_frame(&df)
}

/// Parse CSV content held in memory
pub fn parse_csv_bytes(bytes: &[u8]) -> Result<Dataset> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;

    dataset_from_frame(&df)
}

/// Convert a polars frame into a [`Dataset`]
pub fn dataset_from_frame(df: &DataFrame) -> Result<Dataset> {
    let columns = df
        .get_columns()
        .iter()
        .map(|col| {
            let series = col.as_materialized_series();
            let values: Vec<CellValue> = match series.dtype() {
                DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
                | DataType::Float32
                | DataType::Float64 => series
                    .cast(&DataType::Float64)?
                    .f64()?
                    .into_iter()
                    .map(|v| v.map(CellValue::Number).unwrap_or(CellValue::Null))
                    .collect(),
                DataType::Boolean => series
                    .bool()?
                    .into_iter()
                    .map(|v| match v {
                        Some(b) => CellValue::Number(if b { 1.0 } else { 0.0 }),
                        None => CellValue::Null,
                    })
                    .collect(),
                _ => series
                    .cast(&DataType::String)?
                    .str()?
                    .into_iter()
                    .map(|v| match v {
                        Some(s) if !s.trim().is_empty() => CellValue::Text(s.to_string()),
                        _ => CellValue::Null,
                    })
                    .collect(),
            };
            Ok(Column::new(col.name().to_string(), values))
        })
        .collect::<Result<Vec<Column>>>()?;

    Dataset::new(columns)
}

/// An uploaded dataset and where it came from
#[derive(Debug, Clone, Serialize)]
pub struct StoredDataset {
    pub file_id: String,
    pub filename: String,
    pub path: Option<PathBuf>,
    pub rows: usize,
    pub columns: usize,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip)]
    pub data: Arc<Dataset>,
}

/// Uploaded datasets keyed by file id
#[derive(Default)]
pub struct DatasetStore {
    datasets: RwLock<HashMap<String, StoredDataset>>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist raw CSV bytes under `dir` and register the parsed dataset
    pub fn save_upload(&self, dir: &Path, filename: &str, bytes: &[u8]) -> Result<StoredDataset> {
        let dataset = parse_csv_bytes(bytes)?;
        if dataset.is_empty() {
            return Err(PipelineError::ValidationError("Uploaded file contains no data".to_string()));
        }

        let file_id = uuid::Uuid::new_v4().to_string();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.csv", file_id));
        std::fs::write(&path, bytes)?;

        info!(file_id = %file_id, filename = %filename, rows = dataset.n_rows(), "Dataset uploaded");
        Ok(self.insert(file_id, filename, Some(path), dataset))
    }

    /// Register an already-parsed dataset
    pub fn register(&self, filename: &str, dataset: Dataset) -> StoredDataset {
        let file_id = uuid::Uuid::new_v4().to_string();
        self.insert(file_id, filename, None, dataset)
    }

    fn insert(&self, file_id: String, filename: &str, path: Option<PathBuf>, dataset: Dataset) -> StoredDataset {
        let stored = StoredDataset {
            file_id: file_id.clone(),
            filename: filename.to_string(),
            path,
            rows: dataset.n_rows(),
            columns: dataset.n_cols(),
            uploaded_at: Utc::now(),
            data: Arc::new(dataset),
        };
        self.datasets.write().insert(file_id, stored.clone());
        stored
    }

    pub fn get(&self, file_id: &str) -> Result<Arc<Dataset>> {
        self.datasets
            .read()
            .get(file_id)
            .map(|d| d.data.clone())
            .ok_or_else(|| PipelineError::dataset_not_found(file_id))
    }

    pub fn info(&self, file_id: &str) -> Result<StoredDataset> {
        self.datasets
            .read()
            .get(file_id)
            .cloned()
            .ok_or_else(|| PipelineError::dataset_not_found(file_id))
    }

    /// All datasets, newest first
    pub fn list(&self) -> Vec<StoredDataset> {
        let mut all: Vec<StoredDataset> = self.datasets.read().values().cloned().collect();
        all.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "age,city,income\n25,Paris,1000.5\n,Rome,2000\n40,,3000\n";

    #[test]
    fn test_parse_csv_bytes() {
        let ds = parse_csv_bytes(CSV.as_bytes()).unwrap();
        assert_eq!(ds.n_rows(), 3);
        assert_eq!(ds.n_cols(), 3);
        assert_eq!(ds.column("age").unwrap().values[1], CellValue::Null);
        assert_eq!(ds.column("city").unwrap().values[0], CellValue::Text("Paris".into()));
        assert_eq!(ds.column("city").unwrap().missing_count(), 1);
        assert_eq!(ds.column("income").unwrap().values[1], CellValue::Number(2000.0));
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DatasetStore::new();
        let stored = store.save_upload(dir.path(), "people.csv", CSV.as_bytes()).unwrap();

        assert!(stored.path.as_ref().unwrap().exists());
        assert_eq!(store.get(&stored.file_id).unwrap().n_rows(), 3);
        assert_eq!(store.list().len(), 1);
        assert!(matches!(store.get("missing"), Err(PipelineError::NotFound { .. })));
    }

    #[test]
    fn test_load_csv_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        std::fs::write(&path, CSV).unwrap();
        let ds = load_csv(&path).unwrap();
        assert_eq!(ds.column_names(), vec!["age", "city", "income"]);
    }
}
