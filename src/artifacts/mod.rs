//! Artifact registry
//!
//! Fitted estimators and the session transformer are persisted per
//! (session, model name). Artifacts are written once and read many times;
//! only deleting the whole session removes them. Each session also stores
//! one [`EvaluationSet`] so explanations never re-split or retrain.

mod fs;
mod memory;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::{ArtifactBackend, Settings};
use crate::error::{PipelineError, Result};
use crate::preprocessing::{FeatureTransformer, SchemaField};
use crate::training::{Algorithm, ProblemType, TrainedModel};

/// Lightweight pointer stored in session results instead of the estimator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub session_id: String,
    pub model_name: String,
}

/// Descriptive fields shipped with every downloaded model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub problem_type: ProblemType,
    pub target_column: Option<String>,
    pub training_date: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub input_schema: Vec<SchemaField>,
    /// Class id → label, classification only
    pub label_mapping: Option<BTreeMap<usize, String>>,
}

/// Fitted estimator plus the session's fitted transformer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub session_id: String,
    pub model_name: String,
    pub algorithm: Algorithm,
    pub model: TrainedModel,
    pub transformer: Arc<FeatureTransformer>,
    pub metadata: ArtifactMetadata,
}

impl ModelArtifact {
    pub fn new(
        session_id: impl Into<String>,
        algorithm: Algorithm,
        problem_type: ProblemType,
        model: TrainedModel,
        transformer: Arc<FeatureTransformer>,
    ) -> Self {
        let label_mapping = transformer
            .classes()
            .map(|classes| classes.iter().cloned().enumerate().collect());
        let metadata = ArtifactMetadata {
            problem_type,
            target_column: transformer.target_column().map(str::to_string),
            training_date: Utc::now(),
            feature_names: transformer.feature_names(),
            input_schema: transformer.input_schema().to_vec(),
            label_mapping,
        };
        Self {
            session_id: session_id.into(),
            model_name: algorithm.name().to_string(),
            algorithm,
            model,
            transformer,
            metadata,
        }
    }

    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef {
            session_id: self.session_id.clone(),
            model_name: self.model_name.clone(),
        }
    }

    /// JSON package served by the download endpoint
    pub fn to_package(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Held-out rows (already transformed) plus a background sample of training rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSet {
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
    pub background: Array2<f64>,
}

impl EvaluationSet {
    pub fn n_samples(&self) -> usize {
        self.x_test.nrows()
    }
}

/// Storage for model artifacts and evaluation sets
pub trait ArtifactStore: Send + Sync {
    /// Store an artifact; fails with `Conflict` if the key already exists
    fn put(&self, artifact: ModelArtifact) -> Result<ArtifactRef>;

    fn get(&self, session_id: &str, model_name: &str) -> Result<Arc<ModelArtifact>>;

    /// Model names stored for a session, sorted
    fn list(&self, session_id: &str) -> Vec<String>;

    fn put_evaluation(&self, session_id: &str, evaluation: EvaluationSet) -> Result<()>;

    fn get_evaluation(&self, session_id: &str) -> Result<Arc<EvaluationSet>>;

    /// Remove everything stored for a session. Deleting an unknown session is a no-op.
    fn delete_session(&self, session_id: &str) -> Result<()>;
}

/// Build the backend selected in `settings`
pub fn from_settings(settings: &Settings) -> Result<Arc<dyn ArtifactStore>> {
    Ok(match settings.artifact_backend {
        ArtifactBackend::Memory => Arc::new(MemoryArtifactStore::new()),
        ArtifactBackend::Fs => Arc::new(FsArtifactStore::new(&settings.model_dir)?),
    })
}

fn artifact_key(session_id: &str, model_name: &str) -> String {
    format!("{}/{}", session_id, model_name)
}

fn conflict(session_id: &str, model_name: &str) -> PipelineError {
    PipelineError::Conflict(format!("Artifact {} already exists", artifact_key(session_id, model_name)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::{Column, Dataset};
    use crate::preprocessing::TargetEncoding;
    use crate::training::linear_models::LinearRegression;

    pub(crate) fn sample_artifact(session_id: &str) -> ModelArtifact {
        let data = Dataset::new(vec![Column::numeric("x", &[1.0, 2.0, 3.0])]).unwrap();
        let transformer = FeatureTransformer::fit(
            &data,
            &[("x".to_string(), crate::data::ColumnKind::Numeric)],
            None,
            TargetEncoding::Numeric,
        )
        .unwrap();
        let x = transformer.transform(&data).unwrap();
        let mut model = TrainedModel::LinearRegression(LinearRegression::new());
        model.fit(&x, &Array1::from_vec(vec![2.0, 4.0, 6.0])).unwrap();
        ModelArtifact::new(
            session_id,
            Algorithm::LinearRegression,
            ProblemType::Regression,
            model,
            Arc::new(transformer),
        )
    }

    #[test]
    fn test_memory_store_is_write_once() {
        let store = MemoryArtifactStore::new();
        let reference = store.put(sample_artifact("s1")).unwrap();
        assert_eq!(reference.model_name, "LinearRegression");
        assert!(matches!(store.put(sample_artifact("s1")), Err(PipelineError::Conflict(_))));
        assert_eq!(store.list("s1"), vec!["LinearRegression"]);
        assert!(store.list("other").is_empty());
    }

    #[test]
    fn test_memory_delete_cascades_and_is_idempotent() {
        let store = MemoryArtifactStore::new();
        store.put(sample_artifact("s1")).unwrap();
        store.put(sample_artifact("s2")).unwrap();
        store.delete_session("s1").unwrap();
        store.delete_session("s1").unwrap();
        assert!(store.get("s1", "LinearRegression").is_err());
        assert!(store.get("s2", "LinearRegression").is_ok());
    }

    #[test]
    fn test_package_carries_metadata() {
        let package = sample_artifact("s1").to_package().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&package).unwrap();
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["metadata"]["feature_names"][0], "x");
        assert_eq!(value["metadata"]["problem_type"], "regression");
    }
}
