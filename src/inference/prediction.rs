//! Single-record prediction

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::resolve_artifact;
use crate::artifacts::ArtifactStore;
use crate::error::{PipelineError, Result};
use crate::session::SessionStore;
use crate::training::ProblemType;

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionRequest {
    pub session_id: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub model_name: String,
    /// Decoded label, regression value or cluster index
    pub prediction: serde_json::Value,
    /// Per-class probabilities keyed by label, classification only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<BTreeMap<String, f64>>,
    /// Expected columns that were absent, null or blank
    pub missing_inputs: Vec<String>,
}

/// Serves predictions from stored artifacts
#[derive(Clone)]
pub struct PredictionService {
    sessions: Arc<SessionStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl PredictionService {
    pub fn new(sessions: Arc<SessionStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { sessions, artifacts }
    }

    pub fn predict(
        &self,
        session_id: &str,
        model_name: Option<&str>,
        inputs: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<PredictionResponse> {
        let (session, artifact) =
            resolve_artifact(&self.sessions, self.artifacts.as_ref(), session_id, model_name)?;
        let transformer = &artifact.transformer;
        let (x, missing_inputs) = transformer.transform_record(inputs);

        let raw = artifact
            .model
            .predict(&x)?
            .get(0)
            .copied()
            .ok_or_else(|| PipelineError::InferenceError("Model returned no prediction".to_string()))?;
        let prediction = transformer.decode_prediction(raw)?.to_json();

        let probabilities = match (session.problem_type(), transformer.classes()) {
            (ProblemType::Classification, Some(classes)) => artifact
                .model
                .predict_proba(&x)?
                .map(|proba| {
                    classes
                        .iter()
                        .cloned()
                        .zip(proba.row(0).iter().copied())
                        .collect::<BTreeMap<String, f64>>()
                }),
            _ => None,
        };

        debug!(
            session_id = %session_id,
            model = %artifact.model_name,
            missing = missing_inputs.len(),
            "Prediction served"
        );
        Ok(PredictionResponse {
            model_name: artifact.model_name.clone(),
            prediction,
            probabilities,
            missing_inputs,
        })
    }

    pub fn handle(&self, request: &PredictionRequest) -> Result<PredictionResponse> {
        self.predict(&request.session_id, request.model_name.as_deref(), &request.inputs)
    }
}
