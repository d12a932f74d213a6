//! Explanations for finalized sessions
//!
//! Every method reads the stored artifact and the session's evaluation set;
//! nothing is retrained or re-split.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::importance::PermutationImportance;
use super::lime::{LimeExplainer, LimeExplanation};
use super::local_explanations::LocalExplainer;
use crate::artifacts::{ArtifactStore, EvaluationSet, ModelArtifact};
use crate::config::ExplainConfig;
use crate::error::{PipelineError, Result};
use crate::inference::resolve_artifact;
use crate::session::SessionStore;
use crate::training::metrics::{accuracy, r2_score};
use crate::training::{ProblemType, TrainedModel};

/// Global importance method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceMethod {
    /// Average of every available method, each normalized to unit L1 mass
    #[default]
    Ensemble,
    Shap,
    Model,
    Permutation,
}

impl ImportanceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportanceMethod::Ensemble => "ensemble",
            ImportanceMethod::Shap => "shap",
            ImportanceMethod::Model => "model",
            ImportanceMethod::Permutation => "permutation",
        }
    }
}

impl fmt::Display for ImportanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportanceMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "ensemble" => Ok(ImportanceMethod::Ensemble),
            "shap" => Ok(ImportanceMethod::Shap),
            "model" | "native" => Ok(ImportanceMethod::Model),
            "permutation" => Ok(ImportanceMethod::Permutation),
            other => Err(PipelineError::ValidationError(format!(
                "Unknown importance method: {} (expected ensemble, shap, model or permutation)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalImportance {
    pub method: ImportanceMethod,
    pub model_name: String,
    /// Transformed feature name → score
    pub importance: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocalExplanationReport {
    pub model_name: String,
    /// Row of the evaluation set actually explained
    pub sample_index: usize,
    /// Decoded model prediction for the row
    pub prediction: serde_json::Value,
    pub base_value: f64,
    pub shap_contributions: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lime_explanation: Option<LimeExplanation>,
}

/// Scalar model output that explanations attribute: the probability of
/// `class` when the model has probabilities, the raw prediction otherwise
fn output_fn(
    model: &TrainedModel,
    class: Option<usize>,
) -> impl Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync + '_ {
    let class = class.filter(|_| model.supports_proba());
    move |x: &Array2<f64>| match class {
        Some(c) => match model.predict_proba(x)? {
            Some(proba) if c < proba.ncols() => Ok(proba.column(c).to_owned()),
            _ => model.predict(x),
        },
        None => model.predict(x),
    }
}

fn predicted_class(model: &TrainedModel, problem_type: ProblemType, row: &Array2<f64>) -> Result<Option<usize>> {
    if problem_type != ProblemType::Classification {
        return Ok(None);
    }
    Ok(model.predict(row)?.get(0).map(|v| v.round().max(0.0) as usize))
}

fn normalize_l1(scores: &BTreeMap<String, f64>) -> Option<BTreeMap<String, f64>> {
    let mass: f64 = scores.values().map(|v| v.abs()).sum();
    (mass > 0.0 && mass.is_finite())
        .then(|| scores.iter().map(|(k, v)| (k.clone(), v / mass)).collect())
}

/// Computes importances and local explanations from stored artifacts
#[derive(Clone)]
pub struct ExplainabilityService {
    sessions: Arc<SessionStore>,
    artifacts: Arc<dyn ArtifactStore>,
    config: ExplainConfig,
}

impl ExplainabilityService {
    pub fn new(sessions: Arc<SessionStore>, artifacts: Arc<dyn ArtifactStore>, config: ExplainConfig) -> Self {
        Self {
            sessions,
            artifacts,
            config,
        }
    }

    fn load(&self, session_id: &str, model_name: Option<&str>) -> Result<(ProblemType, Arc<ModelArtifact>, Arc<EvaluationSet>)> {
        let (session, artifact) =
            resolve_artifact(&self.sessions, self.artifacts.as_ref(), session_id, model_name)?;
        let evaluation = self.artifacts.get_evaluation(session_id)?;
        if evaluation.n_samples() == 0 {
            return Err(PipelineError::ExplainError(format!(
                "Session {} has no evaluation rows",
                session_id
            )));
        }
        Ok((session.problem_type(), artifact, evaluation))
    }

    pub fn global_importance(
        &self,
        session_id: &str,
        method: ImportanceMethod,
        model_name: Option<&str>,
    ) -> Result<GlobalImportance> {
        let (problem_type, artifact, evaluation) = self.load(session_id, model_name)?;
        let names = artifact.transformer.feature_names();

        let importance = match method {
            ImportanceMethod::Shap => self.shap_importance(&artifact, problem_type, &evaluation, &names)?,
            ImportanceMethod::Model => Self::model_importance(&artifact.model, &names),
            ImportanceMethod::Permutation => {
                self.permutation_importance(&artifact.model, problem_type, &evaluation, &names)?
            }
            ImportanceMethod::Ensemble => {
                let parts = [
                    self.shap_importance(&artifact, problem_type, &evaluation, &names)?,
                    self.permutation_importance(&artifact.model, problem_type, &evaluation, &names)?,
                    Self::model_importance(&artifact.model, &names),
                ];
                let normalized: Vec<BTreeMap<String, f64>> = parts.iter().filter_map(normalize_l1).collect();
                let n = normalized.len().max(1) as f64;
                names
                    .iter()
                    .map(|name| {
                        let total: f64 = normalized.iter().filter_map(|m| m.get(name)).sum();
                        (name.clone(), total / n)
                    })
                    .collect()
            }
        };

        debug!(session_id = %session_id, model = %artifact.model_name, method = %method, "Global importance computed");
        Ok(GlobalImportance {
            method,
            model_name: artifact.model_name.clone(),
            importance,
        })
    }

    /// Mean |Shapley contribution| over the first evaluation rows
    fn shap_importance(
        &self,
        artifact: &ModelArtifact,
        problem_type: ProblemType,
        evaluation: &EvaluationSet,
        names: &[String],
    ) -> Result<BTreeMap<String, f64>> {
        let n_rows = evaluation.n_samples().min(self.config.shap_max_samples.max(1));
        let per_row = (0..n_rows)
            .into_par_iter()
            .map(|i| -> Result<Vec<f64>> {
                let row = evaluation.x_test.row(i);
                let class = predicted_class(&artifact.model, problem_type, &row.to_owned().insert_axis(Axis(0)))?;
                let explanation = LocalExplainer::new(output_fn(&artifact.model, class), evaluation.background.view())
                    .with_n_permutations(self.config.shap_permutations)
                    .with_seed(self.config.seed)
                    .explain(row, i)?;
                Ok(explanation
                    .contributions
                    .into_iter()
                    .map(|c| c.contribution.abs())
                    .collect::<Vec<f64>>())
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;

        let mut totals = vec![0.0; names.len()];
        for row in &per_row {
            for (t, v) in totals.iter_mut().zip(row) {
                *t += v;
            }
        }
        Ok(names
            .iter()
            .cloned()
            .zip(totals.into_iter().map(|t| t / n_rows.max(1) as f64))
            .collect())
    }

    fn model_importance(model: &TrainedModel, names: &[String]) -> BTreeMap<String, f64> {
        model
            .feature_importances()
            .map(|scores| names.iter().cloned().zip(scores).collect())
            .unwrap_or_default()
    }

    /// Mean drop of the primary score when a column is shuffled. Clustering
    /// scores agreement with the unshuffled assignment.
    fn permutation_importance(
        &self,
        model: &TrainedModel,
        problem_type: ProblemType,
        evaluation: &EvaluationSet,
        names: &[String],
    ) -> Result<BTreeMap<String, f64>> {
        let predict = |x: &Array2<f64>| model.predict(x);
        let y = match problem_type {
            ProblemType::Clustering => model.predict(&evaluation.x_test)?,
            _ => evaluation.y_test.clone(),
        };
        let runner = PermutationImportance::new(predict)
            .with_n_repeats(self.config.permutation_repeats)
            .with_seed(self.config.seed);
        let result = match problem_type {
            ProblemType::Regression => runner.compute_with_scorer(&evaluation.x_test, &y, r2_score)?,
            _ => runner.compute_with_scorer(&evaluation.x_test, &y, accuracy)?,
        };
        Ok(names.iter().cloned().zip(result.importances_mean).collect())
    }

    /// Shapley contributions and a LIME surrogate for one evaluation row.
    /// An out-of-range index explains the last row.
    pub fn local_explanation(
        &self,
        session_id: &str,
        sample_index: usize,
        model_name: Option<&str>,
    ) -> Result<LocalExplanationReport> {
        let (problem_type, artifact, evaluation) = self.load(session_id, model_name)?;
        let index = sample_index.min(evaluation.n_samples() - 1);
        let names = artifact.transformer.feature_names();
        let row = evaluation.x_test.row(index);
        let row_2d = row.to_owned().insert_axis(Axis(0));

        let raw = artifact
            .model
            .predict(&row_2d)?
            .get(0)
            .copied()
            .ok_or_else(|| PipelineError::ExplainError("Model returned no prediction".to_string()))?;
        let prediction = artifact.transformer.decode_prediction(raw)?.to_json();
        let class = predicted_class(&artifact.model, problem_type, &row_2d)?;

        let shap = LocalExplainer::new(output_fn(&artifact.model, class), evaluation.background.view())
            .with_n_permutations(self.config.shap_permutations)
            .with_seed(self.config.seed)
            .with_feature_names(&names)
            .explain(row, index)?;

        let lime = LimeExplainer::new()
            .with_n_samples(self.config.lime_samples)
            .with_top_features(self.config.lime_top_features)
            .with_seed(self.config.seed.wrapping_add(index as u64))
            .explain(output_fn(&artifact.model, class), row, evaluation.background.view(), &names);
        let lime_explanation = match lime {
            Ok(explanation) => Some(explanation),
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "LIME explanation omitted");
                None
            }
        };

        Ok(LocalExplanationReport {
            model_name: artifact.model_name.clone(),
            sample_index: index,
            prediction,
            base_value: shap.base_value,
            shap_contributions: shap
                .contributions
                .into_iter()
                .filter_map(|c| Some((c.feature_name?, c.contribution)))
                .collect(),
            lime_explanation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("".parse::<ImportanceMethod>().unwrap(), ImportanceMethod::Ensemble);
        assert_eq!("SHAP".parse::<ImportanceMethod>().unwrap(), ImportanceMethod::Shap);
        assert_eq!("permutation".parse::<ImportanceMethod>().unwrap(), ImportanceMethod::Permutation);
        assert!(matches!(
            "gain".parse::<ImportanceMethod>(),
            Err(PipelineError::ValidationError(_))
        ));
        assert_eq!(ImportanceMethod::default(), ImportanceMethod::Ensemble);
    }

    #[test]
    fn test_normalize_l1() {
        let mut scores = BTreeMap::new();
        scores.insert("a".to_string(), 3.0);
        scores.insert("b".to_string(), -1.0);
        let n = normalize_l1(&scores).unwrap();
        assert!((n["a"] - 0.75).abs() < 1e-12);
        assert!((n["b"] + 0.25).abs() < 1e-12);
        assert!(normalize_l1(&BTreeMap::new()).is_none());
    }
}
