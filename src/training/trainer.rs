//! Single-algorithm training: fit, score the held-out split, cross-validate

use std::time::Instant;

use ndarray::Axis;
use serde::{Deserialize, Serialize};

use super::algorithms::{Algorithm, BuildContext};
use super::config::ProblemType;
use super::cross_validation::{CVResults, CVStrategy, CrossValidator};
use super::metrics::{self, MetricMap};
use super::models::TrainedModel;
use crate::error::Result;
use crate::preprocessing::PreparedData;

/// What one successful training task produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    /// Held-out metrics (training-set metrics for clustering)
    pub metrics: MetricMap,
    /// Seconds spent in the final fit
    pub training_time: f64,
    pub cv: CVResults,
}

/// Trains one algorithm on a session's prepared data.
///
/// Implementations must be deterministic for a given `PreparedData` and
/// must not share mutable state between calls.
pub trait ModelTrainer: Send + Sync {
    fn train(&self, algorithm: Algorithm, data: &PreparedData) -> Result<TrainingOutcome>;
}

/// Default trainer backed by the crate's estimators
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatorTrainer;

impl EstimatorTrainer {
    fn build(algorithm: Algorithm, data: &PreparedData) -> TrainedModel {
        algorithm.build(BuildContext {
            n_classes: data.n_classes,
            random_state: data.random_state,
        })
    }

    /// Primary-metric score of each fold, trained on the fold's remainder
    fn cross_validate(algorithm: Algorithm, data: &PreparedData) -> Result<CVResults> {
        let strategy = match data.problem_type {
            ProblemType::Classification => CVStrategy::StratifiedKFold { n_splits: data.cv_folds },
            _ => CVStrategy::KFold { n_splits: data.cv_folds },
        };
        let splits = CrossValidator::new(strategy)
            .with_random_state(data.random_state)
            .split(data.x_train.nrows(), Some(&data.y_train))?;

        let scores = splits
            .iter()
            .map(|split| {
                let x_fit = data.x_train.select(Axis(0), &split.train_indices);
                let y_fit = data.y_train.select(Axis(0), &split.train_indices);
                let x_val = data.x_train.select(Axis(0), &split.test_indices);
                let y_val = data.y_train.select(Axis(0), &split.test_indices);

                let mut model = Self::build(algorithm, data);
                model.fit(&x_fit, &y_fit)?;
                let pred = model.predict(&x_val)?;
                Ok(match data.problem_type {
                    ProblemType::Classification => metrics::accuracy(&y_val, &pred),
                    _ => metrics::r2_score(&y_val, &pred),
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(CVResults::from_scores(scores))
    }
}

impl ModelTrainer for EstimatorTrainer {
    fn train(&self, algorithm: Algorithm, data: &PreparedData) -> Result<TrainingOutcome> {
        let mut model = Self::build(algorithm, data);
        let start = Instant::now();
        model.fit(&data.x_train, &data.y_train)?;
        let training_time = start.elapsed().as_secs_f64();

        let (metrics, cv) = match data.problem_type {
            ProblemType::Classification => {
                let pred = model.predict(&data.x_test)?;
                (
                    metrics::classification_metrics(&data.y_test, &pred),
                    Self::cross_validate(algorithm, data)?,
                )
            }
            ProblemType::Regression => {
                let pred = model.predict(&data.x_test)?;
                (
                    metrics::regression_metrics(&data.y_test, &pred),
                    Self::cross_validate(algorithm, data)?,
                )
            }
            ProblemType::Clustering => {
                let labels = model.predict(&data.x_train)?;
                let metrics = metrics::clustering_metrics(&data.x_train, &labels, model.inertia());
                let silhouette = metrics.get("silhouette").copied().unwrap_or(0.0);
                (metrics, CVResults::from_scores(vec![silhouette]))
            }
        };

        Ok(TrainingOutcome { model, metrics, training_time, cv })
    }
}
