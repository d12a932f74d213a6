//! Closed set of estimators a session can train

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::clustering::KMeans;
use super::decision_tree::DecisionTree;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingRegressor};
use super::knn::{KNNClassifier, KNNRegressor};
use super::linear_models::{LassoRegression, LinearRegression, LogisticRegression};
use super::naive_bayes::GaussianNaiveBayes;
use super::random_forest::RandomForest;
use crate::error::Result;

/// An estimator, unfitted when built by [`Algorithm::build`](super::Algorithm::build)
/// and fitted after [`TrainedModel::fit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model")]
pub enum TrainedModel {
    /// Ordinary least squares and ridge
    LinearRegression(LinearRegression),
    LassoRegression(LassoRegression),
    LogisticRegression(LogisticRegression),
    DecisionTreeClassifier(DecisionTree),
    DecisionTreeRegressor(DecisionTree),
    RandomForestClassifier(RandomForest),
    RandomForestRegressor(RandomForest),
    GradientBoostingClassifier(GradientBoostingClassifier),
    GradientBoostingRegressor(GradientBoostingRegressor),
    KNNClassifier(KNNClassifier),
    KNNRegressor(KNNRegressor),
    GaussianNaiveBayes(GaussianNaiveBayes),
    KMeans(KMeans),
}

impl TrainedModel {
    /// Fit on encoded targets; clustering models ignore `y`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            TrainedModel::LinearRegression(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::LassoRegression(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::LogisticRegression(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::DecisionTreeClassifier(m) | TrainedModel::DecisionTreeRegressor(m) => {
                m.fit(x, y).map(|_| ())
            }
            TrainedModel::RandomForestClassifier(m) | TrainedModel::RandomForestRegressor(m) => {
                m.fit(x, y).map(|_| ())
            }
            TrainedModel::GradientBoostingClassifier(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::GradientBoostingRegressor(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::KNNClassifier(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::KNNRegressor(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::GaussianNaiveBayes(m) => m.fit(x, y).map(|_| ()),
            TrainedModel::KMeans(m) => m.fit(x).map(|_| ()),
        }
    }

    /// Encoded class ids, regression values or cluster indices
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            TrainedModel::LinearRegression(m) => m.predict(x),
            TrainedModel::LassoRegression(m) => m.predict(x),
            TrainedModel::LogisticRegression(m) => m.predict(x),
            TrainedModel::DecisionTreeClassifier(m) | TrainedModel::DecisionTreeRegressor(m) => m.predict(x),
            TrainedModel::RandomForestClassifier(m) | TrainedModel::RandomForestRegressor(m) => m.predict(x),
            TrainedModel::GradientBoostingClassifier(m) => m.predict(x),
            TrainedModel::GradientBoostingRegressor(m) => m.predict(x),
            TrainedModel::KNNClassifier(m) => m.predict(x),
            TrainedModel::KNNRegressor(m) => m.predict(x),
            TrainedModel::GaussianNaiveBayes(m) => m.predict(x),
            TrainedModel::KMeans(m) => m.predict(x),
        }
    }

    /// Class probabilities (rows x n_classes), `None` for models without them
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        let proba = match self {
            TrainedModel::LogisticRegression(m) => m.predict_proba(x)?,
            TrainedModel::DecisionTreeClassifier(m) => m.predict_proba(x)?,
            TrainedModel::RandomForestClassifier(m) => m.predict_proba(x)?,
            TrainedModel::GradientBoostingClassifier(m) => m.predict_proba(x)?,
            TrainedModel::KNNClassifier(m) => m.predict_proba(x)?,
            TrainedModel::GaussianNaiveBayes(m) => m.predict_proba(x)?,
            _ => return Ok(None),
        };
        Ok(Some(proba))
    }

    pub fn supports_proba(&self) -> bool {
        matches!(
            self,
            TrainedModel::LogisticRegression(_)
                | TrainedModel::DecisionTreeClassifier(_)
                | TrainedModel::RandomForestClassifier(_)
                | TrainedModel::GradientBoostingClassifier(_)
                | TrainedModel::KNNClassifier(_)
                | TrainedModel::GaussianNaiveBayes(_)
        )
    }

    /// Native importances: impurity gain for trees, |coefficient| for
    /// linear models. `None` when the model has neither.
    pub fn feature_importances(&self) -> Option<Vec<f64>> {
        match self {
            TrainedModel::LinearRegression(m) => m.coefficients().map(|c| c.mapv(f64::abs).to_vec()),
            TrainedModel::LassoRegression(m) => m.coefficients().map(|c| c.mapv(f64::abs).to_vec()),
            TrainedModel::LogisticRegression(m) => m.coefficient_magnitudes().map(|c| c.to_vec()),
            TrainedModel::DecisionTreeClassifier(m) | TrainedModel::DecisionTreeRegressor(m) => {
                m.feature_importances().map(|i| i.to_vec())
            }
            TrainedModel::RandomForestClassifier(m) | TrainedModel::RandomForestRegressor(m) => {
                m.feature_importances().map(|i| i.to_vec())
            }
            TrainedModel::GradientBoostingClassifier(m) => Some(m.feature_importances().to_vec()),
            TrainedModel::GradientBoostingRegressor(m) => Some(m.feature_importances().to_vec()),
            TrainedModel::KNNClassifier(_)
            | TrainedModel::KNNRegressor(_)
            | TrainedModel::GaussianNaiveBayes(_) => None,
            TrainedModel::KMeans(_) => None,
        }
    }

    /// Training-set inertia for clustering models
    pub fn inertia(&self) -> Option<f64> {
        match self {
            TrainedModel::KMeans(m) => m.inertia(),
            _ => None,
        }
    }
}
