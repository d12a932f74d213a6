//! Model training module
//!
//! Estimators (one module per family), the algorithm catalogue, evaluation
//! metrics, cross-validation and the [`ModelTrainer`] seam used by the
//! session scheduler:
//! - Linear models (OLS, Ridge, Lasso, Logistic)
//! - Decision trees, Random Forests and Gradient Boosting
//! - K-Nearest Neighbors
//! - Gaussian Naive Bayes
//! - K-Means clustering

mod algorithms;
mod config;
mod models;
mod trainer;
pub mod clustering;
pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod knn;
pub mod linear_models;
pub mod metrics;
pub mod naive_bayes;
pub mod random_forest;

pub use algorithms::{Algorithm, AlgorithmSpec, BuildContext};
pub use config::{ProblemType, TrainingConfig};
pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
pub use metrics::MetricMap;
pub use models::TrainedModel;
pub use trainer::{EstimatorTrainer, ModelTrainer, TrainingOutcome};
