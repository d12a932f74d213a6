//! Algorithm catalogue
//!
//! Every trainable algorithm is a variant of [`Algorithm`]; its metadata
//! lives in [`Algorithm::spec`] and its default estimator in
//! [`Algorithm::build`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::clustering::KMeans;
use super::config::ProblemType;
use super::decision_tree::DecisionTree;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
use super::knn::{KNNClassifier, KNNRegressor};
use super::linear_models::{LassoRegression, LinearRegression, LogisticRegression};
use super::models::TrainedModel;
use super::naive_bayes::GaussianNaiveBayes;
use super::random_forest::RandomForest;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    LinearRegression,
    Ridge,
    Lasso,
    DecisionTreeRegressor,
    RandomForestRegressor,
    GradientBoostingRegressor,
    KNeighborsRegressor,
    LogisticRegression,
    KNeighborsClassifier,
    DecisionTreeClassifier,
    RandomForestClassifier,
    GradientBoostingClassifier,
    GaussianNB,
    KMeans,
}

/// Catalogue entry served by the algorithms endpoint
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmSpec {
    pub name: &'static str,
    pub problem_type: ProblemType,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// Inputs an estimator needs beyond its defaults
#[derive(Debug, Clone, Copy)]
pub struct BuildContext {
    /// Distinct labels of a classification target
    pub n_classes: usize,
    pub random_state: u64,
}

impl Algorithm {
    pub const ALL: [Algorithm; 14] = [
        Algorithm::LinearRegression,
        Algorithm::Ridge,
        Algorithm::Lasso,
        Algorithm::DecisionTreeRegressor,
        Algorithm::RandomForestRegressor,
        Algorithm::GradientBoostingRegressor,
        Algorithm::KNeighborsRegressor,
        Algorithm::LogisticRegression,
        Algorithm::KNeighborsClassifier,
        Algorithm::DecisionTreeClassifier,
        Algorithm::RandomForestClassifier,
        Algorithm::GradientBoostingClassifier,
        Algorithm::GaussianNB,
        Algorithm::KMeans,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::LinearRegression => "LinearRegression",
            Algorithm::Ridge => "Ridge",
            Algorithm::Lasso => "Lasso",
            Algorithm::DecisionTreeRegressor => "DecisionTreeRegressor",
            Algorithm::RandomForestRegressor => "RandomForestRegressor",
            Algorithm::GradientBoostingRegressor => "GradientBoostingRegressor",
            Algorithm::KNeighborsRegressor => "KNeighborsRegressor",
            Algorithm::LogisticRegression => "LogisticRegression",
            Algorithm::KNeighborsClassifier => "KNeighborsClassifier",
            Algorithm::DecisionTreeClassifier => "DecisionTreeClassifier",
            Algorithm::RandomForestClassifier => "RandomForestClassifier",
            Algorithm::GradientBoostingClassifier => "GradientBoostingClassifier",
            Algorithm::GaussianNB => "GaussianNB",
            Algorithm::KMeans => "KMeans",
        }
    }

    pub fn problem_type(&self) -> ProblemType {
        match self {
            Algorithm::LinearRegression
            | Algorithm::Ridge
            | Algorithm::Lasso
            | Algorithm::DecisionTreeRegressor
            | Algorithm::RandomForestRegressor
            | Algorithm::GradientBoostingRegressor
            | Algorithm::KNeighborsRegressor => ProblemType::Regression,
            Algorithm::LogisticRegression
            | Algorithm::KNeighborsClassifier
            | Algorithm::DecisionTreeClassifier
            | Algorithm::RandomForestClassifier
            | Algorithm::GradientBoostingClassifier
            | Algorithm::GaussianNB => ProblemType::Classification,
            Algorithm::KMeans => ProblemType::Clustering,
        }
    }

    pub fn spec(&self) -> AlgorithmSpec {
        let (description, parameters) = match self {
            Algorithm::LinearRegression => ("Ordinary least squares linear regression", json!({})),
            Algorithm::Ridge => ("Linear regression with L2 regularization", json!({"alpha": 1.0})),
            Algorithm::Lasso => ("Linear regression with L1 regularization", json!({"alpha": 1.0})),
            Algorithm::DecisionTreeRegressor => {
                ("Decision tree regressor", json!({"max_depth": 5, "min_samples_split": 2}))
            }
            Algorithm::RandomForestRegressor => {
                ("Random forest regressor", json!({"n_estimators": 50, "max_depth": 12}))
            }
            Algorithm::GradientBoostingRegressor => {
                ("Gradient boosting regressor", json!({"n_estimators": 100, "learning_rate": 0.1}))
            }
            Algorithm::KNeighborsRegressor => ("K-nearest neighbors regressor", json!({"n_neighbors": 5})),
            Algorithm::LogisticRegression => {
                ("Logistic regression classifier", json!({"C": 1.0, "max_iter": 1000}))
            }
            Algorithm::KNeighborsClassifier => ("K-nearest neighbors classifier", json!({"n_neighbors": 5})),
            Algorithm::DecisionTreeClassifier => {
                ("Decision tree classifier", json!({"max_depth": 5, "min_samples_split": 2}))
            }
            Algorithm::RandomForestClassifier => {
                ("Random forest classifier", json!({"n_estimators": 50, "max_depth": 12}))
            }
            Algorithm::GradientBoostingClassifier => {
                ("Gradient boosting classifier", json!({"n_estimators": 100, "learning_rate": 0.1}))
            }
            Algorithm::GaussianNB => ("Gaussian Naive Bayes", json!({"var_smoothing": 1e-9})),
            Algorithm::KMeans => ("K-means clustering", json!({"n_clusters": 3})),
        };
        AlgorithmSpec {
            name: self.name(),
            problem_type: self.problem_type(),
            description,
            parameters,
        }
    }

    /// Catalogue for one problem type, in declaration order
    pub fn catalogue(problem_type: ProblemType) -> Vec<AlgorithmSpec> {
        Self::ALL
            .iter()
            .filter(|a| a.problem_type() == problem_type)
            .map(|a| a.spec())
            .collect()
    }

    /// Unfitted estimator with this algorithm's default parameters
    pub fn build(&self, ctx: BuildContext) -> TrainedModel {
        let seed = ctx.random_state;
        match self {
            Algorithm::LinearRegression => TrainedModel::LinearRegression(LinearRegression::new()),
            Algorithm::Ridge => TrainedModel::LinearRegression(LinearRegression::ridge(1.0)),
            Algorithm::Lasso => TrainedModel::LassoRegression(LassoRegression::new(1.0)),
            Algorithm::DecisionTreeRegressor => TrainedModel::DecisionTreeRegressor(
                DecisionTree::new_regressor()
                    .with_max_depth(5)
                    .with_min_samples_split(2)
                    .with_random_state(seed),
            ),
            Algorithm::RandomForestRegressor => TrainedModel::RandomForestRegressor(
                RandomForest::new_regressor(50).with_max_depth(12).with_random_state(seed),
            ),
            Algorithm::GradientBoostingRegressor => TrainedModel::GradientBoostingRegressor(
                GradientBoostingRegressor::new(GradientBoostingConfig {
                    random_state: seed,
                    ..Default::default()
                }),
            ),
            Algorithm::KNeighborsRegressor => TrainedModel::KNNRegressor(KNNRegressor::with_k(5)),
            Algorithm::LogisticRegression => TrainedModel::LogisticRegression(
                LogisticRegression::new(ctx.n_classes).with_c(1.0).with_max_iter(1000),
            ),
            Algorithm::KNeighborsClassifier => {
                TrainedModel::KNNClassifier(KNNClassifier::with_k(5, ctx.n_classes))
            }
            Algorithm::DecisionTreeClassifier => TrainedModel::DecisionTreeClassifier(
                DecisionTree::new_classifier(ctx.n_classes)
                    .with_max_depth(5)
                    .with_min_samples_split(2)
                    .with_random_state(seed),
            ),
            Algorithm::RandomForestClassifier => TrainedModel::RandomForestClassifier(
                RandomForest::new_classifier(50, ctx.n_classes)
                    .with_max_depth(12)
                    .with_random_state(seed),
            ),
            Algorithm::GradientBoostingClassifier => TrainedModel::GradientBoostingClassifier(
                GradientBoostingClassifier::new(
                    GradientBoostingConfig {
                        random_state: seed,
                        ..Default::default()
                    },
                    ctx.n_classes,
                ),
            ),
            Algorithm::GaussianNB => TrainedModel::GaussianNaiveBayes(
                GaussianNaiveBayes::new(ctx.n_classes).with_var_smoothing(1e-9),
            ),
            Algorithm::KMeans => TrainedModel::KMeans(KMeans::new(3).with_random_state(seed)),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|a| a.name() == s.trim())
            .copied()
            .ok_or_else(|| PipelineError::ValidationError(format!("Unknown algorithm: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_names() {
        for algo in Algorithm::ALL {
            assert_eq!(algo.name().parse::<Algorithm>().unwrap(), algo);
        }
        assert!(matches!(
            "SVC".parse::<Algorithm>(),
            Err(PipelineError::ValidationError(_))
        ));
    }

    #[test]
    fn test_catalogue_partitions_by_problem_type() {
        let reg = Algorithm::catalogue(ProblemType::Regression);
        let clf = Algorithm::catalogue(ProblemType::Classification);
        let clu = Algorithm::catalogue(ProblemType::Clustering);
        assert_eq!(reg.len() + clf.len() + clu.len(), Algorithm::ALL.len());
        assert_eq!(clu[0].name, "KMeans");
        assert_eq!(reg[1].parameters["alpha"], 1.0);
    }

    #[test]
    fn test_catalogue_parameters_match_built_models() {
        let clf = Algorithm::catalogue(ProblemType::Classification);
        let tree = clf.iter().find(|a| a.name == "DecisionTreeClassifier").unwrap();
        assert_eq!(tree.parameters["min_samples_split"], 2);
        let nb = clf.iter().find(|a| a.name == "GaussianNB").unwrap();
        assert_eq!(nb.parameters["var_smoothing"], 1e-9);
    }

    #[test]
    fn test_serde_uses_catalogue_names() {
        let json = serde_json::to_string(&Algorithm::GaussianNB).unwrap();
        assert_eq!(json, "\"GaussianNB\"");
    }
}
