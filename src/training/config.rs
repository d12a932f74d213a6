//! Training request configuration

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::algorithms::Algorithm;
use crate::data::Dataset;
use crate::error::{PipelineError, Result};

/// Kind of learning problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    Classification,
    Regression,
    Clustering,
}

impl ProblemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::Classification => "classification",
            ProblemType::Regression => "regression",
            ProblemType::Clustering => "clustering",
        }
    }

    /// Whether a target column is required
    pub fn is_supervised(&self) -> bool {
        !matches!(self, ProblemType::Clustering)
    }

    /// Name of the metric the leaderboard ranks by
    pub fn primary_metric(&self) -> &'static str {
        match self {
            ProblemType::Classification => "accuracy",
            ProblemType::Regression => "r2",
            ProblemType::Clustering => "silhouette",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classification" => Ok(ProblemType::Classification),
            "regression" => Ok(ProblemType::Regression),
            "clustering" => Ok(ProblemType::Clustering),
            other => Err(PipelineError::ValidationError(format!("Unknown problem type: {}", other))),
        }
    }
}

/// Immutable description of one training session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub file_id: String,
    pub target_column: Option<String>,
    /// Ordered input columns; empty means every non-target column
    pub features: Vec<String>,
    pub problem_type: ProblemType,
    pub algorithms: Vec<Algorithm>,
    /// Held-out fraction, strictly between 0 and 1
    pub test_size: f64,
    pub cv_folds: usize,
    pub random_state: u64,
}

impl TrainingConfig {
    pub fn new(file_id: impl Into<String>, problem_type: ProblemType) -> Self {
        Self {
            file_id: file_id.into(),
            target_column: None,
            features: Vec::new(),
            problem_type,
            algorithms: Vec::new(),
            test_size: 0.2,
            cv_folds: 5,
            random_state: 42,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_column = Some(target.into());
        self
    }

    pub fn with_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        self.algorithms = algorithms.into_iter().collect();
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Checks that need no data
    pub fn validate(&self) -> Result<()> {
        if self.algorithms.is_empty() {
            return Err(PipelineError::ValidationError("At least one algorithm must be selected".to_string()));
        }
        let mut seen = BTreeSet::new();
        for algo in &self.algorithms {
            if !seen.insert(*algo) {
                return Err(PipelineError::ValidationError(format!("Duplicate algorithm: {}", algo)));
            }
            if algo.problem_type() != self.problem_type {
                return Err(PipelineError::ValidationError(format!(
                    "Algorithm {} does not support {} problems",
                    algo, self.problem_type
                )));
            }
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(PipelineError::ValidationError(format!(
                "test_size must be between 0 and 1 (exclusive), got {}",
                self.test_size
            )));
        }
        if self.cv_folds < 2 {
            return Err(PipelineError::ValidationError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        match (&self.target_column, self.problem_type.is_supervised()) {
            (None, true) => {
                return Err(PipelineError::ValidationError(format!(
                    "target_column is required for {}",
                    self.problem_type
                )))
            }
            (Some(target), _) if self.features.iter().any(|f| f == target) => {
                return Err(PipelineError::ValidationError(format!(
                    "Target column '{}' cannot also be a feature",
                    target
                )))
            }
            _ => {}
        }
        Ok(())
    }

    /// Fill in default features and check every column against `data`
    pub fn resolve(mut self, data: &Dataset) -> Result<Self> {
        self.validate()?;
        // Clustering ignores any target
        if !self.problem_type.is_supervised() {
            self.target_column = None;
        }
        if let Some(target) = &self.target_column {
            if !data.has_column(target) {
                return Err(PipelineError::ValidationError(format!(
                    "Target column '{}' not found in dataset",
                    target
                )));
            }
        }
        if self.features.is_empty() {
            self.features = data
                .column_names()
                .into_iter()
                .filter(|c| Some(c) != self.target_column.as_ref())
                .collect();
        }
        if self.features.is_empty() {
            return Err(PipelineError::ValidationError("No feature columns selected".to_string()));
        }
        let mut seen = BTreeSet::new();
        for feature in &self.features {
            if !data.has_column(feature) {
                return Err(PipelineError::ValidationError(format!(
                    "Feature column '{}' not found in dataset",
                    feature
                )));
            }
            if !seen.insert(feature.as_str()) {
                return Err(PipelineError::ValidationError(format!("Duplicate feature: {}", feature)));
            }
        }
        Ok(self)
    }

    pub fn total_models(&self) -> usize {
        self.algorithms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn data() -> Dataset {
        Dataset::new(vec![
            Column::numeric("a", &[1.0, 2.0]),
            Column::text("b", &["x", "y"]),
            Column::text("label", &["p", "q"]),
        ])
        .unwrap()
    }

    fn base() -> TrainingConfig {
        TrainingConfig::new("f", ProblemType::Classification)
            .with_target("label")
            .with_algorithms([Algorithm::GaussianNB, Algorithm::LogisticRegression])
    }

    #[test]
    fn test_valid_config_defaults_features() {
        let cfg = base().resolve(&data()).unwrap();
        assert_eq!(cfg.features, vec!["a", "b"]);
    }

    #[test]
    fn test_rejections() {
        let invalid = [
            base().with_algorithms(Vec::<Algorithm>::new()),
            base().with_algorithms([Algorithm::GaussianNB, Algorithm::GaussianNB]),
            base().with_algorithms([Algorithm::Ridge]),
            base().with_test_size(0.0),
            base().with_test_size(1.0),
            base().with_cv_folds(1),
            base().with_features(["a", "label"]),
            TrainingConfig::new("f", ProblemType::Regression).with_algorithms([Algorithm::Ridge]),
        ];
        for cfg in invalid {
            assert!(matches!(cfg.validate(), Err(PipelineError::ValidationError(_))), "{:?}", cfg);
        }
    }

    #[test]
    fn test_unknown_columns_rejected() {
        assert!(base().with_features(["zzz"]).resolve(&data()).is_err());
        assert!(base().with_target("missing").resolve(&data()).is_err());
    }

    #[test]
    fn test_clustering_needs_no_target() {
        let cfg = TrainingConfig::new("f", ProblemType::Clustering)
            .with_algorithms([Algorithm::KMeans])
            .with_features(["a"]);
        assert!(cfg.resolve(&data()).is_ok());
    }

    #[test]
    fn test_problem_type_parsing() {
        assert_eq!("Regression".parse::<ProblemType>().unwrap(), ProblemType::Regression);
        assert!("ranking".parse::<ProblemType>().is_err());
    }
}
