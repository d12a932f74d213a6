//! Gradient boosted decision trees
//!
//! Squared-loss boosting for regression and softmax (one tree per class per
//! round) boosting for classification. Rows and columns can be subsampled per
//! round; the RNG is seeded so fits are reproducible.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use crate::error::{PipelineError, Result};

/// Gradient boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Row subsample ratio per round
    pub subsample: f64,
    /// Column subsample ratio per round
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: 42,
        }
    }
}

/// One boosting stage: a tree and the columns it was trained on
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stage {
    tree: DecisionTree,
    columns: Vec<usize>,
}

impl Stage {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.tree.predict(&x.select(Axis(1), &self.columns))
    }
}

/// Shared sampling and importance bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Booster {
    config: GradientBoostingConfig,
    feature_importances: Vec<f64>,
}

impl Booster {
    fn new(config: GradientBoostingConfig) -> Self {
        Self { config, feature_importances: Vec::new() }
    }

    fn sample(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        if ratio < 1.0 {
            let size = ((n as f64) * ratio).ceil().max(1.0) as usize;
            indices.shuffle(rng);
            indices.truncate(size);
            indices.sort_unstable();
        }
        indices
    }

    /// Fit one regression tree to `residuals` on a row/column subsample
    fn fit_stage(
        &mut self,
        x: &Array2<f64>,
        residuals: &Array1<f64>,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<Stage> {
        let rows = Self::sample(x.nrows(), self.config.subsample, rng);
        let columns = Self::sample(x.ncols(), self.config.colsample_bytree, rng);
        let x_sub = x.select(Axis(0), &rows).select(Axis(1), &columns);
        let y_sub = residuals.select(Axis(0), &rows);

        let mut tree = DecisionTree::new_regressor()
            .with_max_depth(self.config.max_depth)
            .with_min_samples_leaf(self.config.min_samples_leaf)
            .with_random_state(rng.gen());
        tree.fit(&x_sub, &y_sub)?;

        if let Some(imp) = tree.feature_importances() {
            for (j, &col) in columns.iter().enumerate() {
                self.feature_importances[col] += imp[j];
            }
        }
        Ok(Stage { tree, columns })
    }

    fn normalize_importances(&mut self) {
        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            self.feature_importances.iter_mut().for_each(|v| *v /= total);
        }
    }
}

/// Gradient boosting for regression (squared loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    booster: Booster,
    stages: Vec<Stage>,
    initial_prediction: f64,
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            booster: Booster::new(config),
            stages: Vec::new(),
            initial_prediction: 0.0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() || x.nrows() == 0 {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {} (non-zero)", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.booster.config.random_state);
        let lr = self.booster.config.learning_rate;

        self.initial_prediction = y.mean().unwrap_or(0.0);
        self.booster.feature_importances = vec![0.0; x.ncols()];
        self.stages.clear();
        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);

        for _ in 0..self.booster.config.n_estimators {
            let residuals = y - &predictions;
            let stage = self.booster.fit_stage(x, &residuals, &mut rng)?;
            predictions.scaled_add(lr, &stage.predict(x)?);
            self.stages.push(stage);
        }

        self.booster.normalize_importances();
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.stages.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for stage in &self.stages {
            predictions.scaled_add(self.booster.config.learning_rate, &stage.predict(x)?);
        }
        Ok(predictions)
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.booster.feature_importances
    }
}

/// Gradient boosting for classification (multinomial deviance)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    booster: Booster,
    /// rounds x classes
    stages: Vec<Vec<Stage>>,
    /// Log prior per class
    initial_scores: Vec<f64>,
    n_classes: usize,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig, n_classes: usize) -> Self {
        Self {
            booster: Booster::new(config),
            stages: Vec::new(),
            initial_scores: Vec::new(),
            n_classes: n_classes.max(2),
        }
    }

    fn softmax_rows(scores: &Array2<f64>) -> Array2<f64> {
        let mut probs = scores.clone();
        for mut row in probs.rows_mut() {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        probs
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n = x.nrows();
        if n != y.len() || n == 0 {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {} (non-zero)", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        let k = self.n_classes;
        let mut onehot = Array2::<f64>::zeros((n, k));
        for (i, &label) in y.iter().enumerate() {
            let c = label.round();
            if c < 0.0 || c as usize >= k {
                return Err(PipelineError::TrainingError(format!("Label {} outside 0..{}", label, k)));
            }
            onehot[[i, c as usize]] = 1.0;
        }

        // Smoothed log priors so absent classes stay finite
        let counts = onehot.sum_axis(Axis(0));
        self.initial_scores = counts
            .iter()
            .map(|&c| ((c + 1.0) / (n as f64 + k as f64)).ln())
            .collect();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.booster.config.random_state);
        let lr = self.booster.config.learning_rate;
        self.booster.feature_importances = vec![0.0; x.ncols()];
        self.stages.clear();

        let mut scores = Array2::<f64>::zeros((n, k));
        for c in 0..k {
            scores.column_mut(c).fill(self.initial_scores[c]);
        }

        for _ in 0..self.booster.config.n_estimators {
            let probs = Self::softmax_rows(&scores);
            let mut round = Vec::with_capacity(k);
            for c in 0..k {
                let residuals = &onehot.column(c) - &probs.column(c);
                let stage = self.booster.fit_stage(x, &residuals, &mut rng)?;
                scores.column_mut(c).scaled_add(lr, &stage.predict(x)?);
                round.push(stage);
            }
            self.stages.push(round);
        }

        self.booster.normalize_importances();
        Ok(self)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stages.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        let k = self.n_classes;
        let mut scores = Array2::<f64>::zeros((x.nrows(), k));
        for c in 0..k {
            scores.column_mut(c).fill(self.initial_scores[c]);
        }
        for round in &self.stages {
            for (c, stage) in round.iter().enumerate() {
                scores
                    .column_mut(c)
                    .scaled_add(self.booster.config.learning_rate, &stage.predict(x)?);
            }
        }
        Ok(Self::softmax_rows(&scores))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(super::linear_models::argmax_rows(&self.predict_proba(x)?))
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.booster.feature_importances
    }
}
