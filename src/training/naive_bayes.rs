//! Gaussian Naive Bayes

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{PipelineError, Result};

/// Per-class sufficient statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassStats {
    log_prior: f64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

/// Gaussian Naive Bayes over encoded labels `0..n_classes`.
///
/// Classes absent from the training data keep a zero probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    n_classes: usize,
    /// Indexed by class id; `None` when the class had no training rows
    stats: Vec<Option<ClassStats>>,
    /// Fraction of the largest feature variance added to every variance
    var_smoothing: f64,
}

impl GaussianNaiveBayes {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes: n_classes.max(1),
            stats: Vec::new(),
            var_smoothing: 1e-9,
        }
    }

    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples != y.len() || n_samples == 0 {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {} (non-zero)", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }

        // Welford accumulators per class
        let mut counts = vec![0usize; self.n_classes];
        let mut means = vec![vec![0.0; n_features]; self.n_classes];
        let mut m2 = vec![vec![0.0; n_features]; self.n_classes];
        for (row, &label) in x.rows().into_iter().zip(y.iter()) {
            let c = label.round();
            if c < 0.0 || c as usize >= self.n_classes {
                return Err(PipelineError::TrainingError(format!(
                    "Label {} outside 0..{}",
                    label, self.n_classes
                )));
            }
            let c = c as usize;
            counts[c] += 1;
            let n = counts[c] as f64;
            for (j, &val) in row.iter().enumerate() {
                let delta = val - means[c][j];
                means[c][j] += delta / n;
                m2[c][j] += delta * (val - means[c][j]);
            }
        }

        let max_var = x
            .var_axis(ndarray::Axis(0), 0.0)
            .iter()
            .cloned()
            .fold(0.0, f64::max);
        let epsilon = (self.var_smoothing * max_var).max(1e-12);

        self.stats = (0..self.n_classes)
            .map(|c| {
                (counts[c] > 0).then(|| ClassStats {
                    log_prior: (counts[c] as f64 / n_samples as f64).ln(),
                    means: means[c].clone(),
                    variances: m2[c].iter().map(|&v| v / counts[c] as f64 + epsilon).collect(),
                })
            })
            .collect();
        Ok(self)
    }

    fn joint_log_likelihood(stats: &ClassStats, row: ndarray::ArrayView1<f64>) -> f64 {
        let mut ll = stats.log_prior;
        for ((&v, &mean), &var) in row.iter().zip(&stats.means).zip(&stats.variances) {
            ll -= 0.5 * (2.0 * PI * var).ln() + (v - mean).powi(2) / (2.0 * var);
        }
        ll
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stats.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        let mut proba = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            let scores: Vec<Option<f64>> = self
                .stats
                .iter()
                .map(|s| s.as_ref().map(|s| Self::joint_log_likelihood(s, row)))
                .collect();
            // log-sum-exp over present classes
            let max = scores.iter().flatten().cloned().fold(f64::NEG_INFINITY, f64::max);
            let total: f64 = scores.iter().flatten().map(|&s| (s - max).exp()).sum();
            for (c, score) in scores.iter().enumerate() {
                if let Some(s) = score {
                    proba[[i, c]] = (s - max).exp() / total;
                }
            }
        }
        Ok(proba)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(super::linear_models::argmax_rows(&self.predict_proba(x)?))
    }
}
