//! Permutation feature importance

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Result of a permutation importance run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceResult {
    /// Mean drop of the score per feature
    pub importances_mean: Vec<f64>,
    pub importances_std: Vec<f64>,
    pub baseline_score: f64,
}

/// Shuffles one column at a time and measures how much a higher-is-better
/// score drops
pub struct PermutationImportance<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
{
    predict_fn: F,
    n_repeats: usize,
    seed: u64,
}

impl<F> PermutationImportance<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
{
    pub fn new(predict_fn: F) -> Self {
        Self {
            predict_fn,
            n_repeats: 5,
            seed: 42,
        }
    }

    pub fn with_n_repeats(mut self, n_repeats: usize) -> Self {
        self.n_repeats = n_repeats.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn compute_with_scorer<S>(&self, x: &Array2<f64>, y: &Array1<f64>, scorer: S) -> Result<ImportanceResult>
    where
        S: Fn(&Array1<f64>, &Array1<f64>) -> f64,
    {
        let n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let baseline_score = scorer(y, &(self.predict_fn)(x)?);

        let mut drops: Vec<Vec<f64>> = vec![Vec::with_capacity(self.n_repeats); n_features];
        let mut permuted = x.clone();
        for _ in 0..self.n_repeats {
            for feature in 0..n_features {
                let mut column: Vec<f64> = x.column(feature).to_vec();
                column.shuffle(&mut rng);
                permuted.column_mut(feature).assign(&Array1::from_vec(column));

                let score = scorer(y, &(self.predict_fn)(&permuted)?);
                drops[feature].push(baseline_score - score);

                permuted.column_mut(feature).assign(&x.column(feature));
            }
        }

        let importances_mean: Vec<f64> = drops
            .iter()
            .map(|d| d.iter().sum::<f64>() / d.len().max(1) as f64)
            .collect();
        let importances_std = drops
            .iter()
            .zip(&importances_mean)
            .map(|(d, mean)| {
                (d.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / d.len().max(1) as f64).sqrt()
            })
            .collect();

        Ok(ImportanceResult {
            importances_mean,
            importances_std,
            baseline_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::metrics::r2_score;

    #[test]
    fn test_irrelevant_feature_scores_zero() {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| if j == 0 { i as f64 } else { ((i * 7) % 5) as f64 });
        let y: Array1<f64> = x.column(0).mapv(|v| 2.0 * v);
        let predict = |x: &Array2<f64>| -> Result<Array1<f64>> { Ok(x.column(0).mapv(|v| 2.0 * v)) };

        let result = PermutationImportance::new(predict)
            .with_n_repeats(3)
            .with_seed(1)
            .compute_with_scorer(&x, &y, r2_score)
            .unwrap();

        assert!((result.baseline_score - 1.0).abs() < 1e-12);
        assert!(result.importances_mean[0] > 0.5);
        assert_eq!(result.importances_mean[1], 0.0);
        assert_eq!(result.importances_std[1], 0.0);
    }
}
