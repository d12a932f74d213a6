//! Cross-validation splitters

use std::collections::BTreeMap;

use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Cross-validation strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    KFold { n_splits: usize },
    /// Keeps per-class proportions in every fold
    StratifiedKFold { n_splits: usize },
}

impl CVStrategy {
    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits } | CVStrategy::StratifiedKFold { n_splits } => *n_splits,
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Shuffled, seeded fold generator
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: u64,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self { strategy, random_state: 42 }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Generate splits; `y` is required for the stratified strategy
    pub fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CVSplit>> {
        let n_splits = self.strategy.n_splits();
        if n_splits < 2 {
            return Err(PipelineError::ValidationError("n_splits must be at least 2".to_string()));
        }
        if n_samples < n_splits {
            return Err(PipelineError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let order: Vec<usize> = match self.strategy {
            CVStrategy::KFold { .. } => {
                let mut indices: Vec<usize> = (0..n_samples).collect();
                indices.shuffle(&mut rng);
                indices
            }
            CVStrategy::StratifiedKFold { .. } => {
                let y = y.ok_or_else(|| {
                    PipelineError::ValidationError("StratifiedKFold requires target array".to_string())
                })?;
                if y.len() != n_samples {
                    return Err(PipelineError::ShapeError {
                        expected: format!("y length = {}", n_samples),
                        actual: format!("y length = {}", y.len()),
                    });
                }
                // Classes in label order, shuffled within, then dealt round-robin
                let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
                for (idx, &val) in y.iter().enumerate() {
                    by_class.entry(val.round() as i64).or_default().push(idx);
                }
                by_class
                    .into_values()
                    .flat_map(|mut indices| {
                        indices.shuffle(&mut rng);
                        indices
                    })
                    .collect()
            }
        };

        let fold_of = |pos: usize| match self.strategy {
            CVStrategy::KFold { .. } => {
                // Contiguous blocks, earlier folds take the remainder
                let base = n_samples / n_splits;
                let rem = n_samples % n_splits;
                let boundary = rem * (base + 1);
                if pos < boundary { pos / (base + 1) } else { rem + (pos - boundary) / base }
            }
            CVStrategy::StratifiedKFold { .. } => pos % n_splits,
        };

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        for (pos, &idx) in order.iter().enumerate() {
            folds[fold_of(pos)].push(idx);
        }

        Ok((0..n_splits)
            .map(|fold_idx| CVSplit {
                test_indices: folds[fold_idx].clone(),
                train_indices: folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect(),
                fold_idx,
            })
            .collect())
    }
}

/// Per-fold scores with summary statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    pub scores: Vec<f64>,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
}

impl CVResults {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        if scores.is_empty() {
            return Self { scores, mean: 0.0, std: 0.0 };
        }
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let std = (scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
        Self { scores, mean, std }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(splits: &[CVSplit], n: usize) {
        let mut seen: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
        for s in splits {
            assert_eq!(s.train_indices.len() + s.test_indices.len(), n);
            assert!(!s.test_indices.is_empty());
        }
    }

    #[test]
    fn test_kfold_partitions() {
        let splits = CrossValidator::new(CVStrategy::KFold { n_splits: 3 }).split(10, None).unwrap();
        assert_eq!(splits.len(), 3);
        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_partition(&splits, 10);
    }

    #[test]
    fn test_stratified_keeps_class_balance() {
        let y = Array1::from_vec((0..12).map(|i| (i % 2) as f64).collect());
        let splits = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 3 })
            .split(12, Some(&y))
            .unwrap();
        assert_partition(&splits, 12);
        for s in &splits {
            let ones = s.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(ones, 2);
        }
    }

    #[test]
    fn test_stratified_singletons_fill_every_fold() {
        let y = Array1::from_vec(vec![0.0, 1.0, 2.0, 3.0]);
        let splits = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 4 })
            .split(4, Some(&y))
            .unwrap();
        assert_partition(&splits, 4);
    }

    #[test]
    fn test_split_is_seeded() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 4 }).with_random_state(1);
        let a = cv.split(20, None).unwrap();
        let b = cv.split(20, None).unwrap();
        assert_eq!(a[2].test_indices, b[2].test_indices);
    }

    #[test]
    fn test_too_few_samples() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5 });
        assert!(cv.split(3, None).is_err());
    }

    #[test]
    fn test_cv_results_stats() {
        let r = CVResults::from_scores(vec![1.0, 3.0]);
        assert_eq!(r.mean, 2.0);
        assert_eq!(r.std, 1.0);
    }
}
