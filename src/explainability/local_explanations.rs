//! Sampled Shapley contributions
//!
//! For each sampled permutation a background row is walked toward the
//! explained instance one feature at a time; the change in model output at
//! each step is credited to the feature that was switched. All steps of one
//! permutation are scored in a single batch.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Feature contribution to a prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature_index: usize,
    pub feature_name: Option<String>,
    /// Transformed value of the feature for this instance
    pub feature_value: f64,
    pub contribution: f64,
}

/// Local explanation for a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalExplanation {
    pub instance_index: usize,
    /// Mean model output over the background
    pub base_value: f64,
    /// Model output for the instance
    pub prediction: f64,
    pub contributions: Vec<FeatureContribution>,
}

impl LocalExplanation {
    pub fn sum_contributions(&self) -> f64 {
        self.contributions.iter().map(|c| c.contribution).sum()
    }
}

/// Permutation-sampling Shapley explainer over a fixed background
pub struct LocalExplainer<'a, F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
{
    predict_fn: F,
    background: ArrayView2<'a, f64>,
    n_permutations: usize,
    seed: u64,
    feature_names: Option<&'a [String]>,
}

impl<'a, F> LocalExplainer<'a, F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
{
    pub fn new(predict_fn: F, background: ArrayView2<'a, f64>) -> Self {
        Self {
            predict_fn,
            background,
            n_permutations: 32,
            seed: 42,
            feature_names: None,
        }
    }

    pub fn with_n_permutations(mut self, n: usize) -> Self {
        self.n_permutations = n.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_feature_names(mut self, names: &'a [String]) -> Self {
        self.feature_names = Some(names);
        self
    }

    /// Explain one instance; `instance_index` also perturbs the seed
    pub fn explain(&self, instance: ArrayView1<'_, f64>, instance_index: usize) -> Result<LocalExplanation> {
        let n_features = instance.len();
        if self.background.nrows() == 0 {
            return Err(PipelineError::ExplainError("Empty background sample".to_string()));
        }
        if self.background.ncols() != n_features {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.background.ncols()),
                actual: format!("{} features", n_features),
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(instance_index as u64));
        let base_value = (self.predict_fn)(&self.background.to_owned())?
            .mean()
            .unwrap_or(0.0);
        let prediction = (self.predict_fn)(&instance.to_owned().insert_axis(Axis(0)))?[0];

        let mut totals = vec![0.0; n_features];
        let mut order: Vec<usize> = (0..n_features).collect();
        for _ in 0..self.n_permutations {
            order.shuffle(&mut rng);
            let start = self.background.row(rng.gen_range(0..self.background.nrows()));

            // Row k has the first k features of `order` taken from the instance
            let mut path = Array2::<f64>::zeros((n_features + 1, n_features));
            let mut current = start.to_owned();
            path.row_mut(0).assign(&current);
            for (step, &feature) in order.iter().enumerate() {
                current[feature] = instance[feature];
                path.row_mut(step + 1).assign(&current);
            }

            let outputs = (self.predict_fn)(&path)?;
            for (step, &feature) in order.iter().enumerate() {
                totals[feature] += outputs[step + 1] - outputs[step];
            }
        }

        let n = self.n_permutations as f64;
        let contributions = totals
            .into_iter()
            .enumerate()
            .map(|(idx, total)| FeatureContribution {
                feature_index: idx,
                feature_name: self.feature_names.and_then(|names| names.get(idx).cloned()),
                feature_value: instance[idx],
                contribution: total / n,
            })
            .collect();

        Ok(LocalExplanation {
            instance_index,
            base_value,
            prediction,
            contributions,
        })
    }
}
