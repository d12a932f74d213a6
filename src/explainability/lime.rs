//! LIME-style local surrogate
//!
//! Gaussian perturbations around the instance are weighted with an RBF
//! kernel on their scaled distance and fitted with a weighted ridge
//! regression. The surrogate's coefficients are the explanation.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::training::linear_models::cholesky_solve;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimeFeature {
    pub feature: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimeExplanation {
    /// Largest absolute surrogate weights first
    pub features: Vec<LimeFeature>,
    pub intercept: f64,
    /// Weighted R² of the surrogate on the perturbations
    pub score: f64,
    /// Surrogate output at the instance
    pub local_prediction: f64,
}

pub struct LimeExplainer {
    n_samples: usize,
    top_features: usize,
    alpha: f64,
    seed: u64,
}

impl Default for LimeExplainer {
    fn default() -> Self {
        Self {
            n_samples: 500,
            top_features: 10,
            alpha: 1.0,
            seed: 42,
        }
    }
}

impl LimeExplainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_samples(mut self, n: usize) -> Self {
        self.n_samples = n.max(10);
        self
    }

    pub fn with_top_features(mut self, k: usize) -> Self {
        self.top_features = k.max(1);
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha.max(0.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Per-feature perturbation scale: background standard deviation, 1 when flat
    fn scales(background: ArrayView2<'_, f64>, n_features: usize) -> Array1<f64> {
        if background.nrows() < 2 {
            return Array1::ones(n_features);
        }
        background
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > 1e-12 { s } else { 1.0 })
    }

    pub fn explain<F>(
        &self,
        predict_fn: F,
        instance: ArrayView1<'_, f64>,
        background: ArrayView2<'_, f64>,
        feature_names: &[String],
    ) -> Result<LimeExplanation>
    where
        F: Fn(&Array2<f64>) -> Result<Array1<f64>>,
    {
        let d = instance.len();
        if d == 0 {
            return Err(PipelineError::ExplainError("No features to explain".to_string()));
        }
        let scale = Self::scales(background, d);
        let width = 0.75 * (d as f64).sqrt();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        // First sample is the instance itself
        let mut z = Array2::<f64>::zeros((self.n_samples, d));
        let mut weights = Array1::<f64>::zeros(self.n_samples);
        for (i, mut row) in z.rows_mut().into_iter().enumerate() {
            let mut dist_sq = 0.0;
            for j in 0..d {
                let noise = if i == 0 { 0.0 } else { standard_normal(&mut rng) };
                row[j] = instance[j] + noise * scale[j];
                dist_sq += noise * noise;
            }
            weights[i] = (-dist_sq / (width * width)).exp();
        }
        let y = predict_fn(&z)?;

        let (coef, intercept) = weighted_ridge(&z, &y, &weights, self.alpha)
            .ok_or_else(|| PipelineError::ExplainError("LIME surrogate could not be fitted".to_string()))?;

        let fitted = z.dot(&coef) + intercept;
        let w_sum = weights.sum();
        let y_mean = (&weights * &y).sum() / w_sum;
        let ss_res: f64 = (&weights * &(&y - &fitted).mapv(|r| r * r)).sum();
        let ss_tot: f64 = (&weights * &y.mapv(|v| (v - y_mean).powi(2))).sum();
        let score = if ss_tot > 1e-12 { 1.0 - ss_res / ss_tot } else if ss_res < 1e-12 { 1.0 } else { 0.0 };

        let mut ranked: Vec<usize> = (0..d).collect();
        ranked.sort_by(|&a, &b| coef[b].abs().total_cmp(&coef[a].abs()).then_with(|| a.cmp(&b)));
        let features = ranked
            .into_iter()
            .take(self.top_features)
            .map(|j| LimeFeature {
                feature: feature_names.get(j).cloned().unwrap_or_else(|| format!("feature_{}", j)),
                weight: coef[j],
            })
            .collect();

        Ok(LimeExplanation {
            features,
            intercept,
            score,
            local_prediction: instance.dot(&coef) + intercept,
        })
    }
}

/// Box-Muller transform
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Weighted ridge with an unpenalized intercept, solved on weighted-centered data
fn weighted_ridge(x: &Array2<f64>, y: &Array1<f64>, w: &Array1<f64>, alpha: f64) -> Option<(Array1<f64>, f64)> {
    let w_sum = w.sum();
    if !(w_sum > 0.0) {
        return None;
    }
    let x_mean = x.t().dot(w) / w_sum;
    let y_mean = w.dot(y) / w_sum;
    let xc = x - &x_mean.view().insert_axis(Axis(0));
    let yc = y - y_mean;

    let sqrt_w = w.mapv(f64::sqrt);
    let xw = &xc * &sqrt_w.view().insert_axis(Axis(1));
    let yw = &yc * &sqrt_w;

    let mut gram = xw.t().dot(&xw);
    for k in 0..gram.nrows() {
        gram[[k, k]] += alpha;
    }
    let coef = cholesky_solve(&gram, &xw.t().dot(&yw))?;
    if coef.iter().any(|c| !c.is_finite()) {
        return None;
    }
    let intercept = y_mean - x_mean.dot(&coef);
    Some((coef, intercept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_model_is_recovered() {
        let predict = |x: &Array2<f64>| -> Result<Array1<f64>> {
            Ok(x.rows().into_iter().map(|r| 3.0 * r[0] - 1.0 * r[1] + 0.5).collect())
        };
        let background = Array2::from_shape_fn((20, 3), |(i, j)| ((i + j) % 7) as f64);
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let explanation = LimeExplainer::new()
            .with_n_samples(400)
            .with_alpha(1e-6)
            .with_top_features(2)
            .explain(predict, array![1.0, 2.0, 3.0].view(), background.view(), &names)
            .unwrap();

        assert_eq!(explanation.features.len(), 2);
        assert_eq!(explanation.features[0].feature, "a");
        assert!((explanation.features[0].weight - 3.0).abs() < 1e-3);
        assert_eq!(explanation.features[1].feature, "b");
        assert!(explanation.score > 0.999);
        assert!((explanation.local_prediction - 1.5).abs() < 1e-3);
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let predict = |x: &Array2<f64>| -> Result<Array1<f64>> { Ok(x.column(0).mapv(|v| v * v)) };
        let background = Array2::from_shape_fn((10, 2), |(i, _)| i as f64);
        let names = vec!["a".to_string(), "b".to_string()];
        let explainer = LimeExplainer::new().with_n_samples(100).with_seed(3);
        let a = explainer
            .explain(predict, array![1.0, 1.0].view(), background.view(), &names)
            .unwrap();
        let b = explainer
            .explain(predict, array![1.0, 1.0].view(), background.view(), &names)
            .unwrap();
        assert_eq!(a.intercept, b.intercept);
        assert_eq!(a.features[0].weight, b.features[0].weight);
    }
}
