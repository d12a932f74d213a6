//! K-Nearest Neighbors implementation
//!
//! Lazy learners: `fit` stores the training matrix and prediction searches it
//! with a bounded max-heap per query row.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Inverse distance
    Distance,
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// Stored training data shared by both estimators
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Memory {
    x: Array2<f64>,
    y: Array1<f64>,
}

impl Memory {
    fn store(x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(PipelineError::TrainingError("KNN needs at least one training row".to_string()));
        }
        Ok(Self { x: x.clone(), y: y.clone() })
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.x.ncols() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.x.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }

    /// (distance, label) of the k nearest rows, nearest first.
    /// Equal distances resolve to the lower training index.
    fn nearest(&self, point: ArrayView1<f64>, k: usize, metric: DistanceMetric) -> Vec<(f64, f64)> {
        let k = k.clamp(1, self.x.nrows());
        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (i, row) in self.x.rows().into_iter().enumerate() {
            let entry = Neighbor { dist: distance(point, row, metric), index: i };
            if heap.len() < k {
                heap.push(entry);
            } else if let Some(top) = heap.peek() {
                if entry < *top {
                    heap.pop();
                    heap.push(entry);
                }
            }
        }
        heap.into_sorted_vec()
            .into_iter()
            .map(|n| (n.dist, self.y[n.index]))
            .collect()
    }
}

#[derive(PartialEq)]
struct Neighbor {
    dist: f64,
    index: usize,
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then(self.index.cmp(&other.index))
    }
}

fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi) * (ai - bi))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum(),
    }
}

fn weight(dist: f64, scheme: WeightScheme) -> f64 {
    match scheme {
        WeightScheme::Uniform => 1.0,
        WeightScheme::Distance => 1.0 / (dist + 1e-10),
    }
}

/// K-Nearest Neighbors classifier over encoded labels `0..n_classes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    n_classes: usize,
    memory: Option<Memory>,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig, n_classes: usize) -> Self {
        Self { config, n_classes: n_classes.max(1), memory: None }
    }

    pub fn with_k(k: usize, n_classes: usize) -> Self {
        Self::new(KNNConfig { n_neighbors: k, ..Default::default() }, n_classes)
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if let Some(bad) = y.iter().find(|&&v| v < 0.0 || v.round() as usize >= self.n_classes) {
            return Err(PipelineError::TrainingError(format!(
                "Label {} outside 0..{}",
                bad, self.n_classes
            )));
        }
        self.memory = Some(Memory::store(x, y)?);
        Ok(self)
    }

    /// Weighted neighbor vote share per class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let memory = self.memory.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        memory.check_width(x)?;
        let k = self.config.n_neighbors;
        let n_classes = self.n_classes;

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let mut votes = vec![0.0; n_classes];
                for (dist, label) in memory.nearest(x.row(i), k, self.config.metric) {
                    votes[label.round() as usize] += weight(dist, self.config.weights);
                }
                let total: f64 = votes.iter().sum();
                if total > 0.0 {
                    votes.iter_mut().for_each(|v| *v /= total);
                }
                votes
            })
            .collect();

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), n_classes), flat)?)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(super::linear_models::argmax_rows(&self.predict_proba(x)?))
    }
}

/// K-Nearest Neighbors regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNRegressor {
    config: KNNConfig,
    memory: Option<Memory>,
}

impl KNNRegressor {
    pub fn new(config: KNNConfig) -> Self {
        Self { config, memory: None }
    }

    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig { n_neighbors: k, ..Default::default() })
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        self.memory = Some(Memory::store(x, y)?);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let memory = self.memory.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        memory.check_width(x)?;
        let k = self.config.n_neighbors;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = memory.nearest(x.row(i), k, self.config.metric);
                let (sum, total) = neighbors.iter().fold((0.0, 0.0), |(s, t), &(dist, y)| {
                    let w = weight(dist, self.config.weights);
                    (s + w * y, t + w)
                });
                if total > 0.0 { sum / total } else { 0.0 }
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_knn_classifier_separable() {
        let x = array![[1.0, 1.0], [1.5, 1.2], [1.2, 1.6], [8.0, 8.0], [8.5, 8.2], [8.2, 8.6]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut knn = KNNClassifier::with_k(3, 2);
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&x).unwrap(), y);
        let proba = knn.predict_proba(&array![[1.1, 1.1]]).unwrap();
        assert_eq!(proba.row(0).to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_knn_probabilities_cover_absent_classes() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 0.0];
        let mut knn = KNNClassifier::with_k(5, 3);
        knn.fit(&x, &y).unwrap();
        let proba = knn.predict_proba(&array![[0.5]]).unwrap();
        assert_eq!(proba.ncols(), 3);
        assert_eq!(proba[[0, 0]], 1.0);
    }

    #[test]
    fn test_knn_regressor_mean_of_neighbors() {
        let x = array![[0.0], [1.0], [2.0], [10.0]];
        let y = array![0.0, 1.0, 2.0, 10.0];
        let mut knn = KNNRegressor::with_k(3);
        knn.fit(&x, &y).unwrap();
        let pred = knn.predict(&array![[1.0]]).unwrap();
        assert!((pred[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_knn_unfitted_errors() {
        let knn = KNNRegressor::with_k(3);
        assert!(knn.predict(&array![[1.0]]).is_err());
    }
}
