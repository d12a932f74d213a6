//! K-Means clustering
//!
//! Unsupervised: `fit` takes X only and `predict` assigns the nearest
//! centroid index.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// K-Means with k-means++ seeding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    pub n_clusters: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub random_state: u64,
    /// n_clusters x n_features
    centroids: Option<Array2<f64>>,
    /// Sum of squared distances to the assigned centroid on the training data
    inertia: Option<f64>,
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters: n_clusters.max(1),
            max_iter: 300,
            tol: 1e-4,
            random_state: 42,
            centroids: None,
            inertia: None,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn sq_dist(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
    }

    /// Index and squared distance of the nearest centroid
    fn nearest(row: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
        centroids
            .rows()
            .into_iter()
            .enumerate()
            .map(|(c, centroid)| (c, Self::sq_dist(row, centroid)))
            .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
    }

    /// D²-weighted seeding
    fn kmeans_pp_init(x: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
        let n = x.nrows();
        let mut centroids = Array2::zeros((k, x.ncols()));
        centroids.row_mut(0).assign(&x.row(rng.gen_range(0..n)));

        let mut dists: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| Self::sq_dist(row, centroids.row(0)))
            .collect();

        for c in 1..k {
            let total: f64 = dists.iter().sum();
            let chosen = if total <= 0.0 {
                rng.gen_range(0..n)
            } else {
                let target = rng.gen::<f64>() * total;
                let mut cumulative = 0.0;
                dists
                    .iter()
                    .position(|&d| {
                        cumulative += d;
                        cumulative >= target
                    })
                    .unwrap_or(n - 1)
            };
            centroids.row_mut(c).assign(&x.row(chosen));
            for (i, row) in x.rows().into_iter().enumerate() {
                dists[i] = dists[i].min(Self::sq_dist(row, centroids.row(c)));
            }
        }
        centroids
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples < self.n_clusters {
            return Err(PipelineError::TrainingError(format!(
                "n_samples ({}) < n_clusters ({})",
                n_samples, self.n_clusters
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut centroids = Self::kmeans_pp_init(x, self.n_clusters, &mut rng);
        let mut labels = vec![usize::MAX; n_samples];

        for _ in 0..self.max_iter {
            let assigned: Vec<usize> = (0..n_samples)
                .into_par_iter()
                .map(|i| Self::nearest(x.row(i), &centroids).0)
                .collect();
            let changed = assigned.iter().zip(&labels).filter(|(a, b)| a != b).count();
            labels = assigned;

            let mut sums = Array2::<f64>::zeros(centroids.dim());
            let mut counts = vec![0usize; self.n_clusters];
            for (row, &c) in x.rows().into_iter().zip(&labels) {
                counts[c] += 1;
                let mut target = sums.row_mut(c);
                target += &row;
            }
            for (c, &count) in counts.iter().enumerate() {
                if count > 0 {
                    sums.row_mut(c).mapv_inplace(|v| v / count as f64);
                } else {
                    // Empty cluster: reseed from a random row
                    sums.row_mut(c).assign(&x.row(rng.gen_range(0..n_samples)));
                }
            }

            let shift = (&sums - &centroids).mapv(|v| v * v).sum().sqrt();
            centroids = sums;
            if changed == 0 || shift < self.tol {
                break;
            }
        }

        let inertia = x
            .axis_iter(Axis(0))
            .map(|row| Self::nearest(row, &centroids).1)
            .sum();
        self.centroids = Some(centroids);
        self.inertia = Some(inertia);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let centroids = self.centroids.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        if x.ncols() != centroids.ncols() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", centroids.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let labels: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| Self::nearest(x.row(i), centroids).0 as f64)
            .collect();
        Ok(Array1::from_vec(labels))
    }

    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.centroids.as_ref()
    }

    pub fn inertia(&self) -> Option<f64> {
        self.inertia
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn three_blobs() -> Array2<f64> {
        array![
            [0.0, 0.0], [0.2, 0.1], [0.1, 0.3],
            [5.0, 5.0], [5.2, 5.1], [4.9, 5.3],
            [10.0, 0.0], [10.1, 0.2], [9.8, 0.1]
        ]
    }

    #[test]
    fn test_kmeans_recovers_blobs() {
        let x = three_blobs();
        let mut km = KMeans::new(3);
        km.fit(&x).unwrap();
        let labels = km.predict(&x).unwrap();
        for blob in 0..3 {
            let start = blob * 3;
            assert_eq!(labels[start], labels[start + 1]);
            assert_eq!(labels[start], labels[start + 2]);
        }
        assert_ne!(labels[0], labels[3]);
        assert_ne!(labels[3], labels[6]);
        assert!(km.inertia().unwrap() < 1.0);
    }

    #[test]
    fn test_kmeans_needs_enough_rows() {
        let x = array![[0.0], [1.0]];
        assert!(KMeans::new(3).fit(&x).is_err());
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        let x = three_blobs();
        let mut a = KMeans::new(3).with_random_state(9);
        let mut b = KMeans::new(3).with_random_state(9);
        a.fit(&x).unwrap();
        b.fit(&x).unwrap();
        assert_eq!(a.centroids(), b.centroids());
    }
}
