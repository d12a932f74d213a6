//! Evaluation metrics
//!
//! Every metric set is a `BTreeMap<String, f64>` so serialized results have a
//! stable key order.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};

/// Metric name → value
pub type MetricMap = BTreeMap<String, f64>;

pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Coefficient of determination. A constant target scores 1.0 on an exact
/// fit and 0.0 otherwise.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Accuracy plus support-weighted precision, recall and f1
pub fn classification_metrics(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> MetricMap {
    let labels: Vec<i64> = {
        let mut l: Vec<i64> = y_true.iter().map(|v| v.round() as i64).collect();
        l.sort_unstable();
        l.dedup();
        l
    };
    let n = y_true.len() as f64;
    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);

    for &label in &labels {
        let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            let (t, p) = (t.round() as i64, p.round() as i64);
            match (t == label, p == label) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                _ => {}
            }
        }
        let support = (tp + fn_) as f64;
        let p = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
        let r = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        precision += p * support;
        recall += r * support;
        f1 += f * support;
    }

    let mut metrics = MetricMap::new();
    metrics.insert("accuracy".to_string(), accuracy(y_true, y_pred));
    if n > 0.0 {
        metrics.insert("precision".to_string(), precision / n);
        metrics.insert("recall".to_string(), recall / n);
        metrics.insert("f1".to_string(), f1 / n);
    }
    metrics
}

pub fn regression_metrics(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> MetricMap {
    let n = y_true.len().max(1) as f64;
    let errors: Vec<f64> = y_true.iter().zip(y_pred.iter()).map(|(t, p)| t - p).collect();
    let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

    // MAPE skips zero targets
    let (ape_sum, ape_count) = y_true
        .iter()
        .zip(errors.iter())
        .filter(|(t, _)| t.abs() > f64::EPSILON)
        .fold((0.0, 0usize), |(s, c), (t, e)| (s + (e / t).abs(), c + 1));

    let mut metrics = MetricMap::new();
    metrics.insert("r2".to_string(), r2_score(y_true, y_pred));
    metrics.insert("mse".to_string(), mse);
    metrics.insert("rmse".to_string(), mse.sqrt());
    metrics.insert("mae".to_string(), mae);
    if ape_count > 0 {
        metrics.insert("mape".to_string(), ape_sum / ape_count as f64 * 100.0);
    }
    metrics
}

fn euclidean(a: ndarray::ArrayView1<f64>, b: ndarray::ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

fn cluster_ids(labels: &Array1<f64>) -> (Vec<usize>, usize) {
    let ids: Vec<usize> = labels.iter().map(|&l| l.max(0.0).round() as usize).collect();
    let k = ids.iter().max().map(|m| m + 1).unwrap_or(0);
    (ids, k)
}

/// Mean silhouette coefficient. Returns 0.0 with fewer than two clusters.
pub fn silhouette_score(x: &Array2<f64>, labels: &Array1<f64>) -> f64 {
    let n = x.nrows();
    let (ids, k) = cluster_ids(labels);
    let mut sizes = vec![0usize; k];
    ids.iter().for_each(|&c| sizes[c] += 1);
    if sizes.iter().filter(|&&s| s > 0).count() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..n {
        let mut dist_sums = vec![0.0; k];
        for j in 0..n {
            if i != j {
                dist_sums[ids[j]] += euclidean(x.row(i), x.row(j));
            }
        }
        let own = ids[i];
        // Singleton clusters score 0
        if sizes[own] <= 1 {
            continue;
        }
        let a = dist_sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| dist_sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    total / n as f64
}

/// Davies-Bouldin index (lower is better)
pub fn davies_bouldin_score(x: &Array2<f64>, labels: &Array1<f64>) -> f64 {
    let (ids, k) = cluster_ids(labels);
    let mut centroids = Array2::<f64>::zeros((k, x.ncols()));
    let mut sizes = vec![0usize; k];
    for (row, &c) in x.rows().into_iter().zip(&ids) {
        sizes[c] += 1;
        let mut target = centroids.row_mut(c);
        target += &row;
    }
    for (c, &size) in sizes.iter().enumerate() {
        if size > 0 {
            centroids.row_mut(c).mapv_inplace(|v| v / size as f64);
        }
    }
    let mut scatter = vec![0.0; k];
    for (row, &c) in x.rows().into_iter().zip(&ids) {
        scatter[c] += euclidean(row, centroids.row(c));
    }
    let present: Vec<usize> = (0..k).filter(|&c| sizes[c] > 0).collect();
    if present.len() < 2 {
        return 0.0;
    }
    for &c in &present {
        scatter[c] /= sizes[c] as f64;
    }

    let sum: f64 = present
        .iter()
        .map(|&i| {
            present
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| {
                    let d = euclidean(centroids.row(i), centroids.row(j));
                    if d > 0.0 { (scatter[i] + scatter[j]) / d } else { 0.0 }
                })
                .fold(0.0, f64::max)
        })
        .sum();
    sum / present.len() as f64
}

pub fn clustering_metrics(x: &Array2<f64>, labels: &Array1<f64>, inertia: Option<f64>) -> MetricMap {
    let mut metrics = MetricMap::new();
    metrics.insert("silhouette".to_string(), silhouette_score(x, labels));
    metrics.insert("davies_bouldin".to_string(), davies_bouldin_score(x, labels));
    if let Some(inertia) = inertia {
        metrics.insert("inertia".to_string(), inertia);
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classification_metrics_perfect() {
        let y = array![0.0, 1.0, 2.0, 1.0];
        let m = classification_metrics(&y, &y);
        for key in ["accuracy", "precision", "recall", "f1"] {
            assert!((m[key] - 1.0).abs() < 1e-12, "{}", key);
        }
    }

    #[test]
    fn test_weighted_precision() {
        let y_true = array![0.0, 0.0, 0.0, 1.0];
        let y_pred = array![0.0, 0.0, 1.0, 1.0];
        let m = classification_metrics(&y_true, &y_pred);
        assert!((m["accuracy"] - 0.75).abs() < 1e-12);
        // class 0: p=1, support 3; class 1: p=0.5, support 1
        assert!((m["precision"] - (3.0 + 0.5) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0];
        let y_pred = array![1.0, 2.0, 4.0];
        let m = regression_metrics(&y_true, &y_pred);
        assert!((m["mse"] - 1.0 / 3.0).abs() < 1e-12);
        assert!((m["mae"] - 1.0 / 3.0).abs() < 1e-12);
        assert!((m["r2"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_silhouette_well_separated() {
        let x = array![[0.0], [0.1], [10.0], [10.1]];
        let labels = array![0.0, 0.0, 1.0, 1.0];
        assert!(silhouette_score(&x, &labels) > 0.95);
        assert!(davies_bouldin_score(&x, &labels) < 0.05);
    }

    #[test]
    fn test_silhouette_single_cluster_is_zero() {
        let x = array![[0.0], [1.0]];
        assert_eq!(silhouette_score(&x, &array![0.0, 0.0]), 0.0);
    }
}
