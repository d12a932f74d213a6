//! Seeded train/test splitting

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{PipelineError, Result};

/// Row indices of each side of a split, both sorted ascending
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Test rows are `ceil(test_size * n)`, train rows the rest.
///
/// With `stratify`, every class contributes to the test side in proportion to
/// its size (largest-remainder rounding, ties to the lower class id).
pub fn train_test_split(
    n_samples: usize,
    test_size: f64,
    random_state: u64,
    stratify: Option<&[usize]>,
) -> Result<TrainTestSplit> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must be between 0 and 1 (exclusive)".to_string(),
        });
    }
    let n_test = ((n_samples as f64) * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(PipelineError::DataError(format!(
            "Cannot split {} rows with test_size {}",
            n_samples, test_size
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(random_state);
    let (mut train, mut test) = match stratify {
        None => {
            let mut indices: Vec<usize> = (0..n_samples).collect();
            indices.shuffle(&mut rng);
            let train = indices.split_off(n_test);
            (train, indices)
        }
        Some(labels) => {
            if labels.len() != n_samples {
                return Err(PipelineError::ShapeError {
                    expected: format!("{} labels", n_samples),
                    actual: format!("{} labels", labels.len()),
                });
            }
            let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            for (i, &label) in labels.iter().enumerate() {
                by_class.entry(label).or_default().push(i);
            }

            let quotas: Vec<f64> = by_class
                .values()
                .map(|rows| rows.len() as f64 * n_test as f64 / n_samples as f64)
                .collect();
            let mut alloc: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();
            let mut order: Vec<usize> = (0..quotas.len()).collect();
            order.sort_by(|&a, &b| {
                let fa = quotas[a] - quotas[a].floor();
                let fb = quotas[b] - quotas[b].floor();
                fb.total_cmp(&fa).then(a.cmp(&b))
            });
            let mut remaining = n_test - alloc.iter().sum::<usize>();
            for &c in order.iter().cycle().take(order.len() * 2) {
                if remaining == 0 {
                    break;
                }
                let size = by_class.values().nth(c).map(Vec::len).unwrap_or(0);
                if alloc[c] < size {
                    alloc[c] += 1;
                    remaining -= 1;
                }
            }

            let (mut train, mut test) = (Vec::new(), Vec::new());
            for (c, mut rows) in by_class.into_values().enumerate() {
                rows.shuffle(&mut rng);
                let rest = rows.split_off(alloc[c]);
                test.extend(rows);
                train.extend(rest);
            }
            (train, test)
        }
    };

    train.sort_unstable();
    test.sort_unstable();
    Ok(TrainTestSplit { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_and_disjointness() {
        let split = train_test_split(10, 0.25, 42, None).unwrap();
        assert_eq!(split.test.len(), 3);
        assert_eq!(split.train.len(), 7);
        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_seed_controls_split() {
        let a = train_test_split(50, 0.2, 7, None).unwrap();
        let b = train_test_split(50, 0.2, 7, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stratified_proportions() {
        let labels: Vec<usize> = (0..40).map(|i| if i < 30 { 0 } else { 1 }).collect();
        let split = train_test_split(40, 0.2, 1, Some(&labels)).unwrap();
        assert_eq!(split.test.len(), 8);
        let minority = split.test.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!(minority, 2);
    }

    #[test]
    fn test_degenerate_split_rejected() {
        assert!(train_test_split(1, 0.5, 0, None).is_err());
        assert!(train_test_split(10, 1.5, 0, None).is_err());
    }
}
