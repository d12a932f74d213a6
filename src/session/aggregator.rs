//! Leaderboard ordering
//!
//! Primary metric descending, then `cv_mean` descending, then training time
//! ascending, then model name. The order depends only on the results, never on
//! the order tasks finished in.

use std::cmp::Ordering;

use super::ModelResult;
use crate::training::ProblemType;

fn primary_score(problem_type: ProblemType, result: &ModelResult) -> f64 {
    result
        .metrics
        .get(problem_type.primary_metric())
        .copied()
        .filter(|v| !v.is_nan())
        .unwrap_or(f64::NEG_INFINITY)
}

fn finite_or_worst(v: f64) -> f64 {
    if v.is_nan() { f64::NEG_INFINITY } else { v }
}

fn compare(problem_type: ProblemType, a: &ModelResult, b: &ModelResult) -> Ordering {
    primary_score(problem_type, b)
        .total_cmp(&primary_score(problem_type, a))
        .then_with(|| finite_or_worst(b.cv_mean).total_cmp(&finite_or_worst(a.cv_mean)))
        .then_with(|| a.training_time.total_cmp(&b.training_time))
        .then_with(|| a.model_name.cmp(&b.model_name))
}

/// Results best-first
pub fn rank<'a>(
    problem_type: ProblemType,
    results: impl IntoIterator<Item = &'a ModelResult>,
) -> Vec<&'a ModelResult> {
    let mut ranked: Vec<&ModelResult> = results.into_iter().collect();
    ranked.sort_by(|a, b| compare(problem_type, a, b));
    ranked
}

/// Name of the top-ranked result, `None` when there are no results
pub fn best_model<'a>(
    problem_type: ProblemType,
    results: impl IntoIterator<Item = &'a ModelResult>,
) -> Option<String> {
    results
        .into_iter()
        .min_by(|a, b| compare(problem_type, a, b))
        .map(|r| r.model_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactRef;
    use crate::training::MetricMap;

    fn result(name: &str, metric: (&str, f64), cv_mean: f64, time: f64) -> ModelResult {
        let mut metrics = MetricMap::new();
        metrics.insert(metric.0.to_string(), metric.1);
        ModelResult {
            model_name: name.to_string(),
            metrics,
            training_time: time,
            cv_mean,
            cv_std: 0.0,
            cv_scores: vec![cv_mean],
            artifact: ArtifactRef {
                session_id: "s".to_string(),
                model_name: name.to_string(),
            },
        }
    }

    #[test]
    fn test_primary_metric_wins() {
        let results = vec![
            result("A", ("accuracy", 0.8), 0.99, 0.1),
            result("B", ("accuracy", 0.9), 0.10, 5.0),
        ];
        assert_eq!(best_model(ProblemType::Classification, &results).as_deref(), Some("B"));
    }

    #[test]
    fn test_tie_breaks() {
        let results = vec![
            result("C", ("r2", 0.5), 0.4, 1.0),
            result("B", ("r2", 0.5), 0.4, 0.5),
            result("A", ("r2", 0.5), 0.3, 0.1),
        ];
        let names: Vec<&str> = rank(ProblemType::Regression, &results)
            .iter()
            .map(|r| r.model_name.as_str())
            .collect();
        assert_eq!(names, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_ranking_ignores_input_order() {
        let mut results = vec![
            result("A", ("silhouette", 0.2), 0.2, 0.1),
            result("B", ("silhouette", 0.7), 0.7, 0.1),
            result("C", ("silhouette", 0.4), 0.4, 0.1),
        ];
        let first = best_model(ProblemType::Clustering, &results);
        results.reverse();
        assert_eq!(first, best_model(ProblemType::Clustering, &results));
        assert_eq!(first.as_deref(), Some("B"));
    }

    #[test]
    fn test_no_results_no_best() {
        assert_eq!(best_model(ProblemType::Regression, &Vec::<ModelResult>::new()), None);
    }

    #[test]
    fn test_nan_metric_ranks_last() {
        let results = vec![
            result("A", ("r2", f64::NAN), 0.9, 0.1),
            result("B", ("r2", -3.0), 0.0, 0.1),
        ];
        assert_eq!(best_model(ProblemType::Regression, &results).as_deref(), Some("B"));
    }
}
