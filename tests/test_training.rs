//! Integration test: preprocessing and estimator training through the public API

use automl_pipeline::data::{CellValue, Column, Dataset};
use automl_pipeline::preprocessing::{prepare_session_data, PreparedData};
use automl_pipeline::training::{
    Algorithm, EstimatorTrainer, ModelTrainer, ProblemType, TrainingConfig,
};

fn mixed_classification() -> Dataset {
    let n = 90;
    let x1: Vec<f64> = (0..n).map(|i| (i % 15) as f64).collect();
    let colours = ["red", "green", "blue"];
    let colour: Vec<CellValue> = (0..n)
        .map(|i| {
            if i % 11 == 0 {
                CellValue::Null
            } else {
                CellValue::Text(colours[i % 3].to_string())
            }
        })
        .collect();
    let x2: Vec<CellValue> = (0..n)
        .map(|i| {
            if i % 7 == 0 {
                CellValue::Text(" ".to_string())
            } else {
                CellValue::Number(((i * 3) % 10) as f64)
            }
        })
        .collect();
    let label: Vec<&str> = (0..n)
        .map(|i| match i % 15 {
            0..=4 => "low",
            5..=9 => "mid",
            _ => "high",
        })
        .collect();
    Dataset::new(vec![
        Column::numeric("x1", &x1),
        Column::new("x2", x2),
        Column::new("colour", colour),
        Column::text("label", &label),
    ])
    .unwrap()
}

fn regression() -> Dataset {
    let n = 80;
    let x1: Vec<f64> = (0..n).map(|i| (i % 19) as f64).collect();
    let x2: Vec<f64> = (0..n).map(|i| ((i * 7) % 13) as f64).collect();
    let y: Vec<f64> = (0..n).map(|i| 1.5 * x1[i] - 0.5 * x2[i] + 4.0).collect();
    Dataset::new(vec![
        Column::numeric("x1", &x1),
        Column::numeric("x2", &x2),
        Column::numeric("y", &y),
    ])
    .unwrap()
}

fn prepare(data: &Dataset, config: TrainingConfig) -> PreparedData {
    let config = config.resolve(data).unwrap();
    prepare_session_data(data, &config).unwrap()
}

fn algorithms_for(problem_type: ProblemType) -> Vec<Algorithm> {
    Algorithm::ALL
        .iter()
        .copied()
        .filter(|a| a.problem_type() == problem_type)
        .collect()
}

#[test]
fn test_catalogue_covers_every_algorithm() {
    let total: usize = [ProblemType::Classification, ProblemType::Regression, ProblemType::Clustering]
        .into_iter()
        .map(|p| Algorithm::catalogue(p).len())
        .sum();
    assert_eq!(total, Algorithm::ALL.len());
    for algorithm in Algorithm::ALL {
        assert_eq!(algorithm.name().parse::<Algorithm>().unwrap(), algorithm);
    }
}

#[test]
fn test_preparation_imputes_and_encodes() {
    let data = mixed_classification();
    let prepared = prepare(
        &data,
        TrainingConfig::new("mixed", ProblemType::Classification)
            .with_target("label")
            .with_algorithms([Algorithm::GaussianNB]),
    );

    assert_eq!(prepared.n_classes, 3);
    assert_eq!(
        prepared.feature_names(),
        vec!["x1", "x2", "colour=blue", "colour=green", "colour=red"]
    );
    assert_eq!(prepared.x_train.nrows() + prepared.x_test.nrows(), 90);
    assert_eq!(prepared.x_test.nrows(), 18);
    assert!(prepared.x_train.iter().all(|v| v.is_finite()));
    assert!(prepared.x_test.iter().all(|v| v.is_finite()));

    // Stratified split keeps every class on both sides
    for side in [&prepared.y_train, &prepared.y_test] {
        for class in 0..3 {
            assert!(side.iter().any(|&y| y == class as f64));
        }
    }
}

#[test]
fn test_every_classifier_trains() {
    let data = mixed_classification();
    let algorithms = algorithms_for(ProblemType::Classification);
    let prepared = prepare(
        &data,
        TrainingConfig::new("mixed", ProblemType::Classification)
            .with_target("label")
            .with_algorithms(algorithms.clone()),
    );

    for algorithm in algorithms {
        let outcome = EstimatorTrainer.train(algorithm, &prepared).unwrap();
        let accuracy = outcome.metrics["accuracy"];
        assert!((0.0..=1.0).contains(&accuracy), "{}", algorithm);
        assert_eq!(outcome.cv.scores.len(), 5, "{}", algorithm);
        assert!(outcome.training_time >= 0.0);

        let predictions = outcome.model.predict(&prepared.x_test).unwrap();
        assert!(predictions.iter().all(|&p| p == 0.0 || p == 1.0 || p == 2.0), "{}", algorithm);
        if let Some(proba) = outcome.model.predict_proba(&prepared.x_test).unwrap() {
            assert_eq!(proba.ncols(), 3);
            for row in proba.rows() {
                assert!((row.sum() - 1.0).abs() < 1e-6, "{}", algorithm);
            }
        }
    }
}

#[test]
fn test_every_regressor_trains() {
    let data = regression();
    let algorithms = algorithms_for(ProblemType::Regression);
    let prepared = prepare(
        &data,
        TrainingConfig::new("reg", ProblemType::Regression)
            .with_target("y")
            .with_algorithms(algorithms.clone())
            .with_cv_folds(4),
    );

    for algorithm in algorithms {
        let outcome = EstimatorTrainer.train(algorithm, &prepared).unwrap();
        for metric in ["r2", "mse", "rmse", "mae"] {
            assert!(outcome.metrics[metric].is_finite(), "{} {}", algorithm, metric);
        }
        assert_eq!(outcome.cv.scores.len(), 4);
    }

    let linear = EstimatorTrainer.train(Algorithm::LinearRegression, &prepared).unwrap();
    assert!(linear.metrics["r2"] > 0.999);
    assert!(linear.cv.mean > 0.999);
}

#[test]
fn test_training_is_deterministic() {
    let data = regression();
    let prepared = prepare(
        &data,
        TrainingConfig::new("reg", ProblemType::Regression)
            .with_target("y")
            .with_algorithms([Algorithm::RandomForestRegressor])
            .with_random_state(11),
    );
    let a = EstimatorTrainer.train(Algorithm::RandomForestRegressor, &prepared).unwrap();
    let b = EstimatorTrainer.train(Algorithm::RandomForestRegressor, &prepared).unwrap();
    assert_eq!(a.metrics, b.metrics);
    assert_eq!(a.cv.scores, b.cv.scores);
}

#[test]
fn test_kmeans_on_separated_groups() {
    let x: Vec<f64> = (0..45).map(|i| (i / 15) as f64 * 50.0 + (i % 3) as f64).collect();
    let data = Dataset::new(vec![Column::numeric("x", &x)]).unwrap();
    let prepared = prepare(
        &data,
        TrainingConfig::new("clu", ProblemType::Clustering).with_algorithms([Algorithm::KMeans]),
    );
    assert_eq!(prepared.x_train.nrows(), 45);

    let outcome = EstimatorTrainer.train(Algorithm::KMeans, &prepared).unwrap();
    assert!(outcome.metrics["silhouette"] > 0.9);
    assert_eq!(outcome.cv.scores.len(), 1);
}

#[test]
fn test_regression_target_must_be_numeric() {
    let data = mixed_classification();
    let config = TrainingConfig::new("mixed", ProblemType::Regression)
        .with_target("label")
        .with_algorithms([Algorithm::Ridge])
        .resolve(&data)
        .unwrap();
    assert!(prepare_session_data(&data, &config).is_err());
}
