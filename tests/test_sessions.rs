//! Integration test: training sessions from submission to prediction and explanation

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use automl_pipeline::config::Settings;
use automl_pipeline::data::{CellValue, Column, Dataset};
use automl_pipeline::error::{PipelineError, Result};
use automl_pipeline::explainability::ImportanceMethod;
use automl_pipeline::preprocessing::PreparedData;
use automl_pipeline::server::AppState;
use automl_pipeline::session::{SessionSnapshot, SessionStatus};
use automl_pipeline::training::{
    Algorithm, EstimatorTrainer, ModelTrainer, ProblemType, TrainingConfig, TrainingOutcome,
};
use serde_json::json;

// ============================================================================
// Fixtures
// ============================================================================

fn regression_data(n: usize) -> Arc<Dataset> {
    let x1: Vec<f64> = (0..n).map(|i| (i % 17) as f64).collect();
    let x2: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64).collect();
    let cities = ["a", "b", "c"];
    let city: Vec<&str> = (0..n).map(|i| cities[i % 3]).collect();
    let y: Vec<f64> = (0..n)
        .map(|i| 2.0 * x1[i] - x2[i] + 0.5 * (i % 3) as f64)
        .collect();
    Arc::new(
        Dataset::new(vec![
            Column::numeric("x1", &x1),
            Column::numeric("x2", &x2),
            Column::text("city", &city),
            Column::numeric("y", &y),
        ])
        .unwrap(),
    )
}

fn classification_data(n: usize) -> Arc<Dataset> {
    let x1: Vec<f64> = (0..n).map(|i| (i % 20) as f64).collect();
    let x2: Vec<f64> = (0..n).map(|i| ((i * 3) % 7) as f64).collect();
    let label: Vec<&str> = (0..n)
        .map(|i| if x1[i] + 0.5 * x2[i] > 11.0 { "yes" } else { "no" })
        .collect();
    Arc::new(
        Dataset::new(vec![
            Column::numeric("x1", &x1),
            Column::numeric("x2", &x2),
            Column::text("label", &label),
        ])
        .unwrap(),
    )
}

fn app_state(trainer: Option<Arc<dyn ModelTrainer>>) -> AppState {
    let state = AppState::new(Settings::ephemeral(2)).unwrap();
    match trainer {
        Some(trainer) => {
            let scheduler = state.scheduler.clone().with_trainer(trainer);
            state.with_scheduler(scheduler)
        }
        None => state,
    }
}

fn regression_config(algorithms: &[Algorithm]) -> TrainingConfig {
    TrainingConfig::new("reg", ProblemType::Regression)
        .with_target("y")
        .with_algorithms(algorithms.iter().copied())
}

fn wait(state: &AppState, session_id: &str) -> SessionSnapshot {
    state
        .sessions
        .wait_for_terminal(session_id, Duration::from_millis(10), Duration::from_secs(300))
        .unwrap()
}

/// Fails one algorithm, delegates the rest
struct FailingTrainer {
    fail: Algorithm,
}

impl ModelTrainer for FailingTrainer {
    fn train(&self, algorithm: Algorithm, data: &PreparedData) -> Result<TrainingOutcome> {
        if algorithm == self.fail {
            return Err(PipelineError::TrainingError("injected failure".to_string()));
        }
        EstimatorTrainer.train(algorithm, data)
    }
}

struct AlwaysFails;

impl ModelTrainer for AlwaysFails {
    fn train(&self, algorithm: Algorithm, _data: &PreparedData) -> Result<TrainingOutcome> {
        Err(PipelineError::TrainingError(format!("{} cannot train", algorithm)))
    }
}

/// Blocks every task until released
struct GatedTrainer {
    open: Arc<AtomicBool>,
}

impl ModelTrainer for GatedTrainer {
    fn train(&self, algorithm: Algorithm, data: &PreparedData) -> Result<TrainingOutcome> {
        while !self.open.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
        EstimatorTrainer.train(algorithm, data)
    }
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn test_one_failing_algorithm_leaves_the_others() {
    let state = app_state(Some(Arc::new(FailingTrainer { fail: Algorithm::Ridge })));
    let config = regression_config(&[Algorithm::LinearRegression, Algorithm::Ridge, Algorithm::Lasso]);
    let id = state.scheduler.submit(config, regression_data(90)).unwrap();

    let snapshot = wait(&state, &id);
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.total_models, 3);

    let session = state.sessions.get_full(&id).unwrap();
    let names: BTreeSet<&str> = session.results.keys().map(String::as_str).collect();
    assert_eq!(names, BTreeSet::from(["Lasso", "LinearRegression"]));
    assert!(names.contains(session.best_model.as_deref().unwrap()));
    assert!(session.failures["Ridge"].contains("injected failure"));
    assert_eq!(session.completed_models.len(), 2);
    assert!(session.error.is_none());
}

#[test]
fn test_all_algorithms_failing_fails_the_session() {
    let state = app_state(Some(Arc::new(AlwaysFails)));
    let config = regression_config(&[Algorithm::LinearRegression, Algorithm::Ridge]);
    let id = state.scheduler.submit(config, regression_data(60)).unwrap();

    let snapshot = wait(&state, &id);
    assert_eq!(snapshot.status, SessionStatus::Failed);
    let session = state.sessions.get_full(&id).unwrap();
    assert!(session.best_model.is_none());
    assert!(session.results.is_empty());
    assert!(session.error.unwrap().contains("cannot train"));
}

#[test]
fn test_validation_errors_create_no_session() {
    let state = app_state(None);
    let bad = [
        regression_config(&[]),
        regression_config(&[Algorithm::LogisticRegression]),
        regression_config(&[Algorithm::Ridge]).with_features(["x1", "y"]),
        regression_config(&[Algorithm::Ridge]).with_cv_folds(1),
        regression_config(&[Algorithm::Ridge]).with_test_size(1.0),
    ];
    for config in bad {
        assert!(matches!(
            state.scheduler.submit(config, regression_data(60)),
            Err(PipelineError::ValidationError(_))
        ));
    }
    assert!(state.sessions.is_empty());
}

// ============================================================================
// Progress and lifecycle
// ============================================================================

#[test]
fn test_progress_is_monotonic_and_predict_waits_for_completion() {
    let open = Arc::new(AtomicBool::new(false));
    let state = app_state(Some(Arc::new(GatedTrainer { open: Arc::clone(&open) })));
    let config = regression_config(&[Algorithm::LinearRegression, Algorithm::Ridge, Algorithm::Lasso]);
    let id = state.scheduler.submit(config, regression_data(60)).unwrap();

    let early = state.sessions.get_snapshot(&id).unwrap();
    assert!(!early.status.is_terminal());
    assert!(matches!(
        state.predictions.predict(&id, None, &serde_json::Map::new()),
        Err(PipelineError::NotReady { .. })
    ));
    assert!(matches!(
        state.explanations.local_explanation(&id, 0, None),
        Err(PipelineError::NotReady { .. })
    ));

    open.store(true, Ordering::SeqCst);
    let mut seen: Vec<String> = Vec::new();
    loop {
        let snapshot = state.sessions.get_snapshot(&id).unwrap();
        assert!(snapshot.completed_models.len() <= snapshot.total_models);
        assert!(snapshot.completed_models.len() >= seen.len());
        assert_eq!(&snapshot.completed_models[..seen.len()], &seen[..]);
        seen = (*snapshot.completed_models).clone();
        if snapshot.status.is_terminal() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(seen.len(), 3);
}

#[test]
fn test_delete_is_idempotent_and_cascades() {
    let state = app_state(None);
    let id = state
        .scheduler
        .submit(regression_config(&[Algorithm::LinearRegression]), regression_data(60))
        .unwrap();
    wait(&state, &id);
    assert_eq!(state.artifacts.list(&id), vec!["LinearRegression"]);

    assert!(state.sessions.delete(&id).unwrap());
    assert!(!state.sessions.delete(&id).unwrap());

    assert!(matches!(state.sessions.get_full(&id), Err(PipelineError::NotFound { .. })));
    assert!(matches!(
        state.predictions.predict(&id, None, &serde_json::Map::new()),
        Err(PipelineError::NotFound { .. })
    ));
    assert!(state.artifacts.list(&id).is_empty());
    assert!(state.artifacts.get_evaluation(&id).is_err());
}

#[test]
fn test_delete_while_training_discards_late_artifacts() {
    let open = Arc::new(AtomicBool::new(false));
    let state = app_state(Some(Arc::new(GatedTrainer { open: Arc::clone(&open) })));
    let data = regression_data(60);
    let config = regression_config(&[Algorithm::LinearRegression, Algorithm::Ridge, Algorithm::Lasso])
        .resolve(&data)
        .unwrap();
    let id = state.sessions.create(config.clone());

    // Drive the session on a thread we can join
    let scheduler = state.scheduler.clone();
    let driver_id = id.clone();
    let driver = std::thread::spawn(move || scheduler.run_session(&driver_id, &config, &data));

    let deadline = std::time::Instant::now() + Duration::from_secs(60);
    while state.artifacts.get_evaluation(&id).is_err() {
        assert!(std::time::Instant::now() < deadline, "evaluation set never stored");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(state.sessions.delete(&id).unwrap());

    open.store(true, Ordering::SeqCst);
    driver.join().unwrap();

    assert!(state.artifacts.list(&id).is_empty());
    assert!(state.artifacts.get_evaluation(&id).is_err());
    assert!(matches!(state.sessions.get_full(&id), Err(PipelineError::NotFound { .. })));
    assert!(state.sessions.is_empty());
}

#[test]
fn test_concurrent_sessions_are_isolated() {
    let state = app_state(None);
    let reg = state
        .scheduler
        .submit(
            regression_config(&[Algorithm::LinearRegression, Algorithm::DecisionTreeRegressor]),
            regression_data(80),
        )
        .unwrap();
    let cls = state
        .scheduler
        .submit(
            TrainingConfig::new("cls", ProblemType::Classification)
                .with_target("label")
                .with_algorithms([Algorithm::LogisticRegression, Algorithm::GaussianNB]),
            classification_data(80),
        )
        .unwrap();

    assert_eq!(wait(&state, &reg).status, SessionStatus::Completed);
    assert_eq!(wait(&state, &cls).status, SessionStatus::Completed);

    let reg_session = state.sessions.get_full(&reg).unwrap();
    let cls_session = state.sessions.get_full(&cls).unwrap();
    let reg_names: BTreeSet<&str> = reg_session.completed_models.iter().map(String::as_str).collect();
    let cls_names: BTreeSet<&str> = cls_session.completed_models.iter().map(String::as_str).collect();
    assert_eq!(reg_names, BTreeSet::from(["DecisionTreeRegressor", "LinearRegression"]));
    assert_eq!(cls_names, BTreeSet::from(["GaussianNB", "LogisticRegression"]));
    assert!(reg_session.results.values().all(|r| r.metrics.contains_key("r2")));
    assert!(cls_session.results.values().all(|r| r.metrics.contains_key("accuracy")));
    assert_eq!(state.artifacts.list(&reg).len(), 2);
    assert_eq!(state.artifacts.list(&cls).len(), 2);
}

#[test]
fn test_same_inputs_give_same_results() {
    let algorithms = [
        Algorithm::RandomForestRegressor,
        Algorithm::GradientBoostingRegressor,
        Algorithm::KNeighborsRegressor,
    ];
    let run = || {
        let state = app_state(None);
        let id = state
            .scheduler
            .submit(regression_config(&algorithms).with_random_state(7), regression_data(70))
            .unwrap();
        wait(&state, &id);
        state.sessions.get_full(&id).unwrap()
    };
    let a = run();
    let b = run();
    assert_eq!(a.status, SessionStatus::Completed);
    assert_eq!(a.best_model, b.best_model);
    for (name, result) in &a.results {
        let other = &b.results[name];
        for (metric, value) in &result.metrics {
            assert!((value - other.metrics[metric]).abs() < 1e-9, "{} {}", name, metric);
        }
        assert_eq!(result.cv_scores.len(), other.cv_scores.len());
        assert!((result.cv_mean - other.cv_mean).abs() < 1e-9);
    }
}

// ============================================================================
// Prediction
// ============================================================================

#[test]
fn test_regression_predict_reports_missing_inputs() {
    let state = app_state(None);
    let id = state
        .scheduler
        .submit(regression_config(&[Algorithm::LinearRegression]), regression_data(60))
        .unwrap();
    wait(&state, &id);

    let full = json!({"x1": 4, "x2": "3", "city": "b"});
    let response = state
        .predictions
        .predict(&id, None, full.as_object().unwrap())
        .unwrap();
    assert!(response.missing_inputs.is_empty());
    assert!((response.prediction.as_f64().unwrap() - 5.5).abs() < 1e-6);
    assert!(response.probabilities.is_none());

    let partial = json!({"x1": 4, "x2": "   ", "unused": 1});
    let response = state
        .predictions
        .predict(&id, Some("LinearRegression"), partial.as_object().unwrap())
        .unwrap();
    assert_eq!(response.missing_inputs, vec!["x2", "city"]);
    assert!(response.prediction.as_f64().unwrap().is_finite());

    assert!(matches!(
        state.predictions.predict(&id, Some("Ridge"), full.as_object().unwrap()),
        Err(PipelineError::NotFound { .. })
    ));
    assert!(matches!(
        state.predictions.predict("no-such-session", None, full.as_object().unwrap()),
        Err(PipelineError::NotFound { .. })
    ));
}

#[test]
fn test_non_finite_numeric_inputs_are_imputed() {
    let state = app_state(None);
    let id = state
        .scheduler
        .submit(regression_config(&[Algorithm::LinearRegression]), regression_data(60))
        .unwrap();
    wait(&state, &id);

    for value in ["1e999", "inf", "-inf", "abc"] {
        let record = json!({"x1": value, "x2": "3", "city": "b"});
        let response = state
            .predictions
            .predict(&id, None, record.as_object().unwrap())
            .unwrap();
        assert!(response.prediction.as_f64().unwrap().is_finite(), "{}", value);
        assert!(response.missing_inputs.is_empty(), "{}", value);
    }
}

#[test]
fn test_classification_predict_returns_labels_and_probabilities() {
    let state = app_state(None);
    let config = TrainingConfig::new("cls", ProblemType::Classification)
        .with_target("label")
        .with_algorithms([Algorithm::LogisticRegression, Algorithm::DecisionTreeClassifier]);
    let id = state.scheduler.submit(config, classification_data(100)).unwrap();
    assert_eq!(wait(&state, &id).status, SessionStatus::Completed);

    let record = json!({"x1": 19, "x2": 6});
    let response = state
        .predictions
        .predict(&id, Some("DecisionTreeClassifier"), record.as_object().unwrap())
        .unwrap();
    assert_eq!(response.prediction, json!("yes"));
    let probabilities = response.probabilities.unwrap();
    assert_eq!(probabilities.keys().collect::<Vec<_>>(), vec!["no", "yes"]);
    assert!((probabilities.values().sum::<f64>() - 1.0).abs() < 1e-9);
}

#[test]
fn test_clustering_session_predicts_cluster_index() {
    let state = app_state(None);
    let x: Vec<f64> = (0..60).map(|i| if i < 30 { (i % 5) as f64 } else { 100.0 + (i % 5) as f64 }).collect();
    let data = Arc::new(Dataset::new(vec![Column::numeric("x", &x)]).unwrap());
    let config = TrainingConfig::new("clu", ProblemType::Clustering).with_algorithms([Algorithm::KMeans]);
    let id = state.scheduler.submit(config, data).unwrap();
    assert_eq!(wait(&state, &id).status, SessionStatus::Completed);

    let session = state.sessions.get_full(&id).unwrap();
    assert!(session.results["KMeans"].metrics.contains_key("silhouette"));

    let response = state
        .predictions
        .predict(&id, None, json!({"x": 101}).as_object().unwrap())
        .unwrap();
    let cluster = response.prediction.as_f64().unwrap();
    assert!(cluster >= 0.0 && cluster < 3.0 && cluster.fract() == 0.0);
}

// ============================================================================
// Explanations
// ============================================================================

#[test]
fn test_local_explanation_clamps_sample_index() {
    let state = app_state(None);
    // 250 rows with a 0.2 test fraction leaves 50 evaluation rows
    let id = state
        .scheduler
        .submit(regression_config(&[Algorithm::LinearRegression]), regression_data(250))
        .unwrap();
    wait(&state, &id);
    assert_eq!(state.artifacts.get_evaluation(&id).unwrap().n_samples(), 50);

    let report = state.explanations.local_explanation(&id, 99999, None).unwrap();
    assert_eq!(report.sample_index, 49);
    let session = state.sessions.get_full(&id).unwrap();
    let keys: Vec<&String> = report.shap_contributions.keys().collect();
    let mut expected: Vec<&String> = session.feature_names.iter().collect();
    expected.sort();
    assert_eq!(keys, expected);
    assert!(report.lime_explanation.is_some());
}

#[test]
fn test_global_importance_methods() {
    let state = app_state(None);
    let id = state
        .scheduler
        .submit(regression_config(&[Algorithm::LinearRegression]), regression_data(120))
        .unwrap();
    wait(&state, &id);
    let feature_names = state.sessions.get_full(&id).unwrap().feature_names;

    for method in [
        ImportanceMethod::Ensemble,
        ImportanceMethod::Shap,
        ImportanceMethod::Model,
        ImportanceMethod::Permutation,
    ] {
        let result = state.explanations.global_importance(&id, method, None).unwrap();
        assert_eq!(result.model_name, "LinearRegression");
        assert_eq!(result.importance.len(), feature_names.len(), "{}", method);
        assert!(result.importance.values().all(|v| v.is_finite()));
        assert!(result.importance["x1"] > result.importance["x2"], "{}", method);
    }

    let ensemble = state
        .explanations
        .global_importance(&id, ImportanceMethod::Ensemble, None)
        .unwrap();
    let mass: f64 = ensemble.importance.values().map(|v| v.abs()).sum();
    assert!((mass - 1.0).abs() < 1e-6);
}

#[test]
fn test_json_inputs_map_to_cells() {
    assert_eq!(CellValue::from_json(&json!(true)), CellValue::Number(1.0));
    assert!(CellValue::from_json(&json!("  ")).is_missing());
}
