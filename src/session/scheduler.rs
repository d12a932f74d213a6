//! Training scheduler
//!
//! Every session is driven by its own lightweight thread that prepares the
//! data once, then fans one task per algorithm out to a worker pool shared by
//! all sessions. Pool size comes from settings, not from the algorithm count.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use ndarray::Axis;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use super::{ModelResult, SessionStatus, SessionStore};
use crate::artifacts::{ArtifactStore, EvaluationSet, ModelArtifact};
use crate::config::Settings;
use crate::data::Dataset;
use crate::error::{PipelineError, Result};
use crate::preprocessing::{prepare_session_data, PreparedData};
use crate::training::{Algorithm, EstimatorTrainer, ModelTrainer, TrainingConfig};

/// Runs every algorithm of a session under bounded concurrency
#[derive(Clone)]
pub struct TrainingScheduler {
    pool: Arc<ThreadPool>,
    sessions: Arc<SessionStore>,
    artifacts: Arc<dyn ArtifactStore>,
    trainer: Arc<dyn ModelTrainer>,
    background_size: usize,
}

impl TrainingScheduler {
    pub fn new(
        settings: &Settings,
        sessions: Arc<SessionStore>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.max_workers.max(1))
            .thread_name(|i| format!("training-worker-{}", i))
            .build()
            .map_err(|e| PipelineError::ThreadPoolError(e.to_string()))?;
        Ok(Self {
            pool: Arc::new(pool),
            sessions,
            artifacts,
            trainer: Arc::new(EstimatorTrainer),
            background_size: settings.explain.background_size.max(1),
        })
    }

    /// Replace the trainer used for every task
    pub fn with_trainer(mut self, trainer: Arc<dyn ModelTrainer>) -> Self {
        self.trainer = trainer;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Validate the request, create a pending session and start training in
    /// the background. Validation failures create no session.
    pub fn submit(&self, config: TrainingConfig, data: Arc<Dataset>) -> Result<String> {
        let config = config.resolve(&data)?;
        let session_id = self.sessions.create(config.clone());
        info!(
            session_id = %session_id,
            problem_type = %config.problem_type,
            models = config.total_models(),
            "Training session submitted"
        );

        let driver = self.clone();
        let id = session_id.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("session-{}", &session_id[..8.min(session_id.len())]))
            .spawn(move || driver.run_session(&id, &config, &data));
        if let Err(e) = spawned {
            let message = format!("Failed to start training: {}", e);
            self.sessions.fail(&session_id, message.clone())?;
            return Err(PipelineError::ThreadPoolError(message));
        }
        Ok(session_id)
    }

    /// Drive one session to a terminal state on the calling thread
    pub fn run_session(&self, session_id: &str, config: &TrainingConfig, data: &Dataset) {
        let start = Instant::now();
        match self.execute(session_id, config, data) {
            Ok(Some(status)) => info!(
                session_id = %session_id,
                status = %status,
                elapsed_secs = start.elapsed().as_secs_f64(),
                "Training session finished"
            ),
            Ok(None) => {
                debug!(session_id = %session_id, "Session deleted while training");
                self.discard(session_id);
            }
            Err(e) => warn!(session_id = %session_id, error = %e, "Training session aborted"),
        }
    }

    /// `Ok(None)` when the session disappeared underneath us
    fn execute(
        &self,
        session_id: &str,
        config: &TrainingConfig,
        data: &Dataset,
    ) -> Result<Option<SessionStatus>> {
        if !self.sessions.contains(session_id) {
            return Ok(None);
        }
        self.sessions.mark_running(session_id)?;

        let prepared = match prepare_session_data(data, config) {
            Ok(prepared) => Arc::new(prepared),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Data preparation failed");
                self.sessions.fail(session_id, e.to_string())?;
                return Ok(Some(SessionStatus::Failed));
            }
        };
        if self
            .sessions
            .set_feature_names(session_id, prepared.feature_names())
            .is_err()
        {
            return Ok(None);
        }

        if let Err(e) = self
            .artifacts
            .put_evaluation(session_id, self.evaluation_set(&prepared, config.random_state))
        {
            warn!(session_id = %session_id, error = %e, "Failed to store evaluation set");
            self.sessions
                .fail(session_id, format!("Failed to store evaluation set: {}", e))?;
            return Ok(Some(SessionStatus::Failed));
        }
        if !self.sessions.contains(session_id) {
            return Ok(None);
        }

        self.pool.scope(|scope| {
            for &algorithm in &config.algorithms {
                let prepared = Arc::clone(&prepared);
                scope.spawn(move |_| self.run_task(session_id, algorithm, &prepared));
            }
        });

        match self.sessions.finalize(session_id) {
            Ok(status) => Ok(Some(status)),
            Err(PipelineError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Held-out rows plus a seeded sample of training rows for explanations
    fn evaluation_set(&self, prepared: &PreparedData, seed: u64) -> EvaluationSet {
        let n_train = prepared.x_train.nrows();
        let k = self.background_size.min(n_train);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut rows = rand::seq::index::sample(&mut rng, n_train, k).into_vec();
        rows.sort_unstable();
        EvaluationSet {
            x_test: prepared.x_test.clone(),
            y_test: prepared.y_test.clone(),
            background: prepared.x_train.select(Axis(0), &rows),
        }
    }

    fn run_task(&self, session_id: &str, algorithm: Algorithm, prepared: &Arc<PreparedData>) {
        let model = algorithm.name();
        debug!(session_id = %session_id, model = %model, "Training task started");
        let start = Instant::now();

        let outcome = catch_unwind(AssertUnwindSafe(|| self.trainer.train(algorithm, prepared)))
            .unwrap_or_else(|panic| {
                Err(PipelineError::TrainingError(format!(
                    "training panicked: {}",
                    panic_message(panic.as_ref())
                )))
            })
            .and_then(|outcome| {
                let artifact = ModelArtifact::new(
                    session_id,
                    algorithm,
                    prepared.problem_type,
                    outcome.model,
                    Arc::clone(&prepared.transformer),
                );
                let reference = self.artifacts.put(artifact)?;
                Ok(ModelResult {
                    model_name: model.to_string(),
                    metrics: outcome.metrics,
                    training_time: outcome.training_time,
                    cv_mean: outcome.cv.mean,
                    cv_std: outcome.cv.std,
                    cv_scores: outcome.cv.scores,
                    artifact: reference,
                })
            });

        let recorded = match outcome {
            Ok(result) => {
                info!(
                    session_id = %session_id,
                    model = %model,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "Model trained"
                );
                self.sessions.record_success(session_id, result)
            }
            Err(e) => {
                warn!(session_id = %session_id, model = %model, error = %e, "Model training failed");
                self.sessions.record_failure(session_id, model, e.to_string())
            }
        };

        if let Err(PipelineError::NotFound { .. }) = recorded {
            self.discard(session_id);
        } else if let Err(e) = recorded {
            warn!(session_id = %session_id, model = %model, error = %e, "Failed to record model outcome");
        }
    }

    /// Remove artifacts written after the session was deleted
    fn discard(&self, session_id: &str) {
        if let Err(e) = self.artifacts.delete_session(session_id) {
            warn!(session_id = %session_id, error = %e, "Failed to discard artifacts");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::MemoryArtifactStore;
    use crate::data::Column;
    use crate::training::{ProblemType, TrainingOutcome};
    use std::time::Duration;

    fn dataset() -> Arc<Dataset> {
        let x: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v + 1.0).collect();
        Arc::new(Dataset::new(vec![Column::numeric("x", &x), Column::numeric("y", &y)]).unwrap())
    }

    fn scheduler(trainer: Option<Arc<dyn ModelTrainer>>) -> (TrainingScheduler, Arc<SessionStore>, Arc<dyn ArtifactStore>) {
        let settings = Settings::ephemeral(2);
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
        let sessions = Arc::new(SessionStore::new(Arc::clone(&artifacts)));
        let mut scheduler = TrainingScheduler::new(&settings, Arc::clone(&sessions), Arc::clone(&artifacts)).unwrap();
        if let Some(trainer) = trainer {
            scheduler = scheduler.with_trainer(trainer);
        }
        (scheduler, sessions, artifacts)
    }

    struct PanickingTrainer;

    impl ModelTrainer for PanickingTrainer {
        fn train(&self, algorithm: Algorithm, data: &PreparedData) -> Result<TrainingOutcome> {
            if algorithm == Algorithm::Ridge {
                panic!("ridge exploded");
            }
            EstimatorTrainer.train(algorithm, data)
        }
    }

    #[test]
    fn test_run_session_records_every_model() {
        let (scheduler, sessions, artifacts) = scheduler(None);
        let config = TrainingConfig::new("f", ProblemType::Regression)
            .with_target("y")
            .with_algorithms([Algorithm::LinearRegression, Algorithm::Ridge])
            .with_cv_folds(3);
        let id = scheduler.submit(config, dataset()).unwrap();
        let snapshot = sessions
            .wait_for_terminal(&id, Duration::from_millis(10), Duration::from_secs(60))
            .unwrap();
        assert_eq!(snapshot.status, SessionStatus::Completed);
        assert_eq!(snapshot.completed_models.len(), 2);
        assert_eq!(artifacts.list(&id), vec!["LinearRegression", "Ridge"]);
        assert!(artifacts.get_evaluation(&id).unwrap().n_samples() > 0);
        assert_eq!(sessions.get_full(&id).unwrap().feature_names, vec!["x"]);
    }

    #[test]
    fn test_panic_is_isolated() {
        let (scheduler, sessions, _) = scheduler(Some(Arc::new(PanickingTrainer)));
        let config = TrainingConfig::new("f", ProblemType::Regression)
            .with_target("y")
            .with_algorithms([Algorithm::LinearRegression, Algorithm::Ridge])
            .with_cv_folds(3);
        let id = scheduler.submit(config, dataset()).unwrap();
        sessions
            .wait_for_terminal(&id, Duration::from_millis(10), Duration::from_secs(60))
            .unwrap();
        let session = sessions.get_full(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.best_model.as_deref(), Some("LinearRegression"));
        assert!(session.failures["Ridge"].contains("ridge exploded"));
    }

    #[test]
    fn test_invalid_config_creates_no_session() {
        let (scheduler, sessions, _) = scheduler(None);
        let config = TrainingConfig::new("f", ProblemType::Regression)
            .with_target("missing")
            .with_algorithms([Algorithm::LinearRegression]);
        assert!(matches!(
            scheduler.submit(config, dataset()),
            Err(PipelineError::ValidationError(_))
        ));
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_preparation_failure_fails_session() {
        let (scheduler, sessions, _) = scheduler(None);
        // 5 rows cannot feed 5 folds after the split
        let data = Arc::new(
            Dataset::new(vec![
                Column::numeric("x", &[1.0, 2.0, 3.0, 4.0, 5.0]),
                Column::numeric("y", &[1.0, 2.0, 3.0, 4.0, 5.0]),
            ])
            .unwrap(),
        );
        let config = TrainingConfig::new("f", ProblemType::Regression)
            .with_target("y")
            .with_algorithms([Algorithm::LinearRegression]);
        let id = scheduler.submit(config, data).unwrap();
        let snapshot = sessions
            .wait_for_terminal(&id, Duration::from_millis(10), Duration::from_secs(60))
            .unwrap();
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert!(snapshot.error.is_some());
    }
}
