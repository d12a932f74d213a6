//! Thread-safe session table
//!
//! The outer map lock is held only to look up, insert or remove a session;
//! every mutation of a session happens under that session's own lock, so
//! unrelated sessions never contend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{aggregator, ModelResult, Session, SessionSnapshot, SessionStatus, SessionSummary};
use crate::artifacts::ArtifactStore;
use crate::error::{PipelineError, Result};
use crate::training::TrainingConfig;

struct SessionState {
    status: SessionStatus,
    config: TrainingConfig,
    total_models: usize,
    /// Copy-on-write so snapshots are a pointer clone
    completed_models: Arc<Vec<String>>,
    results: BTreeMap<String, ModelResult>,
    failures: BTreeMap<String, String>,
    best_model: Option<String>,
    /// Shared with snapshots
    error: Option<Arc<str>>,
    feature_names: Vec<String>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            completed_models: Arc::clone(&self.completed_models),
            total_models: self.total_models,
            error: self.error.clone(),
        }
    }

    fn terminate(&mut self, status: SessionStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

type SessionCell = Arc<RwLock<SessionState>>;

/// Authoritative record of every live session
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionCell>>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl SessionStore {
    pub fn new(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            artifacts,
        }
    }

    fn cell(&self, session_id: &str) -> Result<SessionCell> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PipelineError::session_not_found(session_id))
    }

    /// Register a pending session expecting one model per configured algorithm
    pub fn create(&self, config: TrainingConfig) -> String {
        let session_id = Uuid::new_v4().to_string();
        let state = SessionState {
            status: SessionStatus::Pending,
            total_models: config.total_models(),
            config,
            completed_models: Arc::new(Vec::new()),
            results: BTreeMap::new(),
            failures: BTreeMap::new(),
            best_model: None,
            error: None,
            feature_names: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        };
        self.sessions
            .write()
            .insert(session_id.clone(), Arc::new(RwLock::new(state)));
        debug!(session_id = %session_id, "Session created");
        session_id
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    pub fn mark_running(&self, session_id: &str) -> Result<()> {
        let cell = self.cell(session_id)?;
        let mut state = cell.write();
        if state.status != SessionStatus::Pending {
            return Err(PipelineError::ValidationError(format!(
                "Session {} cannot start from status {}",
                session_id, state.status
            )));
        }
        state.status = SessionStatus::Running;
        debug!(session_id = %session_id, "Session running");
        Ok(())
    }

    pub fn set_feature_names(&self, session_id: &str, names: Vec<String>) -> Result<()> {
        self.cell(session_id)?.write().feature_names = names;
        Ok(())
    }

    /// Append the model to `completed_models` and store its result in one step
    pub fn record_success(&self, session_id: &str, result: ModelResult) -> Result<()> {
        let cell = self.cell(session_id)?;
        let mut state = cell.write();
        if state.status.is_terminal() {
            warn!(session_id = %session_id, model = %result.model_name, "Result after session finished ignored");
            return Ok(());
        }
        let name = result.model_name.clone();
        if state.results.contains_key(&name) || state.failures.contains_key(&name) {
            return Err(PipelineError::Conflict(format!(
                "Model {} already recorded for session {}",
                name, session_id
            )));
        }
        Arc::make_mut(&mut state.completed_models).push(name.clone());
        state.results.insert(name.clone(), result);
        debug!(session_id = %session_id, model = %name, "Model result recorded");
        Ok(())
    }

    pub fn record_failure(&self, session_id: &str, model_name: &str, error: impl Into<String>) -> Result<()> {
        let cell = self.cell(session_id)?;
        let mut state = cell.write();
        if state.status.is_terminal() {
            return Ok(());
        }
        state.failures.insert(model_name.to_string(), error.into());
        debug!(session_id = %session_id, model = %model_name, "Model failure recorded");
        Ok(())
    }

    /// Unrecoverable setup error: the session fails without any model
    pub fn fail(&self, session_id: &str, error: impl Into<String>) -> Result<()> {
        let cell = self.cell(session_id)?;
        let mut state = cell.write();
        if state.status.is_terminal() {
            return Ok(());
        }
        let error: String = error.into();
        state.error = Some(Arc::from(error));
        state.best_model = None;
        state.terminate(SessionStatus::Failed);
        debug!(session_id = %session_id, "Session failed");
        Ok(())
    }

    /// Pick the best model once every task has terminated
    pub fn finalize(&self, session_id: &str) -> Result<SessionStatus> {
        let cell = self.cell(session_id)?;
        let mut state = cell.write();
        if state.status.is_terminal() {
            return Ok(state.status);
        }
        match aggregator::best_model(state.config.problem_type, state.results.values()) {
            Some(best) => {
                state.best_model = Some(best);
                state.terminate(SessionStatus::Completed);
            }
            None => {
                let details = if state.failures.is_empty() {
                    "no models were trained".to_string()
                } else {
                    state
                        .failures
                        .iter()
                        .map(|(model, err)| format!("{}: {}", model, err))
                        .collect::<Vec<_>>()
                        .join("; ")
                };
                state.error = Some(Arc::from(format!(
                    "All {} models failed to train ({})",
                    state.total_models, details
                )));
                state.terminate(SessionStatus::Failed);
            }
        }
        debug!(session_id = %session_id, status = %state.status, "Session finalized");
        Ok(state.status)
    }

    /// Progress view; never copies the model list
    pub fn get_snapshot(&self, session_id: &str) -> Result<SessionSnapshot> {
        Ok(self.cell(session_id)?.read().snapshot())
    }

    pub fn get_full(&self, session_id: &str) -> Result<Session> {
        let cell = self.cell(session_id)?;
        let state = cell.read();
        Ok(Session {
            session_id: session_id.to_string(),
            status: state.status,
            config: state.config.clone(),
            total_models: state.total_models,
            completed_models: state.completed_models.as_ref().clone(),
            results: state.results.clone(),
            failures: state.failures.clone(),
            best_model: state.best_model.clone(),
            error: state.error.as_deref().map(str::to_string),
            feature_names: state.feature_names.clone(),
            created_at: state.created_at,
            finished_at: state.finished_at,
        })
    }

    /// Full session, or `NotReady` unless it completed
    pub fn require_completed(&self, session_id: &str) -> Result<Session> {
        let session = self.get_full(session_id)?;
        if session.status != SessionStatus::Completed {
            return Err(PipelineError::NotReady {
                session_id: session_id.to_string(),
                status: session.status.to_string(),
            });
        }
        Ok(session)
    }

    /// Remove the session and its artifacts. Returns whether it existed.
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        let existed = self.sessions.write().remove(session_id).is_some();
        self.artifacts.delete_session(session_id)?;
        if existed {
            debug!(session_id = %session_id, "Session deleted");
        }
        Ok(existed)
    }

    /// Summaries, newest first
    pub fn list(&self) -> Vec<SessionSummary> {
        let cells: Vec<(String, SessionCell)> = self
            .sessions
            .read()
            .iter()
            .map(|(id, cell)| (id.clone(), Arc::clone(cell)))
            .collect();
        let mut summaries: Vec<SessionSummary> = cells
            .into_iter()
            .map(|(session_id, cell)| {
                let state = cell.read();
                SessionSummary {
                    session_id,
                    status: state.status,
                    problem_type: state.config.problem_type,
                    file_id: state.config.file_id.clone(),
                    total_models: state.total_models,
                    completed_models: state.completed_models.len(),
                    best_model: state.best_model.clone(),
                    created_at: state.created_at,
                }
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        summaries
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poll until the session is terminal or `timeout` elapses.
    ///
    /// Giving up returns the last snapshot; training keeps running.
    pub fn wait_for_terminal(
        &self,
        session_id: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<SessionSnapshot> {
        let start = Instant::now();
        loop {
            let snapshot = self.get_snapshot(session_id)?;
            if snapshot.status.is_terminal() || start.elapsed() >= timeout {
                return Ok(snapshot);
            }
            std::thread::sleep(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactRef, MemoryArtifactStore};
    use crate::training::{Algorithm, MetricMap, ProblemType};

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryArtifactStore::new()))
    }

    fn config() -> TrainingConfig {
        TrainingConfig::new("file", ProblemType::Regression)
            .with_target("y")
            .with_algorithms([Algorithm::LinearRegression, Algorithm::Ridge, Algorithm::Lasso])
    }

    fn result(session_id: &str, name: &str, r2: f64) -> ModelResult {
        let mut metrics = MetricMap::new();
        metrics.insert("r2".to_string(), r2);
        ModelResult {
            model_name: name.to_string(),
            metrics,
            training_time: 0.01,
            cv_mean: r2,
            cv_std: 0.0,
            cv_scores: vec![r2],
            artifact: ArtifactRef {
                session_id: session_id.to_string(),
                model_name: name.to_string(),
            },
        }
    }

    #[test]
    fn test_lifecycle_with_partial_failure() {
        let store = store();
        let id = store.create(config());
        assert_eq!(store.get_snapshot(&id).unwrap().status, SessionStatus::Pending);
        store.mark_running(&id).unwrap();

        store.record_success(&id, result(&id, "Ridge", 0.7)).unwrap();
        store.record_failure(&id, "Lasso", "boom").unwrap();
        store.record_success(&id, result(&id, "LinearRegression", 0.9)).unwrap();

        let snapshot = store.get_snapshot(&id).unwrap();
        assert_eq!(*snapshot.completed_models, vec!["Ridge", "LinearRegression"]);
        assert_eq!(snapshot.total_models, 3);

        assert_eq!(store.finalize(&id).unwrap(), SessionStatus::Completed);
        let session = store.get_full(&id).unwrap();
        assert_eq!(session.best_model.as_deref(), Some("LinearRegression"));
        assert_eq!(session.failures.get("Lasso").map(String::as_str), Some("boom"));
        assert!(session.error.is_none());
        assert!(session.finished_at.is_some());
    }

    #[test]
    fn test_all_failures_fail_the_session() {
        let store = store();
        let id = store.create(config());
        store.mark_running(&id).unwrap();
        for name in ["LinearRegression", "Ridge", "Lasso"] {
            store.record_failure(&id, name, "bad").unwrap();
        }
        assert_eq!(store.finalize(&id).unwrap(), SessionStatus::Failed);
        let session = store.get_full(&id).unwrap();
        assert!(session.best_model.is_none());
        assert!(session.results.is_empty());
        assert!(session.error.unwrap().contains("All 3 models failed"));
    }

    #[test]
    fn test_snapshot_shares_model_list() {
        let store = store();
        let id = store.create(config());
        store.mark_running(&id).unwrap();
        store.record_success(&id, result(&id, "Ridge", 0.5)).unwrap();
        let a = store.get_snapshot(&id).unwrap();
        let b = store.get_snapshot(&id).unwrap();
        assert!(Arc::ptr_eq(&a.completed_models, &b.completed_models));

        store.record_success(&id, result(&id, "Lasso", 0.4)).unwrap();
        assert_eq!(a.completed_models.len(), 1);
        assert_eq!(store.get_snapshot(&id).unwrap().completed_models.len(), 2);
    }

    #[test]
    fn test_duplicate_result_rejected() {
        let store = store();
        let id = store.create(config());
        store.record_success(&id, result(&id, "Ridge", 0.5)).unwrap();
        assert!(matches!(
            store.record_success(&id, result(&id, "Ridge", 0.6)),
            Err(PipelineError::Conflict(_))
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = store();
        let id = store.create(config());
        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(matches!(store.get_full(&id), Err(PipelineError::NotFound { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_require_completed() {
        let store = store();
        let id = store.create(config());
        assert!(matches!(store.require_completed(&id), Err(PipelineError::NotReady { .. })));
        assert!(matches!(store.require_completed("nope"), Err(PipelineError::NotFound { .. })));
    }

    #[test]
    fn test_fail_is_terminal() {
        let store = store();
        let id = store.create(config());
        store.fail(&id, "dataset unreadable").unwrap();
        store.record_success(&id, result(&id, "Ridge", 0.5)).unwrap();
        assert_eq!(store.finalize(&id).unwrap(), SessionStatus::Failed);
        let session = store.get_full(&id).unwrap();
        assert!(session.results.is_empty());
        assert_eq!(session.error.as_deref(), Some("dataset unreadable"));
    }

    #[test]
    fn test_failed_snapshots_share_error() {
        let store = store();
        let id = store.create(config());
        store.fail(&id, "dataset unreadable").unwrap();
        let a = store.get_snapshot(&id).unwrap();
        let b = store.get_snapshot(&id).unwrap();
        assert!(Arc::ptr_eq(a.error.as_ref().unwrap(), b.error.as_ref().unwrap()));
        assert_eq!(serde_json::to_value(&a).unwrap()["error"], "dataset unreadable");
    }

    #[test]
    fn test_wait_for_terminal_gives_up() {
        let store = store();
        let id = store.create(config());
        let snapshot = store
            .wait_for_terminal(&id, Duration::from_millis(1), Duration::from_millis(5))
            .unwrap();
        assert_eq!(snapshot.status, SessionStatus::Pending);
    }

    #[test]
    fn test_list_summaries() {
        let store = store();
        let a = store.create(config());
        let b = store.create(config());
        let ids: Vec<String> = store.list().into_iter().map(|s| s.session_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));
    }
}
