//! Training sessions
//!
//! A session is one training request and everything derived from it: its
//! status, the models that finished (in completion order), their results and
//! the terminal outcome. The [`SessionStore`] owns sessions, the
//! [`TrainingScheduler`] drives them and the [`aggregator`] ranks their results.

pub mod aggregator;
mod scheduler;
mod store;

pub use scheduler::TrainingScheduler;
pub use store::SessionStore;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifacts::ArtifactRef;
use crate::training::{MetricMap, ProblemType, TrainingConfig};

/// Lifecycle: pending → running → completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics and timings of one successfully trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    pub model_name: String,
    pub metrics: MetricMap,
    /// Seconds
    pub training_time: f64,
    pub cv_mean: f64,
    pub cv_std: f64,
    pub cv_scores: Vec<f64>,
    pub artifact: ArtifactRef,
}

/// Full copy of a session
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: String,
    pub status: SessionStatus,
    pub config: TrainingConfig,
    pub total_models: usize,
    pub completed_models: Vec<String>,
    pub results: BTreeMap<String, ModelResult>,
    pub failures: BTreeMap<String, String>,
    pub best_model: Option<String>,
    pub error: Option<String>,
    pub feature_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn problem_type(&self) -> ProblemType {
        self.config.problem_type
    }

    /// Results best-first
    pub fn leaderboard(&self) -> Vec<&ModelResult> {
        aggregator::rank(self.config.problem_type, self.results.values())
    }
}

/// Progress view returned to pollers
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub completed_models: Arc<Vec<String>>,
    pub total_models: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Arc<str>>,
}

/// One row of the session listing
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub problem_type: ProblemType,
    pub file_id: String,
    pub total_models: usize,
    pub completed_models: usize,
    pub best_model: Option<String>,
    pub created_at: DateTime<Utc>,
}
