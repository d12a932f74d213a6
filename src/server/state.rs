//! Application state shared across handlers

use std::sync::Arc;

use crate::artifacts::{self, ArtifactStore};
use crate::config::Settings;
use crate::data::DatasetStore;
use crate::error::Result;
use crate::explainability::ExplainabilityService;
use crate::inference::PredictionService;
use crate::session::{SessionStore, TrainingScheduler};

/// Created once at start-up and dropped at shutdown
pub struct AppState {
    pub settings: Settings,
    pub datasets: DatasetStore,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub sessions: Arc<SessionStore>,
    pub scheduler: TrainingScheduler,
    pub predictions: PredictionService,
    pub explanations: ExplainabilityService,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self> {
        let artifacts = artifacts::from_settings(&settings)?;
        Self::with_artifacts(settings, artifacts)
    }

    pub fn with_artifacts(settings: Settings, artifacts: Arc<dyn ArtifactStore>) -> Result<Self> {
        let sessions = Arc::new(SessionStore::new(Arc::clone(&artifacts)));
        let scheduler = TrainingScheduler::new(&settings, Arc::clone(&sessions), Arc::clone(&artifacts))?;
        let predictions = PredictionService::new(Arc::clone(&sessions), Arc::clone(&artifacts));
        let explanations =
            ExplainabilityService::new(Arc::clone(&sessions), Arc::clone(&artifacts), settings.explain.clone());
        Ok(Self {
            settings,
            datasets: DatasetStore::new(),
            artifacts,
            sessions,
            scheduler,
            predictions,
            explanations,
            started_at: chrono::Utc::now(),
        })
    }

    /// Swap the scheduler, e.g. to plug in a different trainer
    pub fn with_scheduler(mut self, scheduler: TrainingScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }
}
