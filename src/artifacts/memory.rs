//! In-process artifact store

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{artifact_key, conflict, ArtifactRef, ArtifactStore, EvaluationSet, ModelArtifact};
use crate::error::{PipelineError, Result};

#[derive(Default)]
struct SessionArtifacts {
    models: BTreeMap<String, Arc<ModelArtifact>>,
    evaluation: Option<Arc<EvaluationSet>>,
}

/// Artifacts held in memory for the lifetime of the process
#[derive(Default)]
pub struct MemoryArtifactStore {
    sessions: RwLock<HashMap<String, SessionArtifacts>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, artifact: ModelArtifact) -> Result<ArtifactRef> {
        let reference = artifact.reference();
        let mut sessions = self.sessions.write();
        let entry = sessions.entry(reference.session_id.clone()).or_default();
        if entry.models.contains_key(&reference.model_name) {
            return Err(conflict(&reference.session_id, &reference.model_name));
        }
        entry.models.insert(reference.model_name.clone(), Arc::new(artifact));
        Ok(reference)
    }

    fn get(&self, session_id: &str, model_name: &str) -> Result<Arc<ModelArtifact>> {
        self.sessions
            .read()
            .get(session_id)
            .and_then(|s| s.models.get(model_name))
            .cloned()
            .ok_or_else(|| PipelineError::artifact_not_found(artifact_key(session_id, model_name)))
    }

    fn list(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .read()
            .get(session_id)
            .map(|s| s.models.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn put_evaluation(&self, session_id: &str, evaluation: EvaluationSet) -> Result<()> {
        let mut sessions = self.sessions.write();
        let entry = sessions.entry(session_id.to_string()).or_default();
        if entry.evaluation.is_some() {
            return Err(conflict(session_id, "evaluation"));
        }
        entry.evaluation = Some(Arc::new(evaluation));
        Ok(())
    }

    fn get_evaluation(&self, session_id: &str) -> Result<Arc<EvaluationSet>> {
        self.sessions
            .read()
            .get(session_id)
            .and_then(|s| s.evaluation.clone())
            .ok_or_else(|| PipelineError::artifact_not_found(artifact_key(session_id, "evaluation")))
    }

    fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions.write().remove(session_id);
        Ok(())
    }
}
