//! Prediction against finalized sessions
//!
//! Artifacts are only served once their session has completed. A request can
//! name any successfully trained model; otherwise the session's best model is
//! used.

mod prediction;

pub use prediction::{PredictionRequest, PredictionResponse, PredictionService};

use std::sync::Arc;

use crate::artifacts::{ArtifactStore, ModelArtifact};
use crate::error::{PipelineError, Result};
use crate::session::{Session, SessionStore};

/// Look up a completed session and the artifact of the requested (or best) model
pub fn resolve_artifact(
    sessions: &SessionStore,
    artifacts: &dyn ArtifactStore,
    session_id: &str,
    model_name: Option<&str>,
) -> Result<(Session, Arc<ModelArtifact>)> {
    let session = sessions.require_completed(session_id)?;
    let name = match model_name.map(str::trim).filter(|m| !m.is_empty()) {
        Some(name) => name.to_string(),
        None => session
            .best_model
            .clone()
            .ok_or_else(|| PipelineError::model_not_found(format!("{}/<best>", session_id)))?,
    };
    if !session.results.contains_key(&name) {
        return Err(PipelineError::model_not_found(format!("{}/{}", session_id, name)));
    }
    let artifact = artifacts.get(session_id, &name)?;
    Ok((session, artifact))
}
