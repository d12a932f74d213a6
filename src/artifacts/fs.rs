//! Filesystem artifact store
//!
//! Layout: `<root>/<session_id>/<model_name>.json` plus
//! `<root>/<session_id>/_evaluation.json`.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use super::{artifact_key, conflict, ArtifactRef, ArtifactStore, EvaluationSet, ModelArtifact};
use crate::error::{PipelineError, Result};

const EVALUATION_FILE: &str = "_evaluation.json";

/// Artifacts serialized as JSON files under a root directory
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self { root: root.as_ref().to_path_buf() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ids and model names become path components, so only plain names are allowed
    fn component(value: &str) -> Option<&str> {
        let ok = !value.is_empty()
            && value != "."
            && value != ".."
            && !value.starts_with('_')
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        ok.then_some(value)
    }

    fn session_dir(&self, session_id: &str) -> Option<PathBuf> {
        Self::component(session_id).map(|s| self.root.join(s))
    }

    fn model_path(&self, session_id: &str, model_name: &str) -> Option<PathBuf> {
        let dir = self.session_dir(session_id)?;
        Self::component(model_name).map(|m| dir.join(format!("{}.json", m)))
    }

    /// Create-new write: an existing file means the key is taken
    fn write_new<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.write_all(&serde_json::to_vec(value)?)?;
        file.sync_all()?;
        Ok(true)
    }

    fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, artifact: ModelArtifact) -> Result<ArtifactRef> {
        let reference = artifact.reference();
        let path = self
            .model_path(&reference.session_id, &reference.model_name)
            .ok_or_else(|| {
                PipelineError::ValidationError(format!(
                    "Invalid artifact key {}",
                    artifact_key(&reference.session_id, &reference.model_name)
                ))
            })?;
        if !Self::write_new(&path, &artifact)? {
            return Err(conflict(&reference.session_id, &reference.model_name));
        }
        Ok(reference)
    }

    fn get(&self, session_id: &str, model_name: &str) -> Result<Arc<ModelArtifact>> {
        let not_found = || PipelineError::artifact_not_found(artifact_key(session_id, model_name));
        let path = self.model_path(session_id, model_name).ok_or_else(not_found)?;
        Self::read::<ModelArtifact>(&path)?.map(Arc::new).ok_or_else(not_found)
    }

    fn list(&self, session_id: &str) -> Vec<String> {
        let Some(dir) = self.session_dir(session_id) else {
            return Vec::new();
        };
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| name != EVALUATION_FILE)
            .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
            .collect();
        names.sort();
        names
    }

    fn put_evaluation(&self, session_id: &str, evaluation: EvaluationSet) -> Result<()> {
        let dir = self.session_dir(session_id).ok_or_else(|| {
            PipelineError::ValidationError(format!("Invalid session id {}", session_id))
        })?;
        if !Self::write_new(&dir.join(EVALUATION_FILE), &evaluation)? {
            return Err(conflict(session_id, "evaluation"));
        }
        Ok(())
    }

    fn get_evaluation(&self, session_id: &str) -> Result<Arc<EvaluationSet>> {
        let not_found = || PipelineError::artifact_not_found(artifact_key(session_id, "evaluation"));
        let dir = self.session_dir(session_id).ok_or_else(not_found)?;
        Self::read::<EvaluationSet>(&dir.join(EVALUATION_FILE))?
            .map(Arc::new)
            .ok_or_else(not_found)
    }

    fn delete_session(&self, session_id: &str) -> Result<()> {
        let Some(dir) = self.session_dir(session_id) else {
            return Ok(());
        };
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to remove artifact directory");
                Err(e.into())
            }
        }
    }
}
