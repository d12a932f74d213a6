//! Runtime settings
//!
//! Every field can be overridden through an environment variable; unset or
//! unparsable variables fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where model artifacts are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactBackend {
    Memory,
    Fs,
}

/// Application-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub model_dir: PathBuf,
    pub max_upload_size: usize,
    /// Size of the training worker pool shared by all sessions
    pub max_workers: usize,
    pub default_test_size: f64,
    pub default_random_state: u64,
    pub default_cv_folds: usize,
    /// Text columns with more distinct values than this are flagged by validation
    pub max_categorical_unique: usize,
    pub artifact_backend: ArtifactBackend,
    pub explain: ExplainConfig,
}

/// Knobs for the explainability service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainConfig {
    /// Evaluation rows averaged for global SHAP importance
    pub shap_max_samples: usize,
    /// Permutations per Shapley estimate
    pub shap_permutations: usize,
    /// Background rows kept per session
    pub background_size: usize,
    pub permutation_repeats: usize,
    pub lime_samples: usize,
    pub lime_top_features: usize,
    pub seed: u64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            shap_max_samples: 50,
            shap_permutations: 32,
            background_size: 50,
            permutation_repeats: 5,
            lime_samples: 500,
            lime_top_features: 10,
            seed: 42,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Settings {
    fn default() -> Self {
        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(2);

        let artifact_backend = match std::env::var("ARTIFACT_BACKEND").as_deref() {
            Ok("fs") | Ok("filesystem") => ArtifactBackend::Fs,
            _ => ArtifactBackend::Memory,
        };

        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("API_PORT", 8000),
            upload_dir: PathBuf::from(
                std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            ),
            model_dir: PathBuf::from(
                std::env::var("MODEL_DIR").unwrap_or_else(|_| "./models".to_string()),
            ),
            max_upload_size: env_or("MAX_UPLOAD_SIZE", 100 * 1024 * 1024),
            max_workers: env_or("MAX_TRAINING_WORKERS", default_workers).max(1),
            default_test_size: env_or("DEFAULT_TEST_SIZE", 0.2),
            default_random_state: env_or("DEFAULT_RANDOM_STATE", 42),
            default_cv_folds: env_or("DEFAULT_CV_FOLDS", 5),
            max_categorical_unique: env_or("MAX_CATEGORICAL_UNIQUE", 20),
            artifact_backend,
            explain: ExplainConfig::default(),
        }
    }
}

impl Settings {
    /// Settings for tests and embedded use: in-memory artifacts, temp directories
    pub fn ephemeral(max_workers: usize) -> Self {
        let base = std::env::temp_dir().join(format!("automl-{}", uuid::Uuid::new_v4()));
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            upload_dir: base.join("uploads"),
            model_dir: base.join("models"),
            max_upload_size: 10 * 1024 * 1024,
            max_workers: max_workers.max(1),
            default_test_size: 0.2,
            default_random_state: 42,
            default_cv_folds: 5,
            max_categorical_unique: 20,
            artifact_backend: ArtifactBackend::Memory,
            explain: ExplainConfig::default(),
        }
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_settings() {
        let s = Settings::ephemeral(0);
        assert_eq!(s.max_workers, 1);
        assert_eq!(s.artifact_backend, ArtifactBackend::Memory);
        assert_eq!(s.default_cv_folds, 5);
        assert!((s.default_test_size - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_env_or_falls_back() {
        let v: usize = env_or("AUTOML_TEST_UNSET_VARIABLE_XYZ", 7);
        assert_eq!(v, 7);
    }
}
