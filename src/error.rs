//! Error types for the training pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Request rejected before any session was created
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Session exists but has not reached `completed`
    #[error("Session {session_id} is not ready (status: {status})")]
    NotReady { session_id: String, status: String },

    /// Write-once resource already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Preprocessing error: {0}")]
    PreprocessingError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Explainability error: {0}")]
    ExplainError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),
}

impl PipelineError {
    pub fn session_not_found(id: impl Into<String>) -> Self {
        PipelineError::NotFound { kind: "Session", id: id.into() }
    }

    pub fn model_not_found(id: impl Into<String>) -> Self {
        PipelineError::NotFound { kind: "Model", id: id.into() }
    }

    pub fn artifact_not_found(id: impl Into<String>) -> Self {
        PipelineError::NotFound { kind: "Artifact", id: id.into() }
    }

    pub fn dataset_not_found(id: impl Into<String>) -> Self {
        PipelineError::NotFound { kind: "Dataset", id: id.into() }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeError {
            expected: "consistent array shape".to_string(),
            actual: err.to_string(),
        }
    }
}
