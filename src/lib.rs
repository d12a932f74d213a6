//! AutoML pipeline - training-session orchestration for tabular data
//!
//! A training request selects a dataset, a target and a set of candidate
//! algorithms. The crate trains every candidate on a bounded worker pool,
//! isolates per-algorithm failures, ranks the survivors and serves
//! predictions and explanations from the stored artifacts.
//!
//! # Modules
//!
//! ## Orchestration
//! - [`session`] - Session store, training scheduler, results aggregator
//! - [`artifacts`] - Artifact registry (in-memory or filesystem)
//!
//! ## Core ML Modules
//! - [`data`] - CSV ingestion, column typing, dataset validation
//! - [`preprocessing`] - Imputation, scaling, encoding, train/test split
//! - [`training`] - Estimators, algorithm catalogue, metrics, cross-validation
//! - [`inference`] - Single-record prediction
//! - [`explainability`] - Shapley, permutation and LIME explanations
//!
//! ## Services
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

// Core error handling and settings
pub mod config;
pub mod error;

// Core ML modules
pub mod data;
pub mod preprocessing;
pub mod training;
pub mod inference;
pub mod explainability;

// Orchestration
pub mod artifacts;
pub mod session;

// Services
pub mod server;
pub mod cli;

pub use error::{PipelineError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::artifacts::{ArtifactStore, FsArtifactStore, MemoryArtifactStore, ModelArtifact};
    pub use crate::config::{ArtifactBackend, ExplainConfig, Settings};
    pub use crate::data::{CellValue, Column, Dataset, DatasetStore};
    pub use crate::error::{PipelineError, Result};
    pub use crate::explainability::{ExplainabilityService, ImportanceMethod};
    pub use crate::inference::PredictionService;
    pub use crate::session::{Session, SessionSnapshot, SessionStatus, SessionStore, TrainingScheduler};
    pub use crate::training::{
        Algorithm, EstimatorTrainer, ModelTrainer, ProblemType, TrainedModel, TrainingConfig,
    };
}
