//! Model explainability
//!
//! - Sampled Shapley contributions over a background sample
//! - Permutation feature importance
//! - LIME-style weighted ridge surrogates
//! - Session-level service combining them with native importances

mod importance;
mod lime;
mod local_explanations;
mod service;

pub use importance::{ImportanceResult, PermutationImportance};
pub use lime::{LimeExplainer, LimeExplanation, LimeFeature};
pub use local_explanations::{FeatureContribution, LocalExplainer, LocalExplanation};
pub use service::{ExplainabilityService, GlobalImportance, ImportanceMethod, LocalExplanationReport};
