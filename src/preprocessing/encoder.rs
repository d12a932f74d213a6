//! Categorical encoders

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One-hot encoder for a single column; unknown categories encode as all zeros
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    /// Sorted distinct categories seen at fit time
    pub categories: Vec<String>,
}

impl OneHotEncoder {
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let categories: BTreeSet<&str> = values.into_iter().collect();
        Self {
            categories: categories.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.categories.len()
    }

    /// Position of the hot bit, `None` for unknown categories
    pub fn index_of(&self, category: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(category))
            .ok()
    }

    /// Write the encoding into `out`, which must be `width()` long
    pub fn encode_into(&self, category: &str, out: &mut [f64]) {
        out.iter_mut().for_each(|v| *v = 0.0);
        if let Some(idx) = self.index_of(category) {
            out[idx] = 1.0;
        }
    }

    pub fn feature_names(&self, column: &str) -> Vec<String> {
        self.categories
            .iter()
            .map(|c| format!("{}={}", column, c))
            .collect()
    }
}

/// Maps class labels to 0..n_classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    /// Sorted distinct labels; the class id is the index
    pub classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let classes: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn encode(&self, label: &str) -> Result<f64> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map(|i| i as f64)
            .map_err(|_| PipelineError::PreprocessingError(format!("Unseen label '{}'", label)))
    }

    pub fn decode(&self, class_id: f64) -> Result<&str> {
        let idx = class_id.round();
        if idx < 0.0 || idx as usize >= self.classes.len() {
            return Err(PipelineError::InferenceError(format!(
                "Class index {} out of range for {} classes",
                class_id,
                self.classes.len()
            )));
        }
        Ok(&self.classes[idx as usize])
    }
}
