//! Standard (z-score) scaling

use serde::{Deserialize, Serialize};

/// Fitted standard scaler for one column: (x - mean) / std
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: f64,
    /// Population standard deviation, 1.0 for constant columns
    pub scale: f64,
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self { mean: 0.0, scale: 1.0 }
    }
}

impl StandardScaler {
    /// Fit on already-imputed values
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        Self {
            mean,
            scale: if std < 1e-12 { 1.0 } else { std },
        }
    }

    #[inline]
    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }
}
