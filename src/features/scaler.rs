//! Z-score standardization

use crate::error::{Result, RiskError};
use serde::{Deserialize, Serialize};

/// Standardizes a numeric column to zero mean and unit variance
///
/// Uses the population standard deviation of the fitting batch. A constant
/// column keeps a scale of 1 so it maps to all zeros instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: f64,
    pub std: f64,
}

impl StandardScaler {
    /// Fit on a batch of values
    pub fn fit(data: &[f64]) -> Result<Self> {
        if data.is_empty() {
            return Err(RiskError::Data(
                "cannot standardize an empty column".to_string(),
            ));
        }

        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        Ok(Self {
            mean,
            std: variance.sqrt(),
        })
    }

    fn scale(&self) -> f64 {
        if self.std < 1e-10 {
            1.0
        } else {
            self.std
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale()
    }

    pub fn inverse_transform(&self, value: f64) -> f64 {
        value * self.scale() + self.mean
    }

    pub fn transform_all(&self, data: &[f64]) -> Vec<f64> {
        data.iter().map(|&v| self.transform(v)).collect()
    }
}
