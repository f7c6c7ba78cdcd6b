//! Feature Encoder for access events
//!
//! Row layout: one-hot device columns, one-hot location columns, then the
//! standardized hour of day. The fitted state is kept (and serializable) so a
//! later batch can be encoded into the same feature space.

use super::one_hot::OneHotEncoder;
use super::scaler::StandardScaler;
use crate::data::AccessEvent;
use crate::error::{Result, RiskError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Handling of a category that was not in the fitting batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategory {
    /// Encode as an all-zero indicator block
    #[default]
    Ignore,
    /// Fail with `RiskError::Encoding`
    Error,
}

/// Fitted encoder for access events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFeatureEncoder {
    device: OneHotEncoder,
    location: OneHotEncoder,
    hour: StandardScaler,
    unknown: UnknownCategory,
}

impl EventFeatureEncoder {
    /// Fit vocabularies and the hour scaler on a batch
    pub fn fit(events: &[&AccessEvent], unknown: UnknownCategory) -> Result<Self> {
        if events.is_empty() {
            return Err(RiskError::Data("no events to fit the encoder on".into()));
        }

        let hours: Vec<f64> = events.iter().map(|e| e.hour() as f64).collect();

        let encoder = Self {
            device: OneHotEncoder::fit(events.iter().map(|e| e.device.as_str())),
            location: OneHotEncoder::fit(events.iter().map(|e| e.location.as_str())),
            hour: StandardScaler::fit(&hours)?,
            unknown,
        };

        debug!(
            devices = encoder.device.width(),
            locations = encoder.location.width(),
            hour_mean = encoder.hour.mean,
            hour_std = encoder.hour.std,
            "Event encoder fitted"
        );

        Ok(encoder)
    }

    /// Fit and transform in one step
    pub fn fit_transform(
        events: &[&AccessEvent],
        unknown: UnknownCategory,
    ) -> Result<(Self, Array2<f64>)> {
        let encoder = Self::fit(events, unknown)?;
        let matrix = encoder.transform(events)?;
        Ok((encoder, matrix))
    }

    /// Total number of feature columns
    pub fn n_features(&self) -> usize {
        self.device.width() + self.location.width() + 1
    }

    pub fn feature_names(&self) -> Vec<String> {
        let mut names = self.device.feature_names("device");
        names.extend(self.location.feature_names("location"));
        names.push("hour".to_string());
        names
    }

    /// Encode events into the fitted feature space, one row per event
    pub fn transform(&self, events: &[&AccessEvent]) -> Result<Array2<f64>> {
        let n_dev = self.device.width();
        let n_loc = self.location.width();
        let mut matrix = Array2::<f64>::zeros((events.len(), self.n_features()));
        let mut unseen = 0usize;

        for (i, event) in events.iter().enumerate() {
            let mut row = matrix.row_mut(i);
            let row = row
                .as_slice_mut()
                .ok_or_else(|| RiskError::Data("feature matrix is not contiguous".into()))?;

            let (dev_cols, rest) = row.split_at_mut(n_dev);
            let (loc_cols, hour_col) = rest.split_at_mut(n_loc);

            if !self.device.encode_into(&event.device, dev_cols) {
                self.on_unknown("device", &event.device)?;
                unseen += 1;
            }
            if !self.location.encode_into(&event.location, loc_cols) {
                self.on_unknown("location", &event.location)?;
                unseen += 1;
            }
            hour_col[0] = self.hour.transform(event.hour() as f64);
        }

        if unseen > 0 {
            debug!(unseen, "Unseen categories encoded as all-zero indicators");
        }

        Ok(matrix)
    }

    fn on_unknown(&self, field: &'static str, value: &str) -> Result<()> {
        match self.unknown {
            UnknownCategory::Ignore => Ok(()),
            UnknownCategory::Error => Err(RiskError::Encoding {
                field,
                value: value.to_string(),
            }),
        }
    }
}
