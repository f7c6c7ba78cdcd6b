//! Discrete risk tiers and the anomaly-count threshold table

use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk tier classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

/// Anomaly-count thresholds, checked highest first.
///
/// Used for the current tier (integer anomaly count) and for the forecast
/// tier (destandardized regression output). Nothing else classifies counts.
pub const ANOMALY_TIER_THRESHOLDS: [(f64, RiskTier); 2] =
    [(3.0, RiskTier::High), (2.0, RiskTier::Medium)];

impl RiskTier {
    /// Classify an anomaly-count-equivalent score
    pub fn from_score(score: f64) -> Self {
        ANOMALY_TIER_THRESHOLDS
            .iter()
            .find(|(min, _)| score >= *min)
            .map(|(_, tier)| *tier)
            .unwrap_or(RiskTier::Low)
    }

    /// Classify an observed anomaly count
    pub fn from_anomaly_count(count: usize) -> Self {
        Self::from_score(count as f64)
    }

    /// Numeric code used by report renderers (1 = Low .. 3 = High)
    pub fn code(&self) -> u8 {
        match self {
            RiskTier::Low => 1,
            RiskTier::Medium => 2,
            RiskTier::High => 3,
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low risk",
            RiskTier::Medium => "Medium risk",
            RiskTier::High => "High risk",
        }
    }

    /// Display color
    pub fn color(&self) -> &'static str {
        match self {
            RiskTier::Low => "green",
            RiskTier::Medium => "yellow",
            RiskTier::High => "red",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
