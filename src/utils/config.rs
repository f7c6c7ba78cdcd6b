//! Configuration management
//!
//! Handles loading and validation of pipeline configuration.

use crate::anomaly::DetectionScope;
use crate::error::{Result, RiskError};
use crate::features::UnknownCategory;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Random seed threaded into every stochastic stage
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Anomaly detector configuration
    #[serde(default)]
    pub detector: DetectorSettings,

    /// Feature encoder configuration
    #[serde(default)]
    pub encoder: EncoderSettings,

    /// Future-risk forecast configuration
    #[serde(default)]
    pub forecast: ForecastSettings,

    /// Document store configuration
    #[serde(default)]
    pub store: StoreSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_seed() -> u64 {
    42
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            detector: DetectorSettings::default(),
            encoder: EncoderSettings::default(),
            forecast: ForecastSettings::default(),
            store: StoreSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Isolation forest settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorSettings {
    /// Expected fraction of outlier events
    #[serde(default = "default_contamination")]
    pub contamination: f64,

    /// Number of isolation trees
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    /// Subsample size per tree
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// Fit one forest for the whole batch or one per user
    #[serde(default)]
    pub scope: DetectionScope,

    /// Users with fewer events get no flags in per-user scope
    #[serde(default = "default_min_events_per_user")]
    pub min_events_per_user: usize,
}

fn default_contamination() -> f64 {
    0.1
}

fn default_n_trees() -> usize {
    100
}

fn default_max_samples() -> usize {
    256
}

fn default_min_events_per_user() -> usize {
    2
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            contamination: default_contamination(),
            n_trees: default_n_trees(),
            max_samples: default_max_samples(),
            scope: DetectionScope::default(),
            min_events_per_user: default_min_events_per_user(),
        }
    }
}

/// Feature encoder settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EncoderSettings {
    /// What to do with a category missing from the fitted vocabulary
    #[serde(default)]
    pub unknown_category: UnknownCategory,
}

/// Future-risk regressor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastSettings {
    /// Run the regressor at all
    #[serde(default = "default_forecast_enabled")]
    pub enabled: bool,

    /// Minimum number of users that must share a category value
    #[serde(default = "default_min_category_support")]
    pub min_category_support: usize,
}

fn default_forecast_enabled() -> bool {
    true
}

fn default_min_category_support() -> usize {
    2
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            enabled: default_forecast_enabled(),
            min_category_support: default_min_category_support(),
        }
    }
}

/// Document store settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    /// Directory holding the JSON collections
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "data".to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PipelineConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let c = self.detector.contamination;
        if !(c > 0.0 && c <= 0.5) {
            return Err(RiskError::Config(format!(
                "detector.contamination must be in (0, 0.5], got {}",
                c
            )));
        }
        if self.detector.n_trees == 0 {
            return Err(RiskError::Config("detector.n_trees must be positive".into()));
        }
        if self.detector.max_samples < 2 {
            return Err(RiskError::Config(
                "detector.max_samples must be at least 2".into(),
            ));
        }
        if self.forecast.min_category_support == 0 {
            return Err(RiskError::Config(
                "forecast.min_category_support must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Apply `RISK_*` environment overrides
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(seed) = std::env::var("RISK_SEED") {
            self.seed = seed
                .parse()
                .map_err(|_| RiskError::Config(format!("RISK_SEED is not an integer: {}", seed)))?;
        }

        if let Ok(c) = std::env::var("RISK_CONTAMINATION") {
            self.detector.contamination = c.parse().map_err(|_| {
                RiskError::Config(format!("RISK_CONTAMINATION is not a number: {}", c))
            })?;
        }

        if let Ok(path) = std::env::var("RISK_STORE_PATH") {
            self.store.path = path;
        }

        if let Ok(level) = std::env::var("RISK_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(self)
    }
}

/// Load configuration from a TOML or JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or_else(|| content.trim_start().starts_with('{'));

    let config: PipelineConfig = if is_json {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content)?
    };

    config.validate()?;
    Ok(config)
}
