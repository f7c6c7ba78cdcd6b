//! Anomaly Detector: per-event outlier flags over the encoded feature matrix

use super::isolation_forest::IsolationForest;
use crate::error::{Result, RiskError};
use crate::utils::DetectorSettings;
use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Which rows a forest is fitted on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionScope {
    /// One forest over the whole batch
    #[default]
    Global,
    /// One forest per user, over that user's rows only
    PerUser,
}

/// Result of running the detector over a batch
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Outlier flag per row
    pub flags: Vec<bool>,
    /// Anomaly score per row (higher = more anomalous); 0.5 where no model was fitted
    pub scores: Vec<f64>,
}

impl Detection {
    fn none(rows: usize) -> Self {
        Self {
            flags: vec![false; rows],
            scores: vec![0.5; rows],
        }
    }

    pub fn anomaly_count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }
}

/// Fits the isolation forest once per batch (or per user) and flags outliers
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    settings: DetectorSettings,
}

impl AnomalyDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self { settings }
    }

    /// Flag outlier rows
    ///
    /// `group_sizes` gives the number of consecutive rows per user and is only
    /// used in per-user scope. The same `seed` on the same matrix always
    /// yields the same flags.
    pub fn detect(&self, x: &Array2<f64>, group_sizes: &[usize], seed: u64) -> Result<Detection> {
        if x.nrows() == 0 {
            return Err(RiskError::Data("empty feature matrix".into()));
        }

        let detection = match self.settings.scope {
            DetectionScope::Global => self.detect_block(x, seed)?,
            DetectionScope::PerUser => self.detect_per_user(x, group_sizes, seed)?,
        };

        info!(
            rows = x.nrows(),
            features = x.ncols(),
            anomalies = detection.anomaly_count(),
            scope = ?self.settings.scope,
            "Anomaly detection finished"
        );

        Ok(detection)
    }

    fn detect_per_user(&self, x: &Array2<f64>, group_sizes: &[usize], seed: u64) -> Result<Detection> {
        let total: usize = group_sizes.iter().sum();
        if total != x.nrows() {
            return Err(RiskError::Data(format!(
                "group sizes cover {} rows but the matrix has {}",
                total,
                x.nrows()
            )));
        }

        let mut offsets = Vec::with_capacity(group_sizes.len());
        let mut start = 0;
        for &size in group_sizes {
            offsets.push((start, size));
            start += size;
        }

        let blocks: Vec<Detection> = offsets
            .par_iter()
            .enumerate()
            .map(|(i, &(start, size))| {
                if size < self.settings.min_events_per_user {
                    return Ok(Detection::none(size));
                }
                let block = x.slice(s![start..start + size, ..]).to_owned();
                self.detect_block(&block, seed.wrapping_add(i as u64))
            })
            .collect::<Result<_>>()?;

        let mut merged = Detection {
            flags: Vec::with_capacity(x.nrows()),
            scores: Vec::with_capacity(x.nrows()),
        };
        for block in blocks {
            merged.flags.extend(block.flags);
            merged.scores.extend(block.scores);
        }
        Ok(merged)
    }

    /// Fit one forest on `x` and predict on the same rows. Degenerate input
    /// (a single row, or no variation at all) flags nothing.
    fn detect_block(&self, x: &Array2<f64>, seed: u64) -> Result<Detection> {
        if x.nrows() < 2 || is_constant(x) {
            warn!(
                rows = x.nrows(),
                "Degenerate feature matrix; no anomalies flagged"
            );
            return Ok(Detection::none(x.nrows()));
        }

        let mut forest = IsolationForest::new(
            self.settings.n_trees,
            self.settings.max_samples,
            self.settings.contamination,
        );
        let mut rng = StdRng::seed_from_u64(seed);
        forest.fit(x, &mut rng)?;

        debug!(threshold = forest.threshold(), seed, "Isolation forest fitted");

        Ok(Detection {
            flags: forest.predict(x),
            scores: forest.score_samples(x),
        })
    }
}

/// True when every row equals the first one
fn is_constant(x: &Array2<f64>) -> bool {
    let first = x.row(0);
    x.rows().into_iter().all(|row| row == first)
}
