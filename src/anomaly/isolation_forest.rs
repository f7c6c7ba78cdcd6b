//! Seeded Isolation Forest
//!
//! Trees are grown on random subsamples by splitting a random non-constant
//! feature at a uniform random point. Outliers are isolated after fewer
//! splits, so their average path length is short and their score is high.
//! The decision threshold is calibrated so that roughly `contamination` of
//! the fitting batch lands on the outlier side.

use crate::error::{Result, RiskError};
use ndarray::{Array2, ArrayView1};
use rand::prelude::*;
use rand_distr::Uniform;

const EULER_GAMMA: f64 = 0.5772156649;
const MIN_RANGE: f64 = 1e-10;

/// Isolation Tree node
#[derive(Debug, Clone)]
enum IsolationNode {
    Internal {
        feature_idx: usize,
        split_value: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

/// Single Isolation Tree
#[derive(Debug, Clone)]
pub struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    /// Build a tree over the given rows of `data`
    pub fn build(data: &Array2<f64>, rows: &[usize], max_depth: usize, rng: &mut impl Rng) -> Self {
        Self {
            root: Self::build_node(data, rows, 0, max_depth, rng),
        }
    }

    fn build_node(
        data: &Array2<f64>,
        rows: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut impl Rng,
    ) -> IsolationNode {
        if depth >= max_depth || rows.len() <= 1 {
            return IsolationNode::Leaf { size: rows.len() };
        }

        // Only features that still vary inside this node can split it
        let candidates: Vec<(usize, f64, f64)> = (0..data.ncols())
            .filter_map(|f| {
                let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = data[[r, f]];
                    (lo.min(v), hi.max(v))
                });
                (max - min > MIN_RANGE).then_some((f, min, max))
            })
            .collect();

        if candidates.is_empty() {
            return IsolationNode::Leaf { size: rows.len() };
        }

        let (feature_idx, min_val, max_val) = candidates[rng.gen_range(0..candidates.len())];
        let split_value = rng.sample(Uniform::new(min_val, max_val));

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| data[[r, feature_idx]] < split_value);

        let left = Box::new(Self::build_node(data, &left_rows, depth + 1, max_depth, rng));
        let right = Box::new(Self::build_node(data, &right_rows, depth + 1, max_depth, rng));

        IsolationNode::Internal {
            feature_idx,
            split_value,
            left,
            right,
        }
    }

    /// Path length of a sample, adjusted for unresolved leaf sizes
    pub fn path_length(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;

        loop {
            match node {
                IsolationNode::Leaf { size } => return depth as f64 + average_path_length(*size),
                IsolationNode::Internal {
                    feature_idx,
                    split_value,
                    left,
                    right,
                } => {
                    node = if sample[*feature_idx] < *split_value {
                        left
                    } else {
                        right
                    };
                    depth += 1;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful search in a BST of `n` nodes
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile (`q` in [0, 100]) of unsorted values
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let idx = (q / 100.0) * (sorted.len() - 1) as f64;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    let frac = idx - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Isolation Forest for anomaly detection
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    n_trees: usize,
    max_samples: usize,
    contamination: f64,
    /// Subsample size actually used when fitting
    sample_size: usize,
    /// Scores strictly above this are outliers
    threshold: f64,
}

impl IsolationForest {
    /// Create a new Isolation Forest
    ///
    /// # Arguments
    /// * `n_trees` - Number of trees in the forest
    /// * `max_samples` - Maximum samples per tree
    /// * `contamination` - Expected proportion of anomalies, in (0, 0.5]
    pub fn new(n_trees: usize, max_samples: usize, contamination: f64) -> Self {
        Self {
            trees: Vec::new(),
            n_trees: n_trees.max(1),
            max_samples: max_samples.max(2),
            contamination,
            sample_size: 0,
            threshold: f64::INFINITY,
        }
    }

    /// Fit the forest on training data and calibrate the threshold
    pub fn fit(&mut self, data: &Array2<f64>, rng: &mut impl Rng) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(RiskError::Config(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if data.nrows() < 2 || data.ncols() == 0 {
            return Err(RiskError::ModelFit(format!(
                "isolation forest needs at least 2 rows and 1 column, got {:?}",
                data.dim()
            )));
        }

        let sample_size = self.max_samples.min(data.nrows());
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        self.sample_size = sample_size;
        self.trees = (0..self.n_trees)
            .map(|_| {
                let mut rows = (0..data.nrows()).choose_multiple(rng, sample_size);
                rows.sort_unstable();
                IsolationTree::build(data, &rows, max_depth, rng)
            })
            .collect();

        let scores = self.score_samples(data);
        self.threshold = percentile(&scores, 100.0 * (1.0 - self.contamination));

        Ok(())
    }

    /// Anomaly score for a sample (0-1, higher = more anomalous)
    pub fn anomaly_score(&self, sample: ArrayView1<f64>) -> f64 {
        let c_n = average_path_length(self.sample_size);
        if self.trees.is_empty() || c_n < MIN_RANGE {
            return 0.5;
        }

        let avg_path: f64 = self.trees.iter().map(|t| t.path_length(sample)).sum::<f64>()
            / self.trees.len() as f64;

        // s(x) = 2^(-E(h(x)) / c(n))
        2.0_f64.powf(-avg_path / c_n)
    }

    /// Scores for every row
    pub fn score_samples(&self, data: &Array2<f64>) -> Vec<f64> {
        data.rows().into_iter().map(|row| self.anomaly_score(row)).collect()
    }

    /// Signed distance to the threshold; negative on the outlier side
    pub fn decision_function(&self, data: &Array2<f64>) -> Vec<f64> {
        self.score_samples(data)
            .into_iter()
            .map(|s| self.threshold - s)
            .collect()
    }

    /// Outlier flag per row
    pub fn predict(&self, data: &Array2<f64>) -> Vec<bool> {
        self.decision_function(data).into_iter().map(|d| d < 0.0).collect()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;

    fn clustered_with_outliers() -> Array2<f64> {
        let mut rows: Vec<f64> = Vec::new();
        for i in 0..40 {
            let jitter = (i % 5) as f64 * 0.01;
            rows.extend_from_slice(&[1.0 + jitter, 2.0 - jitter]);
        }
        rows.extend_from_slice(&[9.0, -7.0]);
        rows.extend_from_slice(&[-8.0, 11.0]);
        Array2::from_shape_vec((42, 2), rows).unwrap()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert_relative_eq!(average_path_length(256), 10.2447, epsilon = 1e-3);
    }

    #[test]
    fn test_percentile_interpolation() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(percentile(&values, 0.0), 1.0);
        assert_relative_eq!(percentile(&values, 50.0), 2.5);
        assert_relative_eq!(percentile(&values, 100.0), 4.0);
    }

    #[test]
    fn test_outliers_flagged() {
        let data = clustered_with_outliers();
        let mut forest = IsolationForest::new(100, 256, 0.05);
        let mut rng = StdRng::seed_from_u64(42);
        forest.fit(&data, &mut rng).unwrap();

        let flags = forest.predict(&data);
        assert!(flags[40] && flags[41]);

        let scores = forest.score_samples(&data);
        assert!(scores[40] > scores[0]);
        assert!(scores[41] > scores[0]);
    }

    #[test]
    fn test_same_seed_same_flags() {
        let data = clustered_with_outliers();

        let run = |seed: u64| {
            let mut forest = IsolationForest::new(50, 32, 0.1);
            forest.fit(&data, &mut StdRng::seed_from_u64(seed)).unwrap();
            (forest.score_samples(&data), forest.predict(&data))
        };

        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_identical_rows_flag_nothing() {
        let data = Array2::from_elem((10, 3), 1.0);
        let mut forest = IsolationForest::new(20, 256, 0.2);
        forest.fit(&data, &mut StdRng::seed_from_u64(1)).unwrap();
        assert!(forest.predict(&data).iter().all(|f| !f));
    }

    #[test]
    fn test_too_small_input_rejected() {
        let data = array![[1.0, 2.0]];
        let mut forest = IsolationForest::new(10, 256, 0.1);
        let err = forest.fit(&data, &mut StdRng::seed_from_u64(1));
        assert!(matches!(err, Err(RiskError::ModelFit(_))));
        assert_eq!(forest.score_samples(&data), vec![0.5]);
    }
}
