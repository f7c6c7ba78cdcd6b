//! Detected-vs-simulated comparison for labelled (synthetic) corpora

use serde::{Deserialize, Serialize};
use std::fmt;

/// Confusion table of simulated labels against detector flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvaluation {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl DetectionEvaluation {
    /// Build from `(simulated label, detected flag)` pairs. Unlabelled rows
    /// are skipped; `None` when no row carries a label.
    pub fn from_pairs<I>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (Option<bool>, bool)>,
    {
        let mut eval = Self::default();
        let mut labelled = false;

        for (label, detected) in pairs {
            let Some(simulated) = label else { continue };
            labelled = true;
            match (simulated, detected) {
                (true, true) => eval.true_positives += 1,
                (false, true) => eval.false_positives += 1,
                (false, false) => eval.true_negatives += 1,
                (true, false) => eval.false_negatives += 1,
            }
        }

        labelled.then_some(eval)
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn precision(&self) -> f64 {
        let flagged = self.true_positives + self.false_positives;
        if flagged == 0 {
            0.0
        } else {
            self.true_positives as f64 / flagged as f64
        }
    }

    pub fn recall(&self) -> f64 {
        let actual = self.true_positives + self.false_negatives;
        if actual == 0 {
            0.0
        } else {
            self.true_positives as f64 / actual as f64
        }
    }
}

impl fmt::Display for DetectionEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "                 detected=0  detected=1")?;
        writeln!(
            f,
            "  simulated=0  {:>10}  {:>10}",
            self.true_negatives, self.false_positives
        )?;
        writeln!(
            f,
            "  simulated=1  {:>10}  {:>10}",
            self.false_negatives, self.true_positives
        )?;
        write!(
            f,
            "  precision {:.2}, recall {:.2}",
            self.precision(),
            self.recall()
        )
    }
}
