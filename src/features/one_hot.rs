//! One-hot encoding of categorical columns

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a category lands in the encoded row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Indicator column index
    Column(usize),
    /// Dropped baseline category, encoded as all zeros
    Baseline,
}

/// Category vocabulary for one column, sorted so column order is reproducible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: Vec<String>,
    /// Treat the first category as the all-zero baseline
    drop_first: bool,
}

impl OneHotEncoder {
    /// Derive the vocabulary from the values being encoded
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let categories: BTreeSet<&str> = values.into_iter().collect();
        Self {
            categories: categories.into_iter().map(str::to_string).collect(),
            drop_first: false,
        }
    }

    /// Same as [`fit`](Self::fit) but with the first category as baseline,
    /// which keeps a design matrix with an intercept free of the dummy trap
    pub fn fit_drop_first<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            drop_first: true,
            ..Self::fit(values)
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Number of output columns
    pub fn width(&self) -> usize {
        if self.drop_first {
            self.categories.len().saturating_sub(1)
        } else {
            self.categories.len()
        }
    }

    /// Slot of `value`, or `None` for a category outside the vocabulary
    pub fn slot(&self, value: &str) -> Option<Slot> {
        let idx = self
            .categories
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()?;

        Some(match (self.drop_first, idx) {
            (true, 0) => Slot::Baseline,
            (true, i) => Slot::Column(i - 1),
            (false, i) => Slot::Column(i),
        })
    }

    /// Write the indicator for `value` into `out` (which must be zeroed and
    /// `width()` long). Returns `false` if the value is unknown.
    pub fn encode_into(&self, value: &str, out: &mut [f64]) -> bool {
        match self.slot(value) {
            Some(Slot::Column(col)) => {
                out[col] = 1.0;
                true
            }
            Some(Slot::Baseline) => true,
            None => false,
        }
    }

    /// Output column names as `prefix=category`
    pub fn feature_names(&self, prefix: &str) -> Vec<String> {
        let skip = usize::from(self.drop_first);
        self.categories
            .iter()
            .skip(skip)
            .map(|c| format!("{}={}", prefix, c))
            .collect()
    }
}
