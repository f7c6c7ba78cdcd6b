//! Risk classification module
//!
//! Provides tools for:
//! - The risk tier enum and the anomaly-count threshold table
//! - Per-user anomaly aggregation
//! - Questionnaire-only tiering

mod aggregator;
mod questionnaire;
mod tier;

pub use aggregator::*;
pub use questionnaire::*;
pub use tier::*;
