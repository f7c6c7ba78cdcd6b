//! Anomaly detection module
//!
//! This module provides:
//! - A seeded Isolation Forest
//! - The batch anomaly detector (global or per-user scope)
//! - Evaluation of detector flags against simulated labels

mod detector;
mod evaluation;
mod isolation_forest;

pub use detector::*;
pub use evaluation::*;
pub use isolation_forest::*;
