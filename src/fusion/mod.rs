//! Fusion of the risk signals into persisted per-user records

mod record;
mod writer;

pub use record::*;
pub use writer::*;
