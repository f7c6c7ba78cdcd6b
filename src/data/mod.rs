//! Data module for the stored collections
//!
//! This module provides:
//! - Document shapes of the access-event and profile collections
//! - Validated domain types (`AccessEvent`, `UserProfile`)
//! - Batch ingestion with per-event rejection and corpus-level errors

mod documents;
mod events;
mod ingest;
mod profile;

pub use documents::*;
pub use events::*;
pub use ingest::*;
pub use profile::*;
