//! Storage seams of the pipeline
//!
//! - `DocumentSource`: read access to the event and profile collections
//! - `RiskStore`: keyed risk records with compare-and-swap writes
//! - `DocumentStore`: in-memory implementation, optionally backed by a
//!   directory of JSON collections

mod document;

pub use document::*;

use crate::data::{EventDocument, ProfileDocument, UserId};
use crate::error::RiskError;
use crate::fusion::RiskRecord;
use thiserror::Error;

/// Errors raised by a record store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The stored record is not the one the writer expected
    #[error("Record for user {0} was modified concurrently")]
    Conflict(UserId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for RiskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(user_id) => RiskError::Persistence {
                user_id: user_id.to_string(),
                reason: "write conflict".to_string(),
            },
            StoreError::Io(e) => RiskError::Io(e),
            StoreError::Serialization(e) => RiskError::Json(e),
        }
    }
}

/// Read access to the source collections
pub trait DocumentSource {
    fn event_documents(&self) -> crate::Result<Vec<EventDocument>>;

    fn profile_documents(&self) -> crate::Result<Vec<ProfileDocument>>;
}

/// Risk record collection keyed by user id
pub trait RiskStore: Send + Sync {
    fn get_record(&self, user_id: &UserId) -> Result<Option<RiskRecord>, StoreError>;

    /// Store `record` only if the current record for its user equals
    /// `expected` (`None` meaning "no record yet"). Either the whole record
    /// is committed or nothing is.
    fn compare_and_swap(
        &self,
        expected: Option<&RiskRecord>,
        record: RiskRecord,
    ) -> Result<(), StoreError>;

    /// All records, ordered by user id
    fn records(&self) -> Result<Vec<RiskRecord>, StoreError>;
}
