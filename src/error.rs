//! Error types for the risk scoring pipeline

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, RiskError>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum RiskError {
    /// Empty or malformed event/profile corpus for the whole batch
    #[error("Data error: {0}")]
    Data(String),

    /// Categorical value not present in the fitted vocabulary
    #[error("Unseen {field} category '{value}'")]
    Encoding { field: &'static str, value: String },

    /// Degenerate or rank-deficient model input
    #[error("Model fit failed: {0}")]
    ModelFit(String),

    /// Record could not be persisted
    #[error("Failed to persist record for user {user_id}: {reason}")]
    Persistence { user_id: String, reason: String },

    /// Questionnaire has fewer answers than the tiering rule needs
    #[error("Questionnaire incomplete: {answered} answers, at least {required} required")]
    IncompleteQuestionnaire { answered: usize, required: usize },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
