//! Error types for the model bake-off

use thiserror::Error;

/// Result type alias for bake-off operations
pub type Result<T> = std::result::Result<T, BakeoffError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum BakeoffError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unsupported model file format: {0}")]
    UnsupportedFormat(String),
}

impl BakeoffError {
    /// Shorthand for a rejected hyperparameter value
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        BakeoffError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for BakeoffError {
    fn from(err: polars::error::PolarsError) -> Self {
        BakeoffError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for BakeoffError {
    fn from(err: serde_json::Error) -> Self {
        BakeoffError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for BakeoffError {
    fn from(err: bincode::Error) -> Self {
        BakeoffError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for BakeoffError {
    fn from(err: ndarray::ShapeError) -> Self {
        BakeoffError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
