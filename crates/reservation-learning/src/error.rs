//! Error types for the reservation-learning crate.
//!
//! This module defines [`LearningError`], the main error type used throughout
//! the crate. All public API functions return `Result<T, LearningError>`.
//!
//! # Example
//!
//! ```no_run
//! use reservation_learning::{LearningError, SearchConfig};
//!
//! fn configure() -> Result<SearchConfig, LearningError> {
//!     // Errors are automatically propagated with ?
//!     let config = SearchConfig::builder().n_iter(4).cv(2).build()?;
//!     Ok(config)
//! }
//! ```

use thiserror::Error;

/// The main error type for reservation-learning operations.
///
/// This enum covers all error conditions that can occur during:
/// - Search and hyperparameter configuration
/// - Loading and validating training tables
/// - Model fitting and evaluation
/// - Model persistence
/// - Experiment tracking
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LearningError {
    /// Invalid configuration provided to a model or the search.
    ///
    /// Check the error message for details on which configuration value is invalid
    /// and what values are accepted.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid data provided for training or inference.
    ///
    /// Common causes:
    /// - Feature matrix and label vector lengths differ
    /// - Labels are not binary `0`/`1` values
    /// - A class has fewer rows than the number of CV folds
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The label column was not found in a loaded table.
    ///
    /// Column names are case-sensitive.
    #[error("Label column '{0}' not found")]
    TargetNotFound(String),

    /// Training failed for a reason other than bad input.
    #[error("Training failed: {0}")]
    TrainingFailed(String),

    /// The specified model file was not found.
    #[error("Model not found: {path}")]
    ModelNotFound {
        /// The path that was not found.
        path: String,
    },

    /// The experiment tracking sink rejected an operation.
    ///
    /// Trainers treat this as non-fatal: it is logged and the run continues.
    #[error("Tracking failure: {0}")]
    Tracking(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (model artifacts, tracking records).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Polars error while reading a table.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl LearningError {
    /// Get an error code suitable for logs and exit summaries.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::TargetNotFound(_) => "DATA_FORMAT",
            Self::TrainingFailed(_) => "TRAINING_FAILED",
            Self::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            Self::Tracking(_) => "TRACKING_FAILURE",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Polars(_) => "DATA_FORMAT",
        }
    }

    /// Whether this error came from the tracking sink and may be ignored.
    pub fn is_tracking(&self) -> bool {
        matches!(self, Self::Tracking(_))
    }
}

/// Result type alias for learning operations.
pub type Result<T> = std::result::Result<T, LearningError>;
