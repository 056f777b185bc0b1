//! Error types for ingestion, preprocessing and the pipeline driver.
//!
//! Errors carry a stable code through [`PipelineError::error_code()`] and
//! serialize as `{ "code", "message" }` so run reports can embed them.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

use reservation_learning::LearningError;

/// The main error type for the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The remote object is missing or access was denied.
    #[error("Storage failure for '{bucket}/{object}': {reason}")]
    Storage {
        bucket: String,
        object: String,
        reason: String,
    },

    /// A local file could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A table could not be parsed or has unusable content.
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Column was not found in the table.
    #[error("Column '{0}' not found in table")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Training, evaluation or model persistence failed.
    #[error("Training error: {0}")]
    Learning(#[from] LearningError),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable code for the error kind. Context wrappers report the code of
    /// the error they wrap.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Storage { .. } => "STORAGE_FAILURE",
            Self::Io(_) => "IO_ERROR",
            Self::DataFormat(_) => "DATA_FORMAT",
            Self::ColumnNotFound(_) => "SCHEMA_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Learning(e) => e.error_code(),
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// The innermost error, skipping context wrappers.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Io(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, LearningError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Learning(e).with_context(context))
    }
}
