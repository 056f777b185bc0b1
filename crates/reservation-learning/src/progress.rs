//! Progress reporting types for model training.
//!
//! This module defines [`TrainingStage`], [`ProgressUpdate`] and the
//! [`ProgressCallback`] type alias used by [`ModelTrainer`](crate::ModelTrainer).
//!
//! # Example
//!
//! ```
//! use reservation_learning::{ProgressUpdate, TrainingStage};
//!
//! let update = ProgressUpdate {
//!     stage: TrainingStage::Searching,
//!     progress: 0.5,
//!     message: "Scoring candidates".to_string(),
//! };
//!
//! println!("[{}] {:.0}%", update.stage.as_str(), update.progress * 100.0);
//! ```

use std::str::FromStr;
use std::sync::Arc;

/// The current stage of a training run.
///
/// Runs progress through these stages in order unless they fail:
///
/// 1. [`Initializing`](Self::Initializing)
/// 2. [`LoadingData`](Self::LoadingData) - Reading the processed tables
/// 3. [`Searching`](Self::Searching) - Randomized search with cross-validation
/// 4. [`Evaluating`](Self::Evaluating) - Scoring the refit model on the test table
/// 5. [`Saving`](Self::Saving) - Writing the model artifact
/// 6. [`Complete`](Self::Complete)
///
/// Terminal states: [`Complete`](Self::Complete), [`Failed`](Self::Failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TrainingStage {
    #[default]
    Initializing,
    LoadingData,
    Searching,
    Evaluating,
    Saving,
    Complete,
    Failed,
}

impl TrainingStage {
    /// Returns the snake_case name of the stage.
    ///
    /// # Examples
    ///
    /// ```
    /// use reservation_learning::TrainingStage;
    ///
    /// assert_eq!(TrainingStage::LoadingData.as_str(), "loading_data");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStage::Initializing => "initializing",
            TrainingStage::LoadingData => "loading_data",
            TrainingStage::Searching => "searching",
            TrainingStage::Evaluating => "evaluating",
            TrainingStage::Saving => "saving",
            TrainingStage::Complete => "complete",
            TrainingStage::Failed => "failed",
        }
    }

    /// Returns `true` for [`Complete`](Self::Complete) and [`Failed`](Self::Failed).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainingStage::Complete | TrainingStage::Failed)
    }

    /// Overall progress at the start of this stage.
    #[must_use]
    pub fn base_progress(&self) -> f64 {
        match self {
            TrainingStage::Initializing => 0.0,
            TrainingStage::LoadingData => 0.05,
            TrainingStage::Searching => 0.15,
            TrainingStage::Evaluating => 0.85,
            TrainingStage::Saving => 0.95,
            TrainingStage::Complete | TrainingStage::Failed => 1.0,
        }
    }
}

/// Error type for parsing a [`TrainingStage`] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTrainingStageError {
    invalid_value: String,
}

impl ParseTrainingStageError {
    /// Returns the invalid value that caused the parse error.
    #[must_use]
    pub fn invalid_value(&self) -> &str {
        &self.invalid_value
    }
}

impl std::fmt::Display for ParseTrainingStageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid training stage: '{}'. Valid values are: initializing, loading_data, \
             searching, evaluating, saving, complete, failed",
            self.invalid_value
        )
    }
}

impl std::error::Error for ParseTrainingStageError {}

impl FromStr for TrainingStage {
    type Err = ParseTrainingStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(TrainingStage::Initializing),
            "loading_data" => Ok(TrainingStage::LoadingData),
            "searching" => Ok(TrainingStage::Searching),
            "evaluating" => Ok(TrainingStage::Evaluating),
            "saving" => Ok(TrainingStage::Saving),
            "complete" => Ok(TrainingStage::Complete),
            "failed" => Ok(TrainingStage::Failed),
            _ => Err(ParseTrainingStageError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

/// A progress update from a training run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressUpdate {
    pub stage: TrainingStage,

    /// Overall progress from 0.0 to 1.0, non-decreasing during a run.
    pub progress: f64,

    /// Human-readable status message.
    pub message: String,
}

impl ProgressUpdate {
    /// Update at the start of `stage`.
    pub fn at(stage: TrainingStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: stage.base_progress(),
            message: message.into(),
        }
    }
}

/// Callback receiving [`ProgressUpdate`]s. Must be thread-safe.
///
/// ```
/// use std::sync::Arc;
/// use reservation_learning::{ProgressCallback, ProgressUpdate};
///
/// let callback: ProgressCallback = Arc::new(|update: ProgressUpdate| {
///     println!("{} - {}", update.stage.as_str(), update.message);
/// });
/// ```
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_stage_roundtrip() {
        let stages = [
            TrainingStage::Initializing,
            TrainingStage::LoadingData,
            TrainingStage::Searching,
            TrainingStage::Evaluating,
            TrainingStage::Saving,
            TrainingStage::Complete,
            TrainingStage::Failed,
        ];

        for stage in stages {
            let parsed: TrainingStage = stage.as_str().parse().unwrap();
            assert_eq!(parsed, stage);
        }
    }

    #[test]
    fn test_parse_error_lists_valid_values() {
        let err = "tuning".parse::<TrainingStage>().unwrap_err();
        assert_eq!(err.invalid_value(), "tuning");
        assert!(err.to_string().contains("Valid values"));
    }

    #[test]
    fn test_base_progress_is_monotonic() {
        let ordered = [
            TrainingStage::Initializing,
            TrainingStage::LoadingData,
            TrainingStage::Searching,
            TrainingStage::Evaluating,
            TrainingStage::Saving,
            TrainingStage::Complete,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].base_progress() < pair[1].base_progress());
        }
    }

    #[test]
    fn test_is_terminal() {
        assert!(TrainingStage::Complete.is_terminal());
        assert!(TrainingStage::Failed.is_terminal());
        assert!(!TrainingStage::Searching.is_terminal());
    }
}
