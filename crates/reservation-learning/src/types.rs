//! Result types returned by [`ModelTrainer::run()`](crate::ModelTrainer::run).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::ParamValue;
use crate::metrics::Metrics;
use crate::search::CandidateScore;
use crate::tracking::RunId;

/// Result of a training run.
///
/// # Fields
///
/// - `model_path`: Where the model artifact was written
/// - `metrics`: Held-out evaluation of the refit model
/// - `best_params`: Hyperparameters of the refit model
/// - `best_cv_score`: Mean cross-validation score of the winning draw
/// - `candidates`: Every draw of the search, in draw order
/// - `feature_importance`: Ranked (feature, split count) pairs
/// - `run_id`: Tracking run, if the tracker accepted one
/// - `warnings`: Non-fatal issues such as tracking failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TrainingResult {
    pub model_path: PathBuf,

    pub metrics: Metrics,

    pub best_params: BTreeMap<String, ParamValue>,

    pub best_cv_score: f64,

    pub candidates: Vec<CandidateScore>,

    /// Sorted in descending order by importance.
    pub feature_importance: Vec<(String, f64)>,

    pub run_id: Option<RunId>,

    /// Wall-clock time from loading the tables to writing the model.
    pub training_time_seconds: f64,

    /// Check these even when the run succeeded.
    pub warnings: Vec<String>,
}
