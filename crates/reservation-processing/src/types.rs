use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use reservation_learning::{Metrics, ParamValue, RunId};
use serde::{Deserialize, Serialize};

use crate::ingestion::SplitSummary;

// ============================================================================
// Pipeline Report
// ============================================================================

/// Summary of a complete pipeline run.
///
/// # Example
///
/// ```rust,ignore
/// let report = TrainingPipeline::new(config)?.run()?;
/// println!(
///     "accuracy {:.3} with {:?} in {:.1}s",
///     report.metrics.accuracy, report.selected_features, report.duration_seconds
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Row counts of the split; `None` when ingestion was skipped.
    pub split: Option<SplitSummary>,

    /// Training rows after balancing.
    pub train_rows: usize,
    pub test_rows: usize,

    /// Selected features, most important first.
    pub selected_features: Vec<String>,
    /// Numeric columns replaced by `log1p`.
    pub transformed_columns: Vec<String>,

    /// Held-out evaluation of the trained model.
    pub metrics: Metrics,
    pub best_params: BTreeMap<String, ParamValue>,
    pub best_cv_score: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub model_path: PathBuf,

    pub started_at: DateTime<Utc>,
    /// Wall-clock time of the whole run.
    pub duration_seconds: f64,

    /// Non-fatal issues, such as tracking failures.
    pub warnings: Vec<String>,
}

impl PipelineReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
