//! Persisted model artifact for inference.
//!
//! This module provides [`TrainedModel`], which bundles a fitted
//! [`GradientBoostingClassifier`] with the column layout it was trained on
//! and the evaluation it achieved. It enables:
//!
//! - **Batch prediction** from a processed [`DataFrame`] via
//!   [`predict()`](TrainedModel::predict) and
//!   [`predict_proba()`](TrainedModel::predict_proba)
//! - **Serialization** via [`save()`](TrainedModel::save) and
//!   [`load()`](TrainedModel::load)
//! - **Introspection** via [`feature_importance()`](TrainedModel::feature_importance)
//!
//! # Example
//!
//! ```rust,ignore
//! use reservation_learning::TrainedModel;
//!
//! let model = TrainedModel::load("artifacts/models/lgbm_model.json")?;
//! let predictions = model.predict(&processed_test)?;
//! ```
//!
//! # Format
//!
//! Artifacts are pretty-printed JSON. Saving overwrites any previous file at
//! the same path and creates missing parent directories.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::dataset::feature_matrix;
use crate::error::{LearningError, Result};
use crate::gbdt::GradientBoostingClassifier;
use crate::metrics::Metrics;

/// Artifact format version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// A trained classifier ready for inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    format_version: u32,

    /// The fitted ensemble.
    pub model: GradientBoostingClassifier,

    /// Feature columns in the order the model expects them.
    pub feature_names: Vec<String>,

    /// Name of the label column used during training.
    pub label_column: String,

    /// Held-out evaluation, once available.
    pub metrics: Option<Metrics>,

    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn new(
        model: GradientBoostingClassifier,
        feature_names: Vec<String>,
        label_column: impl Into<String>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model,
            feature_names,
            label_column: label_column.into(),
            metrics: None,
            trained_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Loads a model artifact from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`LearningError::ModelNotFound`] if the file does not exist
    /// - [`LearningError::Json`] if the file is not a model artifact
    /// - [`LearningError::InvalidData`] for an unsupported format version
    #[must_use = "returns the loaded model; use it or handle the error"]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LearningError::ModelNotFound {
                path: path.display().to_string(),
            });
        }
        let text = fs::read_to_string(path)?;
        let model: TrainedModel = serde_json::from_str(&text)?;
        if model.format_version != FORMAT_VERSION {
            return Err(LearningError::InvalidData(format!(
                "unsupported model format version {} in {}",
                model.format_version,
                path.display()
            )));
        }
        Ok(model)
    }

    /// Saves the model as JSON, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Probability of class 1 for each row of `df`.
    ///
    /// `df` must contain every column in [`feature_names`](Self::feature_names);
    /// other columns, including the label, are ignored.
    pub fn predict_proba(&self, df: &DataFrame) -> Result<Vec<f64>> {
        let x = feature_matrix(df, &self.feature_names)?;
        self.model.predict_proba(x.view())
    }

    /// Predicted class (0 or 1) for each row of `df`.
    pub fn predict(&self, df: &DataFrame) -> Result<Vec<f64>> {
        let x = feature_matrix(df, &self.feature_names)?;
        self.model.predict(x.view())
    }

    /// Feature names with split-count importance, most important first.
    /// Ties keep column order.
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.model.feature_importances().iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}
