//! Model training stage.
//!
//! This module provides [`ModelTrainer`] and its builder. A trainer reads the
//! processed train/test tables, runs a [`RandomizedSearchCv`] over the
//! boosted-tree hyperparameters, evaluates the refit winner on the test
//! table, writes the [`TrainedModel`] artifact, and records the run with an
//! [`ExperimentTracker`].
//!
//! # Example
//!
//! ```rust,ignore
//! use reservation_learning::{FileTracker, ModelTrainer, SearchConfig};
//! use std::sync::Arc;
//!
//! let trainer = ModelTrainer::builder()
//!     .train_path("artifacts/processed/processed_train.csv")
//!     .test_path("artifacts/processed/processed_test.csv")
//!     .model_path("artifacts/models/lgbm_model.json")
//!     .search(SearchConfig::builder().n_iter(4).cv(2).build()?)
//!     .tracker(Arc::new(FileTracker::new("mlruns", "hotel_reservations")))
//!     .on_progress(|u| println!("{:.0}% - {}", u.progress * 100.0, u.message))
//!     .build()?;
//!
//! let result = trainer.run()?;
//! println!("accuracy: {:.3}", result.metrics.accuracy);
//! ```
//!
//! # Tracking
//!
//! Tracking is best effort. Every tracker failure is logged with `warn!`,
//! appended to [`TrainingResult::warnings`], and otherwise ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{GbdtParams, ParamDistribution, SearchConfig, default_param_distribution};
use crate::dataset::{Dataset, read_table};
use crate::error::{LearningError, Result};
use crate::gbdt::GradientBoostingClassifier;
use crate::metrics::Metrics;
use crate::model::TrainedModel;
use crate::progress::{ProgressCallback, ProgressUpdate, TrainingStage};
use crate::search::{RandomizedSearchCv, SearchResult};
use crate::tracking::{ExperimentTracker, NoopTracker, RunId, RunStatus};
use crate::types::TrainingResult;

/// Trains, evaluates and persists the cancellation classifier.
pub struct ModelTrainer {
    train_path: PathBuf,
    test_path: PathBuf,
    model_path: PathBuf,
    label_column: String,
    base_params: GbdtParams,
    distributions: BTreeMap<String, ParamDistribution>,
    search: SearchConfig,
    tracker: Arc<dyn ExperimentTracker>,
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for ModelTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelTrainer")
            .field("train_path", &self.train_path)
            .field("test_path", &self.test_path)
            .field("model_path", &self.model_path)
            .field("label_column", &self.label_column)
            .field("search", &self.search)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ModelTrainer {
    #[must_use]
    pub fn builder() -> ModelTrainerBuilder {
        ModelTrainerBuilder::default()
    }

    /// Load the processed tables and separate features from the label.
    ///
    /// The test table is read with the training table's feature columns, in
    /// the training order.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::TargetNotFound`] if either table lacks the
    /// label column, and [`LearningError::InvalidData`] if the test table
    /// lacks a training feature.
    pub fn load_split(&self) -> Result<(Dataset, Dataset)> {
        let train = Dataset::from_csv(&self.train_path, &self.label_column)?;
        let test_df = read_table(&self.test_path)?;
        let test = Dataset::with_features(&test_df, &self.label_column, &train.feature_names)?;
        info!(
            train_rows = train.n_rows(),
            test_rows = test.n_rows(),
            features = train.feature_names.len(),
            "Loaded processed tables"
        );
        Ok((train, test))
    }

    /// Run the randomized search on the training table.
    pub fn train(&self, train: &Dataset) -> Result<SearchResult> {
        let search = RandomizedSearchCv::new(
            self.base_params.clone(),
            self.distributions.clone(),
            self.search.clone(),
        )?;
        search.fit(train.features.view(), &train.labels)
    }

    /// Score `model` on the test table.
    pub fn evaluate(&self, model: &GradientBoostingClassifier, test: &Dataset) -> Result<Metrics> {
        let proba = model.predict_proba(test.features.view())?;
        let pred: Vec<f64> = proba
            .iter()
            .map(|p| if *p > 0.5 { 1.0 } else { 0.0 })
            .collect();
        let metrics = Metrics::compute(&test.labels, &pred, &proba);
        info!(
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1_score,
            "Model evaluated"
        );
        Ok(metrics)
    }

    /// Write the model artifact to the configured path.
    pub fn persist(&self, model: &TrainedModel) -> Result<()> {
        model.save(&self.model_path)?;
        info!(path = %self.model_path.display(), "Model saved");
        Ok(())
    }

    /// Load, train, evaluate and persist, tracking the run.
    pub fn run(&self) -> Result<TrainingResult> {
        let started = Instant::now();
        let mut warnings = Vec::new();
        self.report(ProgressUpdate::at(
            TrainingStage::Initializing,
            "Starting model training",
        ));

        let run_id = self.track(&mut warnings, "start run", |t| t.start_run());

        let outcome = self.run_stages(run_id.as_ref(), &mut warnings);

        if let Some(run) = &run_id {
            let status = if outcome.is_ok() {
                RunStatus::Finished
            } else {
                RunStatus::Failed
            };
            self.track(&mut warnings, "end run", |t| t.end_run(run, status));
        }

        match outcome {
            Ok((search, metrics, model)) => {
                self.report(ProgressUpdate::at(TrainingStage::Complete, "Training complete"));
                Ok(TrainingResult {
                    model_path: self.model_path.clone(),
                    metrics,
                    best_params: search.best_params.to_map(),
                    best_cv_score: search.best_score,
                    candidates: search.candidates,
                    feature_importance: model.feature_importance(),
                    run_id,
                    training_time_seconds: started.elapsed().as_secs_f64(),
                    warnings,
                })
            }
            Err(e) => {
                self.report(ProgressUpdate::at(TrainingStage::Failed, e.to_string()));
                Err(e)
            }
        }
    }

    fn run_stages(
        &self,
        run: Option<&RunId>,
        warnings: &mut Vec<String>,
    ) -> Result<(SearchResult, Metrics, TrainedModel)> {
        self.report(ProgressUpdate::at(
            TrainingStage::LoadingData,
            "Loading processed tables",
        ));
        let (train, test) = self.load_split()?;
        if let Some(run) = run {
            for path in [&self.train_path, &self.test_path] {
                self.track(warnings, "log dataset", |t| t.log_artifact(run, path, "datasets"));
            }
        }

        self.report(ProgressUpdate::at(
            TrainingStage::Searching,
            format!(
                "Searching {} candidates with {}-fold cross-validation",
                self.search.n_iter, self.search.cv
            ),
        ));
        let search = self.train(&train)?;
        debug!(best_params = ?search.best_params, "Search finished");

        self.report(ProgressUpdate::at(
            TrainingStage::Evaluating,
            "Evaluating on the test table",
        ));
        let mut metrics = self.evaluate(&search.best_model, &test)?;
        metrics.cv_score = Some(search.best_score);

        self.report(ProgressUpdate::at(TrainingStage::Saving, "Saving model"));
        let model = TrainedModel::new(
            search.best_model.clone(),
            train.feature_names.clone(),
            self.label_column.clone(),
        )
        .with_metrics(metrics.clone());
        self.persist(&model)?;

        if let Some(run) = run {
            let model_path = self.model_path.as_path();
            self.track(warnings, "log model", |t| t.log_artifact(run, model_path, "models"));
            let params = search.best_params.to_map();
            self.track(warnings, "log params", |t| t.log_params(run, &params));
            let values = metrics.to_map();
            self.track(warnings, "log metrics", |t| t.log_metrics(run, &values));
        }

        Ok((search, metrics, model))
    }

    fn track<T>(
        &self,
        warnings: &mut Vec<String>,
        action: &str,
        op: impl FnOnce(&dyn ExperimentTracker) -> Result<T>,
    ) -> Option<T> {
        match op(self.tracker.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error_code = e.error_code(), "Experiment tracking failed to {}: {}", action, e);
                warnings.push(format!("tracking failed to {}: {}", action, e));
                None
            }
        }
    }

    fn report(&self, update: ProgressUpdate) {
        if let Some(callback) = &self.progress_callback {
            callback(update);
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

/// Builder for [`ModelTrainer`].
///
/// # Required Configuration
///
/// - [`train_path()`](Self::train_path), [`test_path()`](Self::test_path),
///   [`model_path()`](Self::model_path)
///
/// # Optional Configuration
///
/// - [`label_column()`](Self::label_column): defaults to `booking_status`
/// - [`param_distribution()`](Self::param_distribution): defaults to
///   [`default_param_distribution()`]
/// - [`search()`](Self::search), [`base_params()`](Self::base_params)
/// - [`tracker()`](Self::tracker): defaults to [`NoopTracker`]
/// - [`on_progress()`](Self::on_progress)
#[derive(Default)]
pub struct ModelTrainerBuilder {
    train_path: Option<PathBuf>,
    test_path: Option<PathBuf>,
    model_path: Option<PathBuf>,
    label_column: Option<String>,
    base_params: Option<GbdtParams>,
    distributions: Option<BTreeMap<String, ParamDistribution>>,
    search: Option<SearchConfig>,
    tracker: Option<Arc<dyn ExperimentTracker>>,
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for ModelTrainerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelTrainerBuilder")
            .field("train_path", &self.train_path)
            .field("test_path", &self.test_path)
            .field("model_path", &self.model_path)
            .field("label_column", &self.label_column)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ModelTrainerBuilder {
    #[must_use]
    pub fn train_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.train_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn test_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.test_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    #[must_use]
    pub fn base_params(mut self, params: GbdtParams) -> Self {
        self.base_params = Some(params);
        self
    }

    #[must_use]
    pub fn param_distribution(mut self, dist: BTreeMap<String, ParamDistribution>) -> Self {
        self.distributions = Some(dist);
        self
    }

    #[must_use]
    pub fn search(mut self, config: SearchConfig) -> Self {
        self.search = Some(config);
        self
    }

    #[must_use]
    pub fn tracker(mut self, tracker: Arc<dyn ExperimentTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Set the progress callback (optional).
    ///
    /// The callback should execute quickly to avoid blocking training.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Build the trainer.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidConfig`] if a path is missing or the
    /// search settings are invalid.
    pub fn build(self) -> Result<ModelTrainer> {
        let required = |value: Option<PathBuf>, name: &str| {
            value.ok_or_else(|| LearningError::InvalidConfig(format!("{} is required", name)))
        };
        let search = self.search.unwrap_or_default();
        search.validate()?;

        Ok(ModelTrainer {
            train_path: required(self.train_path, "train_path")?,
            test_path: required(self.test_path, "test_path")?,
            model_path: required(self.model_path, "model_path")?,
            label_column: self
                .label_column
                .unwrap_or_else(|| "booking_status".to_string()),
            base_params: self.base_params.unwrap_or_default(),
            distributions: self
                .distributions
                .unwrap_or_else(default_param_distribution),
            search,
            tracker: self.tracker.unwrap_or_else(|| Arc::new(NoopTracker)),
            progress_callback: self.progress_callback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamValue;
    use crate::tracking::FileTracker;
    use polars::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Mutex;

    struct FailingTracker;

    impl ExperimentTracker for FailingTracker {
        fn start_run(&self) -> Result<RunId> {
            Err(LearningError::Tracking("sink offline".to_string()))
        }
        fn log_artifact(&self, _: &RunId, _: &Path, _: &str) -> Result<()> {
            Err(LearningError::Tracking("sink offline".to_string()))
        }
        fn log_params(&self, _: &RunId, _: &BTreeMap<String, ParamValue>) -> Result<()> {
            Err(LearningError::Tracking("sink offline".to_string()))
        }
        fn log_metrics(&self, _: &RunId, _: &BTreeMap<String, f64>) -> Result<()> {
            Err(LearningError::Tracking("sink offline".to_string()))
        }
        fn end_run(&self, _: &RunId, _: RunStatus) -> Result<()> {
            Err(LearningError::Tracking("sink offline".to_string()))
        }
    }

    fn write_table(path: &Path, n: usize, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let lead_time: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..300.0)).collect();
        let requests: Vec<i64> = (0..n).map(|_| rng.gen_range(0..4)).collect();
        let status: Vec<i64> = lead_time
            .iter()
            .zip(&requests)
            .map(|(l, r)| i64::from(*l > 120.0 && *r < 2))
            .collect();
        let mut df = df![
            "lead_time" => lead_time,
            "no_of_special_requests" => requests,
            "booking_status" => status,
        ]
        .unwrap();
        let mut file = std::fs::File::create(path).unwrap();
        CsvWriter::new(&mut file).finish(&mut df).unwrap();
    }

    fn trainer_in(dir: &Path) -> ModelTrainerBuilder {
        let train = dir.join("processed_train.csv");
        let test = dir.join("processed_test.csv");
        write_table(&train, 200, 1);
        write_table(&test, 60, 2);
        let mut dist = default_param_distribution();
        dist.insert("n_estimators".to_string(), ParamDistribution::Randint(10, 25));
        ModelTrainer::builder()
            .train_path(train)
            .test_path(test)
            .model_path(dir.join("models").join("lgbm_model.json"))
            .param_distribution(dist)
            .search(SearchConfig::builder().n_iter(2).cv(2).build().unwrap())
    }

    #[test]
    fn test_builder_requires_paths() {
        let err = ModelTrainer::builder().build().unwrap_err();
        assert!(matches!(err, LearningError::InvalidConfig(_)));
        assert!(err.to_string().contains("train_path"));
    }

    #[test]
    fn test_run_writes_model_and_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(FileTracker::new(dir.path().join("mlruns"), "hotel"));
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&stages);

        let trainer = trainer_in(dir.path())
            .tracker(tracker.clone())
            .on_progress(move |u| seen.lock().unwrap().push(u.stage))
            .build()
            .unwrap();
        let result = trainer.run().unwrap();

        assert!(result.warnings.is_empty());
        assert_eq!(result.candidates.len(), 2);
        assert!(result.metrics.accuracy > 0.5);
        assert!(result.metrics.cv_score.is_some());

        let loaded = TrainedModel::load(trainer.model_path()).unwrap();
        assert_eq!(loaded.feature_names, vec!["lead_time", "no_of_special_requests"]);

        let run_dir = tracker.run_dir(result.run_id.as_ref().unwrap());
        assert!(run_dir.join("artifacts/datasets/processed_train.csv").exists());
        assert!(run_dir.join("artifacts/models/lgbm_model.json").exists());
        assert!(run_dir.join("params.json").exists());
        assert!(run_dir.join("metrics.json").exists());

        let stages = stages.lock().unwrap();
        assert_eq!(stages.first(), Some(&TrainingStage::Initializing));
        assert_eq!(stages.last(), Some(&TrainingStage::Complete));
    }

    #[test]
    fn test_tracking_failures_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer_in(dir.path())
            .tracker(Arc::new(FailingTracker))
            .build()
            .unwrap();
        let result = trainer.run().unwrap();
        assert!(result.run_id.is_none());
        assert_eq!(result.warnings.len(), 1);
        assert!(trainer.model_path().exists());
    }

    #[test]
    fn test_missing_label_in_test_table() {
        let dir = tempfile::tempdir().unwrap();
        let builder = trainer_in(dir.path());
        let mut df = df!["lead_time" => [1.0, 2.0], "no_of_special_requests" => [0i64, 1]].unwrap();
        let mut file = std::fs::File::create(dir.path().join("processed_test.csv")).unwrap();
        CsvWriter::new(&mut file).finish(&mut df).unwrap();

        let trainer = builder.build().unwrap();
        let err = trainer.run().unwrap_err();
        assert!(matches!(err, LearningError::TargetNotFound(_)));
        assert!(!trainer.model_path().exists());
    }
}
