//! The training pipeline and its builder.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use reservation_learning::{ExperimentTracker, FileTracker, ModelTrainer};
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, ResultExt};
use crate::ingestion::{DataIngestion, GcsObjectStore, ObjectStore, SplitSummary};
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::preprocessing::DataProcessor;
use crate::types::PipelineReport;

/// Ingestion, preprocessing and training, run in sequence.
///
/// Use [`TrainingPipeline::new()`] for the default object store and tracker,
/// or [`TrainingPipeline::builder()`] to supply your own.
///
/// # Example
///
/// ```rust,ignore
/// use reservation_processing::{LocalObjectStore, PipelineConfig, TrainingPipeline};
/// use std::sync::Arc;
///
/// let report = TrainingPipeline::builder()
///     .config(PipelineConfig::from_yaml_file("config/config.yaml")?)
///     .store(Arc::new(LocalObjectStore::new("data")))
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run()?;
/// ```
pub struct TrainingPipeline {
    config: PipelineConfig,
    store: Arc<dyn ObjectStore>,
    tracker: Arc<dyn ExperimentTracker>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    skip_ingestion: bool,
}

static_assertions::assert_impl_all!(TrainingPipeline: Send, Sync);

impl std::fmt::Debug for TrainingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingPipeline")
            .field("config", &self.config)
            .field("skip_ingestion", &self.skip_ingestion)
            .finish_non_exhaustive()
    }
}

impl TrainingPipeline {
    /// Pipeline reading from Cloud Storage and tracking to
    /// `paths.tracking_dir`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> TrainingPipelineBuilder {
        TrainingPipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage and summarize the outcome.
    ///
    /// Stops at the first failing stage; outputs of earlier stages stay on
    /// disk.
    pub fn run(&self) -> Result<PipelineReport> {
        match self.run_stages() {
            Ok(report) => {
                self.report_progress(ProgressUpdate::complete("Pipeline completed successfully"));
                Ok(report)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!(error_code = e.error_code(), "Pipeline failed: {}", e);
                Err(e)
            }
        }
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_stages(&self) -> Result<PipelineReport> {
        let started = Instant::now();
        let started_at = Utc::now();
        info!("Starting training pipeline");
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Initializing,
            0.0,
            "Starting training pipeline",
        ));

        let split = if self.skip_ingestion {
            info!("Skipping data ingestion, using existing split files");
            None
        } else {
            Some(self.ingest()?)
        };

        self.report_progress(ProgressUpdate::new(
            PipelineStage::Preprocessing,
            0.0,
            "Processing train and test tables",
        ));
        let processing = DataProcessor::new(&self.config.data_processing, &self.config.paths)
            .process()
            .context("Data processing")?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Preprocessing,
            1.0,
            format!("Selected {} features", processing.selected_features.len()),
        ));

        let trainer = self.trainer()?;
        let training = trainer.run().context("Model training")?;

        let report = PipelineReport {
            split,
            train_rows: processing.train_rows,
            test_rows: processing.test_rows,
            selected_features: processing.selected_features,
            transformed_columns: processing.transformed_columns,
            metrics: training.metrics,
            best_params: training.best_params,
            best_cv_score: training.best_cv_score,
            run_id: training.run_id,
            model_path: training.model_path,
            started_at,
            duration_seconds: started.elapsed().as_secs_f64(),
            warnings: training.warnings,
        };
        info!(
            accuracy = report.metrics.accuracy,
            f1 = report.metrics.f1_score,
            duration_seconds = report.duration_seconds,
            "Training pipeline completed"
        );
        Ok(report)
    }

    fn ingest(&self) -> Result<SplitSummary> {
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Ingestion,
            0.0,
            "Downloading raw table",
        ));
        let summary = DataIngestion::new(
            &self.config.data_ingestion,
            &self.config.paths,
            self.store.clone(),
        )
        .run()
        .context("Data ingestion")?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Ingestion,
            1.0,
            format!(
                "Split {} rows into {} train and {} test",
                summary.raw_rows, summary.train_rows, summary.test_rows
            ),
        ));
        Ok(summary)
    }

    fn trainer(&self) -> Result<ModelTrainer> {
        let training = &self.config.model_training;
        let paths = &self.config.paths;

        let mut builder = ModelTrainer::builder()
            .train_path(&paths.processed_train_file)
            .test_path(&paths.processed_test_file)
            .model_path(&paths.model_file)
            .label_column(&self.config.data_processing.label_column)
            .base_params(training.base_params()?)
            .param_distribution(training.param_distribution.clone())
            .search(training.search.clone())
            .tracker(self.tracker.clone());

        if let Some(reporter) = self.progress_reporter.clone() {
            builder = builder.on_progress(move |update| {
                reporter.report(ProgressUpdate::from_training(update));
            });
        }
        Ok(builder.build()?)
    }
}

/// Builder for [`TrainingPipeline`].
#[derive(Default)]
pub struct TrainingPipelineBuilder {
    config: Option<PipelineConfig>,
    store: Option<Arc<dyn ObjectStore>>,
    tracker: Option<Arc<dyn ExperimentTracker>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    skip_ingestion: bool,
}

static_assertions::assert_impl_all!(TrainingPipelineBuilder: Send);

impl TrainingPipelineBuilder {
    /// Set the pipeline configuration (required).
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Object store holding the raw table. Defaults to
    /// [`GcsObjectStore::from_env()`].
    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Experiment tracker. Defaults to a [`FileTracker`] under
    /// `paths.tracking_dir`.
    pub fn tracker(mut self, tracker: Arc<dyn ExperimentTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Reuse the train/test files already on disk instead of downloading.
    pub fn skip_ingestion(mut self, skip: bool) -> Self {
        self.skip_ingestion = skip;
        self
    }

    /// Build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if no configuration was set
    /// or it fails validation, and [`PipelineError::Storage`] if the default
    /// object store cannot be created.
    pub fn build(self) -> Result<TrainingPipeline> {
        let config = self
            .config
            .ok_or_else(|| PipelineError::InvalidConfig("config is required".to_string()))?;
        config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(GcsObjectStore::from_env()?),
        };
        let tracker = self.tracker.unwrap_or_else(|| {
            Arc::new(FileTracker::new(
                config.paths.tracking_dir.clone(),
                config.model_training.experiment_name.clone(),
            ))
        });

        Ok(TrainingPipeline {
            config,
            store,
            tracker,
            progress_reporter: self.progress_reporter,
            skip_ingestion: self.skip_ingestion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::LocalObjectStore;
    use reservation_learning::NoopTracker;

    fn config() -> PipelineConfig {
        PipelineConfig::builder()
            .source("bucket", "hotel.csv")
            .categorical_columns(["booking_status"])
            .numerical_columns(["lead_time"])
            .num_of_features(1)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_config() {
        let err = TrainingPipeline::builder()
            .store(Arc::new(LocalObjectStore::new("store")))
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_build_validates_config() {
        let mut config = config();
        config.data_ingestion.train_ratio = 1.5;
        let err = TrainingPipeline::builder()
            .config(config)
            .store(Arc::new(LocalObjectStore::new("store")))
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_missing_split_files_fail_when_ingestion_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.paths = crate::config::PathsConfig::under(dir.path(), dir.path().join("mlruns"));

        let stages = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = stages.clone();
        let pipeline = TrainingPipeline::builder()
            .config(config)
            .store(Arc::new(LocalObjectStore::new(dir.path())))
            .tracker(Arc::new(NoopTracker))
            .skip_ingestion(true)
            .on_progress(move |u| sink.lock().unwrap().push(u.stage))
            .build()
            .unwrap();

        let err = pipeline.run().unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");
        let stages = stages.lock().unwrap();
        assert!(!stages.contains(&PipelineStage::Ingestion));
        assert_eq!(stages.last(), Some(&PipelineStage::Failed));
    }
}
