//! Hotel Reservation Cancellation Pipeline
//!
//! Batch training pipeline that predicts whether a hotel booking will be
//! cancelled, built with Polars and the `reservation-learning` tree models.
//!
//! # Overview
//!
//! A run goes through three stages:
//!
//! - **Ingestion**: download the raw table from object storage and split it
//!   into seeded train/test partitions ([`DataIngestion`])
//! - **Preprocessing**: drop identifiers and duplicates, label-encode
//!   categoricals, `log1p` skewed numerics, balance classes with SMOTE and
//!   keep the top-N random-forest features ([`DataProcessor`])
//! - **Training**: randomized hyperparameter search over gradient-boosted
//!   trees with stratified cross-validation, evaluation, persistence and
//!   experiment tracking ([`reservation_learning::ModelTrainer`])
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use reservation_processing::{PipelineConfig, TrainingPipeline};
//!
//! let config = PipelineConfig::from_yaml_file("config/config.yaml")?;
//! let report = TrainingPipeline::new(config)?.run()?;
//!
//! println!("Selected features: {:?}", report.selected_features);
//! println!("Accuracy: {:.3}", report.metrics.accuracy);
//! ```
//!
//! # Configuration
//!
//! [`PipelineConfig`] is read from YAML. Only `data_ingestion` and
//! `data_processing` are required:
//!
//! ```yaml
//! data_ingestion:
//!   bucket_name: my-bucket
//!   bucket_file_name: Hotel_Reservations.csv
//!   train_ratio: 0.8
//! data_processing:
//!   categorical_columns: [type_of_meal_plan, market_segment_type, booking_status]
//!   numerical_columns: [lead_time, avg_price_per_room]
//!   skewness_threshold: 5
//!   num_of_features: 10
//! ```
//!
//! # Offline Runs
//!
//! Any [`ObjectStore`] can stand in for Cloud Storage:
//!
//! ```rust,ignore
//! use reservation_processing::{LocalObjectStore, TrainingPipeline};
//! use std::sync::Arc;
//!
//! let report = TrainingPipeline::builder()
//!     .config(config)
//!     .store(Arc::new(LocalObjectStore::new("data")))
//!     .on_progress(|update| println!("[{:?}] {}", update.stage, update.message))
//!     .build()?
//!     .run()?;
//! ```

pub mod config;
pub mod error;
pub mod ingestion;
pub mod pipeline;
pub mod preprocessing;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use config::{
    ConfigValidationError, DEFAULT_CONFIG_PATH, IngestionConfig, PathsConfig, PipelineConfig,
    PipelineConfigBuilder, ProcessingConfig, TrainingConfig, UnknownCategory,
};
pub use error::{PipelineError, Result, ResultExt};
pub use ingestion::{
    DataIngestion, GcsObjectStore, LocalObjectStore, ObjectStore, SplitSummary, split_frame,
};
pub use pipeline::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate, TrainingPipeline,
    TrainingPipelineBuilder,
};
pub use preprocessing::{CategoryEncoder, DataProcessor, ProcessingSummary};
pub use types::PipelineReport;
