//! reservation-learning: tree ensembles and training for booking cancellation.
//!
//! This crate provides everything the pipeline needs once the data has been
//! preprocessed: native tree models, randomized hyperparameter search with
//! stratified cross-validation, evaluation metrics, model persistence and
//! experiment tracking.
//!
//! # Features
//!
//! - **Random forest**: importance ranking for feature selection
//!   ([`RandomForestClassifier`])
//! - **Gradient boosting**: leaf-wise histogram trees with `gbdt` and `goss`
//!   boosting ([`GradientBoostingClassifier`])
//! - **Randomized search**: seeded parameter draws scored with stratified
//!   k-fold cross-validation ([`RandomizedSearchCv`])
//! - **Tracking**: runs, params, metrics and artifacts ([`FileTracker`])
//! - **Progress reporting**: stage callbacks from [`ModelTrainer`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use reservation_learning::{ModelTrainer, SearchConfig, TrainedModel};
//!
//! let trainer = ModelTrainer::builder()
//!     .train_path("artifacts/processed/processed_train.csv")
//!     .test_path("artifacts/processed/processed_test.csv")
//!     .model_path("artifacts/models/lgbm_model.json")
//!     .search(SearchConfig::builder().n_iter(4).cv(2).build()?)
//!     .build()?;
//!
//! let result = trainer.run()?;
//! let model = TrainedModel::load(&result.model_path)?;
//! ```
//!
//! # Determinism
//!
//! Every random choice (bootstrap samples, GOSS sampling, parameter draws)
//! comes from a `StdRng` seeded by `random_state`. Parallel work is split
//! into independently seeded items and collected in order, so results do not
//! depend on thread scheduling.
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, LearningError>`](LearningError).
//! See [`LearningError`] for the complete list of variants.

mod binning;
pub mod config;
pub mod dataset;
pub mod error;
pub mod forest;
pub mod gbdt;
pub mod metrics;
pub mod model;
pub mod progress;
pub mod search;
pub mod tracking;
pub mod trainer;
pub mod tree;
pub mod types;

pub use config::{
    BoostingType, GbdtParams, ParamDistribution, ParamValue, Scoring, SearchConfig,
    SearchConfigBuilder, default_param_distribution,
};
pub use dataset::Dataset;
pub use error::{LearningError, Result};
pub use forest::{MaxFeatures, RandomForestClassifier, RandomForestParams};
pub use gbdt::GradientBoostingClassifier;
pub use metrics::Metrics;
pub use model::TrainedModel;
pub use progress::{ProgressCallback, ProgressUpdate, TrainingStage};
pub use search::{CandidateScore, RandomizedSearchCv, SearchResult, stratified_kfold};
pub use tracking::{ExperimentTracker, FileTracker, NoopTracker, RunId, RunStatus};
pub use trainer::{ModelTrainer, ModelTrainerBuilder};
pub use types::TrainingResult;

static_assertions::assert_impl_all!(ModelTrainer: Send, Sync);
static_assertions::assert_impl_all!(TrainedModel: Send, Sync);
