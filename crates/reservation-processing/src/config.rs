//! Pipeline configuration.
//!
//! The configuration is a YAML document loaded once at startup and passed by
//! reference to every stage. Only `data_ingestion` and `data_processing` are
//! required; `model_training` and `paths` fall back to defaults.
//!
//! ```yaml
//! data_ingestion:
//!   bucket_name: my-bucket
//!   bucket_file_name: Hotel_Reservations.csv
//!   train_ratio: 0.8
//!
//! data_processing:
//!   categorical_columns: [type_of_meal_plan, room_type_reserved]
//!   numerical_columns: [lead_time, avg_price_per_room]
//!   skewness_threshold: 5
//!   num_of_features: 10
//!
//! model_training:
//!   search: { n_iter: 4, cv: 2, scoring: accuracy }
//!   param_distribution:
//!     num_leaves: { randint: [20, 100] }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use reservation_learning::{
    GbdtParams, ParamDistribution, ParamValue, Scoring, SearchConfig, default_param_distribution,
};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result, ResultExt};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// How test-table categories unseen during training are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategory {
    /// Encode as `-1` and log a warning.
    #[default]
    Sentinel,
    /// Fail with a data format error.
    Error,
}

impl FromStr for UnknownCategory {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sentinel" => Ok(Self::Sentinel),
            "error" => Ok(Self::Error),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown_category must be 'sentinel' or 'error', got '{}'",
                other
            ))),
        }
    }
}

/// Remote source of the raw table and the split ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub bucket_name: String,
    pub bucket_file_name: String,
    /// Fraction of rows kept for training, in (0, 1).
    pub train_ratio: f64,
    /// Seed of the row shuffle.
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

/// Column roles and thresholds of the preprocessing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub categorical_columns: Vec<String>,
    pub numerical_columns: Vec<String>,
    /// Numeric columns with a sample skewness above this are log1p-transformed.
    pub skewness_threshold: f64,
    /// Number of features kept by importance ranking.
    pub num_of_features: usize,

    #[serde(default = "default_label_column")]
    pub label_column: String,

    /// Columns dropped during cleaning. All must be present.
    #[serde(default = "default_id_columns")]
    pub id_columns: Vec<String>,

    /// Seed for oversampling and the selection forest.
    #[serde(default = "default_random_state")]
    pub random_state: u64,

    #[serde(default)]
    pub unknown_category: UnknownCategory,

    /// Neighbours used to interpolate synthetic minority rows.
    #[serde(default = "default_k_neighbors")]
    pub smote_k_neighbors: usize,
}

/// Randomized search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default = "default_param_distribution")]
    pub param_distribution: BTreeMap<String, ParamDistribution>,

    /// Hyperparameters fixed for every candidate, applied before the draws.
    #[serde(default)]
    pub fixed_params: BTreeMap<String, ParamValue>,

    /// Name under which tracking runs are grouped.
    #[serde(default = "default_experiment_name")]
    pub experiment_name: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            param_distribution: default_param_distribution(),
            fixed_params: BTreeMap::new(),
            experiment_name: default_experiment_name(),
        }
    }
}

impl TrainingConfig {
    /// Default estimator parameters with `fixed_params` applied.
    pub fn base_params(&self) -> Result<GbdtParams> {
        let mut params = GbdtParams {
            random_state: self.search.random_state,
            ..GbdtParams::default()
        };
        for (name, value) in &self.fixed_params {
            params.set(name, value)?;
        }
        params.validate()?;
        Ok(params)
    }
}

/// Locations of every artifact the pipeline reads or writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_file: PathBuf,
    pub train_file: PathBuf,
    pub test_file: PathBuf,
    pub processed_train_file: PathBuf,
    pub processed_test_file: PathBuf,
    /// Fitted category codes, written next to the processed tables.
    pub encoding_map_file: PathBuf,
    pub model_file: PathBuf,
    /// Root of the file-based experiment tracker.
    pub tracking_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::under("artifacts", "mlruns")
    }
}

impl PathsConfig {
    /// The standard layout below `artifacts_dir`.
    pub fn under(artifacts_dir: impl AsRef<Path>, tracking_dir: impl Into<PathBuf>) -> Self {
        let root = artifacts_dir.as_ref();
        Self {
            raw_file: root.join("raw/raw.csv"),
            train_file: root.join("raw/train.csv"),
            test_file: root.join("raw/test.csv"),
            processed_train_file: root.join("processed/processed_train.csv"),
            processed_test_file: root.join("processed/processed_test.csv"),
            encoding_map_file: root.join("processed/label_mappings.json"),
            model_file: root.join("models/lgbm_model.json"),
            tracking_dir: tracking_dir.into(),
        }
    }
}

fn default_random_state() -> u64 {
    42
}

fn default_label_column() -> String {
    "booking_status".to_string()
}

fn default_id_columns() -> Vec<String> {
    vec!["Unnamed: 0".to_string(), "Booking_ID".to_string()]
}

fn default_k_neighbors() -> usize {
    5
}

fn default_experiment_name() -> String {
    "hotel_reservations".to_string()
}

/// Configuration of a full pipeline run.
///
/// Load it with [`PipelineConfig::from_yaml_file()`] or build one in code with
/// [`PipelineConfig::builder()`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data_ingestion: IngestionConfig,
    pub data_processing: ProcessingConfig,
    #[serde(default)]
    pub model_training: TrainingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Read and validate the YAML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Io`] if the file cannot be read
    /// - [`PipelineError::Yaml`] if it is not valid YAML
    /// - [`PipelineError::InvalidConfig`] if a required key is missing, has
    ///   the wrong type, or fails [`validate()`](Self::validate)
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .context(format!("Reading configuration {}", path.display()))?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate a YAML document. Unknown keys are ignored.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let document: serde_yaml::Value = serde_yaml::from_str(text)?;
        let config: PipelineConfig = serde_yaml::from_value(document)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Override the search scoring and the unseen-category policy, given as
    /// their YAML spellings (`roc_auc`, `error`, ...).
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Learning`] for an unsupported scoring
    /// - [`PipelineError::InvalidConfig`] for an unknown policy
    pub fn apply_overrides(
        &mut self,
        scoring: Option<&str>,
        unknown_category: Option<&str>,
    ) -> Result<()> {
        if let Some(scoring) = scoring {
            self.model_training.search.scoring = scoring.parse::<Scoring>()?;
        }
        if let Some(policy) = unknown_category {
            self.data_processing.unknown_category = policy.parse::<UnknownCategory>()?;
        }
        Ok(())
    }

    /// Check value ranges and cross-field consistency.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        let ratio = self.data_ingestion.train_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(ConfigValidationError::InvalidRatio(ratio));
        }

        let processing = &self.data_processing;
        if processing.num_of_features == 0 {
            return Err(ConfigValidationError::InvalidFeatureCount);
        }
        if processing.smote_k_neighbors == 0 {
            return Err(ConfigValidationError::InvalidKNeighbors);
        }
        if !processing.skewness_threshold.is_finite() {
            return Err(ConfigValidationError::InvalidThreshold(
                processing.skewness_threshold,
            ));
        }
        // A text label is encoded with the categorical columns, but it must
        // never be log-transformed.
        if processing.numerical_columns.contains(&processing.label_column) {
            return Err(ConfigValidationError::LabelAsFeature(
                processing.label_column.clone(),
            ));
        }

        let training = &self.model_training;
        training
            .search
            .validate()
            .map_err(|e| ConfigValidationError::Training(e.to_string()))?;
        if training.param_distribution.is_empty() {
            return Err(ConfigValidationError::Training(
                "param_distribution must name at least one parameter".to_string(),
            ));
        }
        for (name, dist) in &training.param_distribution {
            dist.validate(name)
                .map_err(|e| ConfigValidationError::Training(e.to_string()))?;
        }
        training
            .base_params()
            .map_err(|e| ConfigValidationError::Training(e.to_string()))?;

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid train_ratio: {0} (must be strictly between 0.0 and 1.0)")]
    InvalidRatio(f64),

    #[error("Invalid num_of_features: must be at least 1")]
    InvalidFeatureCount,

    #[error("Invalid smote_k_neighbors: must be at least 1")]
    InvalidKNeighbors,

    #[error("Invalid skewness_threshold: {0}")]
    InvalidThreshold(f64),

    #[error("Label column '{0}' is listed as a numerical column")]
    LabelAsFeature(String),

    #[error("Invalid model_training section: {0}")]
    Training(String),
}

impl From<ConfigValidationError> for PipelineError {
    fn from(e: ConfigValidationError) -> Self {
        PipelineError::InvalidConfig(e.to_string())
    }
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    bucket_name: Option<String>,
    bucket_file_name: Option<String>,
    train_ratio: Option<f64>,
    categorical_columns: Vec<String>,
    numerical_columns: Vec<String>,
    skewness_threshold: Option<f64>,
    num_of_features: Option<usize>,
    label_column: Option<String>,
    id_columns: Option<Vec<String>>,
    random_state: Option<u64>,
    unknown_category: Option<UnknownCategory>,
    model_training: Option<TrainingConfig>,
    paths: Option<PathsConfig>,
}

impl PipelineConfigBuilder {
    /// Set the bucket and object name of the raw table.
    pub fn source(mut self, bucket: impl Into<String>, object: impl Into<String>) -> Self {
        self.bucket_name = Some(bucket.into());
        self.bucket_file_name = Some(object.into());
        self
    }

    /// Set the fraction of rows kept for training.
    pub fn train_ratio(mut self, ratio: f64) -> Self {
        self.train_ratio = Some(ratio);
        self
    }

    pub fn categorical_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categorical_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn numerical_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.numerical_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn skewness_threshold(mut self, threshold: f64) -> Self {
        self.skewness_threshold = Some(threshold);
        self
    }

    pub fn num_of_features(mut self, n: usize) -> Self {
        self.num_of_features = Some(n);
        self
    }

    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    /// Set the columns dropped during cleaning.
    pub fn id_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Seed of the split, the oversampler and the selection forest.
    pub fn random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn unknown_category(mut self, policy: UnknownCategory) -> Self {
        self.unknown_category = Some(policy);
        self
    }

    pub fn model_training(mut self, training: TrainingConfig) -> Self {
        self.model_training = Some(training);
        self
    }

    pub fn paths(mut self, paths: PathsConfig) -> Self {
        self.paths = Some(paths);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> std::result::Result<PipelineConfig, ConfigValidationError> {
        let random_state = self.random_state.unwrap_or_else(default_random_state);
        let config = PipelineConfig {
            data_ingestion: IngestionConfig {
                bucket_name: self.bucket_name.unwrap_or_default(),
                bucket_file_name: self.bucket_file_name.unwrap_or_default(),
                train_ratio: self.train_ratio.unwrap_or(0.8),
                random_state,
            },
            data_processing: ProcessingConfig {
                categorical_columns: self.categorical_columns,
                numerical_columns: self.numerical_columns,
                skewness_threshold: self.skewness_threshold.unwrap_or(5.0),
                num_of_features: self.num_of_features.unwrap_or(10),
                label_column: self.label_column.unwrap_or_else(default_label_column),
                id_columns: self.id_columns.unwrap_or_else(default_id_columns),
                random_state,
                unknown_category: self.unknown_category.unwrap_or_default(),
                smote_k_neighbors: default_k_neighbors(),
            },
            model_training: self.model_training.unwrap_or_default(),
            paths: self.paths.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reservation_learning::{BoostingType, Scoring};

    const MINIMAL: &str = r#"
data_ingestion:
  bucket_name: hotel-bucket
  bucket_file_name: Hotel_Reservations.csv
  train_ratio: 0.8
data_processing:
  categorical_columns: [type_of_meal_plan, market_segment_type]
  numerical_columns: [lead_time, avg_price_per_room]
  skewness_threshold: 5
  num_of_features: 10
"#;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = PipelineConfig::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(config.data_ingestion.bucket_name, "hotel-bucket");
        assert_eq!(config.data_processing.label_column, "booking_status");
        assert_eq!(
            config.data_processing.id_columns,
            vec!["Unnamed: 0".to_string(), "Booking_ID".to_string()]
        );
        assert_eq!(config.data_processing.unknown_category, UnknownCategory::Sentinel);
        assert_eq!(config.model_training.search, SearchConfig::default());
        assert_eq!(config.paths, PathsConfig::default());
        assert_eq!(
            config.paths.model_file,
            PathBuf::from("artifacts/models/lgbm_model.json")
        );
    }

    #[test]
    fn test_missing_key_names_the_key() {
        let yaml = MINIMAL.replace("  num_of_features: 10\n", "");
        let err = PipelineConfig::from_yaml_str(&yaml).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
        assert!(err.to_string().contains("num_of_features"));
    }

    #[test]
    fn test_malformed_yaml_is_yaml_error() {
        let err = PipelineConfig::from_yaml_str("data_ingestion: [unclosed").unwrap_err();
        assert_eq!(err.error_code(), "YAML_ERROR");
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let yaml = format!("{}\nmonitoring:\n  enabled: true\n", MINIMAL);
        assert!(PipelineConfig::from_yaml_str(&yaml).is_ok());
    }

    #[test]
    fn test_training_section() {
        let yaml = format!(
            "{}{}",
            MINIMAL,
            r#"
model_training:
  search: { n_iter: 5, cv: 3, scoring: roc_auc, random_state: 7 }
  fixed_params: { min_child_samples: 10 }
  param_distribution:
    num_leaves: { randint: [20, 100] }
    boosting_type: { choice: [gbdt, goss] }
"#
        );
        let config = PipelineConfig::from_yaml_str(&yaml).unwrap();
        let training = &config.model_training;
        assert_eq!(training.search.n_iter, 5);
        assert_eq!(training.search.scoring, Scoring::RocAuc);
        assert_eq!(training.param_distribution.len(), 2);

        let base = training.base_params().unwrap();
        assert_eq!(base.min_child_samples, 10);
        assert_eq!(base.random_state, 7);
        assert_eq!(base.boosting_type, BoostingType::Gbdt);
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let yaml = MINIMAL.replace("train_ratio: 0.8", "train_ratio: 1.0");
        let err = PipelineConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("train_ratio"));
    }

    #[test]
    fn test_dart_rejected() {
        let yaml = format!(
            "{}model_training:\n  param_distribution:\n    boosting_type: {{ choice: [dart] }}\n  fixed_params: {{ boosting_type: dart }}\n",
            MINIMAL
        );
        assert!(PipelineConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_builder_defaults() {
        let config = PipelineConfig::builder()
            .source("bucket", "raw.csv")
            .categorical_columns(["a"])
            .numerical_columns(["b"])
            .build()
            .unwrap();
        assert_eq!(config.data_ingestion.train_ratio, 0.8);
        assert_eq!(config.data_processing.num_of_features, 10);
        assert_eq!(config.data_processing.smote_k_neighbors, 5);
    }

    #[test]
    fn test_builder_rejects_zero_features() {
        let result = PipelineConfig::builder().num_of_features(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidFeatureCount
        ));
    }

    #[test]
    fn test_builder_rejects_label_as_feature() {
        let result = PipelineConfig::builder()
            .numerical_columns(["booking_status"])
            .build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::LabelAsFeature(_)
        ));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = PipelineConfig::builder().build().unwrap();
        config.apply_overrides(Some("roc_auc"), Some("error")).unwrap();
        assert_eq!(config.model_training.search.scoring, Scoring::RocAuc);
        assert_eq!(config.data_processing.unknown_category, UnknownCategory::Error);

        config.apply_overrides(None, None).unwrap();
        assert_eq!(config.model_training.search.scoring, Scoring::RocAuc);

        let err = config.apply_overrides(Some("mse"), None).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
        let err = config.apply_overrides(None, Some("ignore")).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_paths_under() {
        let paths = PathsConfig::under("/tmp/run", "/tmp/run/mlruns");
        assert_eq!(paths.train_file, PathBuf::from("/tmp/run/raw/train.csv"));
        assert_eq!(paths.tracking_dir, PathBuf::from("/tmp/run/mlruns"));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/config.yaml");
        let config = PipelineConfig::from_yaml_file(path).unwrap();
        assert_eq!(config.data_processing.num_of_features, 10);
        assert_eq!(config.data_processing.numerical_columns.len(), 12);
        assert_eq!(config.model_training.param_distribution.len(), 5);
        assert_eq!(config.paths, PathsConfig::default());
    }
}
