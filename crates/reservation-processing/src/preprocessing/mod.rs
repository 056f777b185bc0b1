//! Data preprocessing stage.
//!
//! Turns the raw train/test partitions into model-ready tables:
//!
//! 1. [`clean()`] - drop identifier columns and duplicate rows
//! 2. [`encode_categoricals()`] - label-encode categorical columns, fitted on train
//! 3. [`deskew()`] - `log1p` on numeric columns above the skewness threshold
//! 4. [`balance()`] - SMOTE oversampling of the training table
//! 5. [`select_features()`] - keep the top-N random-forest features
//! 6. [`align_test()`] - give the test table the training columns
//!
//! Nothing is written until every step has succeeded.

pub mod cleaner;
pub mod encoder;
pub mod selection;
pub mod skewness;
pub mod smote;

use std::path::PathBuf;

use polars::prelude::*;
use tracing::info;

use crate::config::{PathsConfig, ProcessingConfig, UnknownCategory};
use crate::error::{Result, ResultExt};
use crate::utils::{column_names, read_csv, write_csv};

pub use cleaner::clean;
pub use encoder::{CategoryEncoder, ColumnEncoding, LabelKind, UNKNOWN_CODE};
pub use selection::{FeatureSelection, align_test, select_features};
pub use skewness::{apply_log1p, deskew, sample_skewness};
pub use smote::{Smote, balance};

/// Fit an encoder on `train` and apply it to both tables.
pub fn encode_categoricals(
    train: DataFrame,
    test: DataFrame,
    columns: &[String],
    unknown: UnknownCategory,
) -> Result<(CategoryEncoder, DataFrame, DataFrame)> {
    let (encoder, train) = CategoryEncoder::fit_transform(train, columns)?;
    let test = encoder.transform(test, unknown).context("Encoding test table")?;
    encoder.log_mappings();
    Ok((encoder, train, test))
}

/// What [`DataProcessor::process()`] produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingSummary {
    /// Training rows after balancing.
    pub train_rows: usize,
    pub test_rows: usize,
    /// Selected features, most important first.
    pub selected_features: Vec<String>,
    pub importances: Vec<(String, f64)>,
    /// Numeric columns replaced by `log1p`.
    pub transformed_columns: Vec<String>,
}

/// Runs the preprocessing steps over the split tables.
#[derive(Debug, Clone)]
pub struct DataProcessor {
    config: ProcessingConfig,
    train_file: PathBuf,
    test_file: PathBuf,
    processed_train_file: PathBuf,
    processed_test_file: PathBuf,
    encoding_map_file: PathBuf,
}

impl DataProcessor {
    pub fn new(config: &ProcessingConfig, paths: &PathsConfig) -> Self {
        Self {
            config: config.clone(),
            train_file: paths.train_file.clone(),
            test_file: paths.test_file.clone(),
            processed_train_file: paths.processed_train_file.clone(),
            processed_test_file: paths.processed_test_file.clone(),
            encoding_map_file: paths.encoding_map_file.clone(),
        }
    }

    /// Transform both tables in memory without writing anything.
    ///
    /// Returns the processed train and test tables, the fitted encoder and
    /// the summary.
    pub fn transform(
        &self,
        train: DataFrame,
        test: DataFrame,
    ) -> Result<(DataFrame, DataFrame, CategoryEncoder, ProcessingSummary)> {
        let cfg = &self.config;

        let train = clean(train, &cfg.id_columns).context("Cleaning train table")?;
        let test = clean(test, &cfg.id_columns).context("Cleaning test table")?;

        let (encoder, train, test) = encode_categoricals(
            train,
            test,
            &cfg.categorical_columns,
            cfg.unknown_category,
        )?;

        let (train, transformed) = deskew(train, &cfg.numerical_columns, cfg.skewness_threshold)
            .context("Handling skewness")?;
        let test = apply_log1p(test, &transformed)?;

        let train = balance(&train, &cfg.label_column, cfg.smote_k_neighbors, cfg.random_state)
            .context("Balancing train table")?;

        let (train, selection) = select_features(
            &train,
            &cfg.label_column,
            cfg.num_of_features,
            cfg.random_state,
        )
        .context("Selecting features")?;
        let test = align_test(&test, &column_names(&train)).context("Aligning test table")?;

        let summary = ProcessingSummary {
            train_rows: train.height(),
            test_rows: test.height(),
            selected_features: selection.features,
            importances: selection.importances,
            transformed_columns: transformed,
        };
        Ok((train, test, encoder, summary))
    }

    /// Read the split tables, transform them and write the processed tables
    /// and the encoding map.
    pub fn process(&self) -> Result<ProcessingSummary> {
        info!("Starting data processing");
        let train = read_csv(&self.train_file).context("Loading train table")?;
        let test = read_csv(&self.test_file).context("Loading test table")?;

        let (mut train, mut test, encoder, summary) = self.transform(train, test)?;

        write_csv(&mut train, &self.processed_train_file)?;
        write_csv(&mut test, &self.processed_test_file)?;
        encoder.save(&self.encoding_map_file)?;

        info!(
            train = %self.processed_train_file.display(),
            test = %self.processed_test_file.display(),
            train_rows = summary.train_rows,
            test_rows = summary.test_rows,
            "Processed data saved"
        );
        Ok(summary)
    }
}
