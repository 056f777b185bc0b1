//! Data ingestion stage.
//!
//! Downloads the raw table from object storage and writes the seeded
//! train/test partitions next to it.

pub mod split;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{IngestionConfig, PathsConfig};
use crate::error::{Result, ResultExt};
use crate::utils::{read_csv, write_csv};

pub use split::{INDEX_COLUMN, SplitIndices, shuffle_split, split_frame, test_size};
pub use storage::{GCS_TOKEN_ENV, GcsObjectStore, LocalObjectStore, ObjectStore};

/// Row counts written by [`DataIngestion::split_and_persist()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub raw_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Fetches the raw table and splits it into train and test files.
pub struct DataIngestion {
    config: IngestionConfig,
    raw_file: PathBuf,
    train_file: PathBuf,
    test_file: PathBuf,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for DataIngestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataIngestion")
            .field("config", &self.config)
            .field("raw_file", &self.raw_file)
            .field("train_file", &self.train_file)
            .field("test_file", &self.test_file)
            .finish_non_exhaustive()
    }
}

impl DataIngestion {
    pub fn new(config: &IngestionConfig, paths: &PathsConfig, store: Arc<dyn ObjectStore>) -> Self {
        info!(
            bucket = %config.bucket_name,
            object = %config.bucket_file_name,
            "Data ingestion configured"
        );
        Self {
            config: config.clone(),
            raw_file: paths.raw_file.clone(),
            train_file: paths.train_file.clone(),
            test_file: paths.test_file.clone(),
            store,
        }
    }

    /// Download the configured object to the raw file. Single attempt.
    pub fn fetch_raw(&self) -> Result<u64> {
        let bytes = self
            .store
            .download(
                &self.config.bucket_name,
                &self.config.bucket_file_name,
                &self.raw_file,
            )
            .context("Downloading raw table")?;
        info!(path = %self.raw_file.display(), bytes, "Raw table downloaded");
        Ok(bytes)
    }

    /// Split the raw file with `train_ratio` and write both partitions.
    pub fn split_and_persist(&self, train_ratio: f64) -> Result<SplitSummary> {
        info!(train_ratio, "Starting the train-test split");
        let raw = read_csv(&self.raw_file).context("Reading raw table")?;
        let (mut train, mut test) = split_frame(&raw, train_ratio, self.config.random_state)?;

        write_csv(&mut train, &self.train_file)?;
        write_csv(&mut test, &self.test_file)?;

        let summary = SplitSummary {
            raw_rows: raw.height(),
            train_rows: train.height(),
            test_rows: test.height(),
        };
        info!(
            train = %self.train_file.display(),
            test = %self.test_file.display(),
            train_rows = summary.train_rows,
            test_rows = summary.test_rows,
            "Train and test tables saved"
        );
        Ok(summary)
    }

    /// Fetch the raw table, then split it with the configured ratio.
    pub fn run(&self) -> Result<SplitSummary> {
        info!("Starting data ingestion");
        self.fetch_raw()?;
        let summary = self.split_and_persist(self.config.train_ratio)?;
        info!("Data ingestion completed");
        Ok(summary)
    }
}
