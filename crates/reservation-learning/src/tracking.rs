//! Experiment tracking sinks.
//!
//! A run records input datasets and the model as artifacts, the final
//! hyperparameters, and the evaluation metrics. [`FileTracker`] lays runs
//! out on disk as:
//!
//! ```text
//! <root>/<experiment>/
//! ├── runs.jsonl                 # one line per ended run
//! └── <run_id>/
//!     ├── meta.json
//!     ├── params.json
//!     ├── metrics.json
//!     └── artifacts/<artifact_dir>/<file>
//! ```
//!
//! Callers treat tracking as best effort; see
//! [`ModelTrainer`](crate::ModelTrainer).

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ParamValue;
use crate::error::{LearningError, Result};

/// Identifier of a tracked run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// A sink for run metadata.
pub trait ExperimentTracker: Send + Sync {
    fn start_run(&self) -> Result<RunId>;

    /// Copy the file at `path` into the run's artifacts under `artifact_dir`.
    fn log_artifact(&self, run: &RunId, path: &Path, artifact_dir: &str) -> Result<()>;

    fn log_params(&self, run: &RunId, params: &BTreeMap<String, ParamValue>) -> Result<()>;

    fn log_metrics(&self, run: &RunId, metrics: &BTreeMap<String, f64>) -> Result<()>;

    fn end_run(&self, run: &RunId, status: RunStatus) -> Result<()>;
}

/// Tracker that discards everything.
#[derive(Debug, Clone, Default)]
pub struct NoopTracker;

impl ExperimentTracker for NoopTracker {
    fn start_run(&self) -> Result<RunId> {
        Ok(RunId(uuid::Uuid::new_v4().simple().to_string()))
    }

    fn log_artifact(&self, _run: &RunId, _path: &Path, _artifact_dir: &str) -> Result<()> {
        Ok(())
    }

    fn log_params(&self, _run: &RunId, _params: &BTreeMap<String, ParamValue>) -> Result<()> {
        Ok(())
    }

    fn log_metrics(&self, _run: &RunId, _metrics: &BTreeMap<String, f64>) -> Result<()> {
        Ok(())
    }

    fn end_run(&self, _run: &RunId, _status: RunStatus) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunMeta {
    run_id: RunId,
    experiment: String,
    status: RunStatus,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

/// Tracker writing runs to a local directory.
#[derive(Debug, Clone)]
pub struct FileTracker {
    root: PathBuf,
    experiment: String,
}

impl FileTracker {
    pub fn new(root: impl Into<PathBuf>, experiment: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            experiment: experiment.into(),
        }
    }

    pub fn experiment_dir(&self) -> PathBuf {
        self.root.join(&self.experiment)
    }

    pub fn run_dir(&self, run: &RunId) -> PathBuf {
        self.experiment_dir().join(run.as_str())
    }

    fn existing_run_dir(&self, run: &RunId) -> Result<PathBuf> {
        let dir = self.run_dir(run);
        if !dir.is_dir() {
            return Err(LearningError::Tracking(format!("unknown run {}", run)));
        }
        Ok(dir)
    }

    fn merge_json<V>(&self, path: &Path, entries: &BTreeMap<String, V>) -> Result<()>
    where
        V: Serialize + DeserializeOwned + Clone,
    {
        let mut merged: BTreeMap<String, V> = if path.exists() {
            let text = fs::read_to_string(path).map_err(tracking_io)?;
            serde_json::from_str(&text)?
        } else {
            BTreeMap::new()
        };
        merged.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        fs::write(path, serde_json::to_string_pretty(&merged)?).map_err(tracking_io)
    }
}

fn tracking_io(e: std::io::Error) -> LearningError {
    LearningError::Tracking(e.to_string())
}

impl ExperimentTracker for FileTracker {
    fn start_run(&self) -> Result<RunId> {
        let run_id = RunId(uuid::Uuid::new_v4().simple().to_string());
        let dir = self.run_dir(&run_id);
        fs::create_dir_all(dir.join("artifacts")).map_err(tracking_io)?;

        let meta = RunMeta {
            run_id: run_id.clone(),
            experiment: self.experiment.clone(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
        };
        fs::write(dir.join("meta.json"), serde_json::to_string_pretty(&meta)?)
            .map_err(tracking_io)?;
        debug!(run_id = %run_id, dir = %dir.display(), "Tracking run started");
        Ok(run_id)
    }

    fn log_artifact(&self, run: &RunId, path: &Path, artifact_dir: &str) -> Result<()> {
        let dir = self.existing_run_dir(run)?.join("artifacts").join(artifact_dir);
        let file_name = path.file_name().ok_or_else(|| {
            LearningError::Tracking(format!("artifact path {} has no file name", path.display()))
        })?;
        fs::create_dir_all(&dir).map_err(tracking_io)?;
        fs::copy(path, dir.join(file_name)).map_err(|e| {
            LearningError::Tracking(format!("cannot copy {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    fn log_params(&self, run: &RunId, params: &BTreeMap<String, ParamValue>) -> Result<()> {
        let path = self.existing_run_dir(run)?.join("params.json");
        self.merge_json(&path, params)
    }

    fn log_metrics(&self, run: &RunId, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let path = self.existing_run_dir(run)?.join("metrics.json");
        self.merge_json(&path, metrics)
    }

    fn end_run(&self, run: &RunId, status: RunStatus) -> Result<()> {
        let meta_path = self.existing_run_dir(run)?.join("meta.json");
        let mut meta: RunMeta =
            serde_json::from_str(&fs::read_to_string(&meta_path).map_err(tracking_io)?)?;
        meta.status = status;
        meta.end_time = Some(Utc::now());
        fs::write(&meta_path, serde_json::to_string_pretty(&meta)?).map_err(tracking_io)?;

        let mut ledger = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.experiment_dir().join("runs.jsonl"))
            .map_err(tracking_io)?;
        writeln!(ledger, "{}", serde_json::to_string(&meta)?).map_err(tracking_io)?;
        Ok(())
    }
}

static_assertions::assert_impl_all!(FileTracker: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_file_tracker_layout() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FileTracker::new(dir.path(), "hotel_reservations");
        let run = tracker.start_run().unwrap();

        let data = dir.path().join("train.csv");
        fs::write(&data, "a,b\n1,2\n").unwrap();
        tracker.log_artifact(&run, &data, "datasets").unwrap();

        let mut params = BTreeMap::new();
        params.insert("num_leaves".to_string(), ParamValue::Int(31));
        tracker.log_params(&run, &params).unwrap();

        let mut metrics = BTreeMap::new();
        metrics.insert("accuracy".to_string(), 0.8);
        tracker.log_metrics(&run, &metrics).unwrap();
        metrics.insert("f1".to_string(), 0.7);
        tracker.log_metrics(&run, &metrics).unwrap();

        tracker.end_run(&run, RunStatus::Finished).unwrap();

        let run_dir = tracker.run_dir(&run);
        assert!(run_dir.join("artifacts/datasets/train.csv").exists());
        let stored: BTreeMap<String, f64> =
            serde_json::from_str(&fs::read_to_string(run_dir.join("metrics.json")).unwrap())
                .unwrap();
        assert_eq!(stored, metrics);

        let ledger = fs::read_to_string(tracker.experiment_dir().join("runs.jsonl")).unwrap();
        assert_eq!(ledger.lines().count(), 1);
        assert!(ledger.contains("FINISHED"));
    }

    #[test]
    fn test_missing_artifact_is_tracking_error() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FileTracker::new(dir.path(), "exp");
        let run = tracker.start_run().unwrap();
        let err = tracker
            .log_artifact(&run, Path::new("/nonexistent/file.csv"), "datasets")
            .unwrap_err();
        assert!(err.is_tracking());
    }

    #[test]
    fn test_unknown_run_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FileTracker::new(dir.path(), "exp");
        let err = tracker
            .log_metrics(&RunId("missing".to_string()), &BTreeMap::new())
            .unwrap_err();
        assert!(err.is_tracking());
    }
}
