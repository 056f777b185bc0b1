//! Pipeline module.
//!
//! Sequences ingestion, preprocessing and training, and reports progress.

mod builder;
pub mod progress;

pub use builder::{TrainingPipeline, TrainingPipelineBuilder};
pub use progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};
