//! CLI entry point for the reservation cancellation training pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use dotenv::dotenv;
use reservation_processing::{
    DEFAULT_CONFIG_PATH, LocalObjectStore, PipelineConfig, PipelineReport, TrainingPipeline,
};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Hotel reservation cancellation training pipeline",
    long_about = "Downloads the reservation table, preprocesses it and trains a \
                  gradient-boosted cancellation classifier.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  GCS_ACCESS_TOKEN    Bearer token for Cloud Storage (anonymous if unset)\n  \
                  RUST_LOG            Overrides --log-level\n\n\
                  EXAMPLES:\n  \
                  # Full run with config/config.yaml\n  \
                  reservation-pipeline\n\n  \
                  # Offline run reading <dir>/<bucket>/<object>\n  \
                  reservation-pipeline --local-store data/\n\n  \
                  # Retrain on the existing split, ranking candidates by ROC AUC\n  \
                  reservation-pipeline --skip-ingestion --scoring roc_auc"
)]
struct Args {
    /// Path to the YAML configuration
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Directory for the daily log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Reuse the train/test split already on disk
    #[arg(long)]
    skip_ingestion: bool,

    /// Read the raw table from a local directory instead of Cloud Storage
    #[arg(long, value_name = "DIR")]
    local_store: Option<PathBuf>,

    /// Override the search scoring (accuracy, roc_auc, f1, precision, recall)
    #[arg(long)]
    scoring: Option<String>,

    /// Override the unseen-category policy (sentinel, error)
    #[arg(long, value_name = "POLICY")]
    unknown_category: Option<String>,

    /// Print the run report as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Only log warnings and errors to the terminal
    #[arg(short, long)]
    quiet: bool,
}

/// Install the terminal and daily-file log layers.
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(level: &str, quiet: bool, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Creating log directory {}", log_dir.display()))?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "log"));

    let terminal_level = if quiet { "warn" } else { level };
    let terminal_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(terminal_level));
    let file_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(terminal_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(file_filter),
        )
        .init();
    Ok(guard)
}

fn main() -> Result<()> {
    let args = Args::parse();
    dotenv().ok();
    let _guard = init_logging(&args.log_level, args.quiet, &args.log_dir)?;

    let mut config = PipelineConfig::from_yaml_file(&args.config)
        .with_context(|| format!("Loading configuration from {}", args.config.display()))?;
    config
        .apply_overrides(args.scoring.as_deref(), args.unknown_category.as_deref())
        .context("Applying command-line overrides")?;
    debug!(config = ?config, "Configuration loaded");

    let mut builder = TrainingPipeline::builder()
        .config(config)
        .skip_ingestion(args.skip_ingestion)
        .on_progress(|update| {
            info!(
                stage = update.stage.display_name(),
                sub_stage = update.sub_stage.as_deref().unwrap_or(""),
                "[{:>3.0}%] {}",
                update.progress * 100.0,
                update.message
            );
        });
    if let Some(dir) = &args.local_store {
        info!(root = %dir.display(), "Using local object store");
        builder = builder.store(Arc::new(LocalObjectStore::new(dir)));
    }
    let pipeline = builder.build().context("Building the training pipeline")?;

    info!("{}", "=".repeat(80));
    let report = match pipeline.run() {
        Ok(report) => report,
        Err(e) => {
            error!(error_code = e.error_code(), "Training pipeline failed: {}", e);
            return Err(anyhow!(e).context("Training pipeline failed"));
        }
    };

    for warning in &report.warnings {
        warn!("{}", warning);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

/// Print a human-readable summary of the run.
///
/// Uses `println!` so the summary shows regardless of log level.
fn print_summary(report: &PipelineReport) {
    println!();
    println!("{}", "=".repeat(80));
    println!("TRAINING COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    if let Some(split) = &report.split {
        println!(
            "Split: {} raw rows -> {} train / {} test",
            split.raw_rows, split.train_rows, split.test_rows
        );
    }
    println!(
        "Processed: {} train rows (balanced), {} test rows",
        report.train_rows, report.test_rows
    );
    if !report.transformed_columns.is_empty() {
        println!("Log-transformed: {}", report.transformed_columns.join(", "));
    }
    println!("Selected features ({}):", report.selected_features.len());
    for (rank, feature) in report.selected_features.iter().enumerate() {
        println!("  {:>2}. {}", rank + 1, feature);
    }
    println!();

    println!("Best parameters (cv score {:.4}):", report.best_cv_score);
    for (name, value) in &report.best_params {
        println!("  {}: {}", name, value);
    }
    println!();

    let m = &report.metrics;
    println!("Test metrics:");
    println!("  Accuracy:  {:.4}", m.accuracy);
    println!("  Precision: {:.4}", m.precision);
    println!("  Recall:    {:.4}", m.recall);
    println!("  F1 score:  {:.4}", m.f1_score);
    if let Some(auc) = m.roc_auc {
        println!("  ROC AUC:   {:.4}", auc);
    }
    println!();

    println!("Model: {}", report.model_path.display());
    if let Some(run) = &report.run_id {
        println!("Tracking run: {}", run);
    }
    println!("Duration: {:.1}s", report.duration_seconds);
}
