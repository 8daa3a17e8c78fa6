//! Churn model trainer CLI
//!
//! Reads a labeled CSV, fits the pipeline and classifier, and writes the
//! artifact (plus optionally the feature schema document and a JSON report).

use anyhow::{Context, Result};
use chrono::Utc;
use churn_core::EstimatorKind;
use churn_trainer::{train_artifact, Dataset, TrainingParams, DEFAULT_TARGET_COLUMN};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "churn-train")]
#[command(version = churn_trainer::VERSION)]
#[command(about = "Train a churn classifier and write a model artifact", long_about = None)]
struct Args {
    /// Input CSV dataset path (headered)
    #[arg(short, long)]
    input: PathBuf,

    /// Output artifact path
    #[arg(short, long, default_value = "models/churn-model.json")]
    output: PathBuf,

    /// Name of the 0/1 label column
    #[arg(long, default_value = DEFAULT_TARGET_COLUMN)]
    target: String,

    /// Classifier family: ridge, logistic or gradient_boosting
    #[arg(short, long, default_value = "gradient_boosting")]
    estimator: EstimatorKind,

    /// Artifact version tag (default: churn-<estimator>-<timestamp>)
    #[arg(long)]
    tag: Option<String>,

    /// Also write the feature schema document here
    #[arg(long)]
    schema_output: Option<PathBuf>,

    /// Also write the training report as JSON here
    #[arg(long)]
    report: Option<PathBuf>,

    /// L2 regularisation strength
    #[arg(long, default_value = "1.0")]
    alpha: f64,

    /// Step size (logistic) or shrinkage (boosting)
    #[arg(long, default_value = "0.1")]
    learning_rate: f64,

    /// Gradient descent epochs for logistic regression
    #[arg(long, default_value = "500")]
    epochs: usize,

    /// Number of boosting trees
    #[arg(long, default_value = "100")]
    trees: usize,

    /// Maximum tree depth
    #[arg(long, default_value = "3")]
    max_depth: usize,

    /// Minimum samples per leaf
    #[arg(long, default_value = "20")]
    min_samples_leaf: usize,

    /// Candidate thresholds per feature
    #[arg(long, default_value = "32")]
    max_bins: usize,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value = "0.2")]
    test_fraction: f64,

    /// Seed for deterministic shuffling
    #[arg(long, default_value = "42")]
    seed: i64,

    /// Skip dataset shuffling
    #[arg(long)]
    no_shuffle: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))?;

    info!("churn trainer v{}", churn_trainer::VERSION);

    info!("Loading dataset from: {}", args.input.display());
    let dataset = Dataset::from_csv(&args.input, &args.target).context("Failed to load dataset")?;
    info!(
        "Loaded {} rows, {} columns, churn rate {:.3}",
        dataset.len(),
        dataset.columns.len(),
        dataset.positive_rate()
    );

    let params = TrainingParams {
        estimator: args.estimator,
        alpha: args.alpha,
        learning_rate: args.learning_rate,
        epochs: args.epochs,
        trees: args.trees,
        max_depth: args.max_depth,
        min_samples_leaf: args.min_samples_leaf,
        max_bins: args.max_bins,
        seed: args.seed,
        shuffle: !args.no_shuffle,
        test_fraction: args.test_fraction,
        ..TrainingParams::default()
    };

    let tag = args.tag.clone().unwrap_or_else(|| {
        format!("churn-{}-{}", args.estimator, Utc::now().format("%Y%m%d%H%M%S"))
    });

    let (artifact, report) = train_artifact(&dataset, &params, &tag).context("Training failed")?;

    let hash = churn_core::save(&artifact, &args.output)
        .with_context(|| format!("Failed to write artifact to {}", args.output.display()))?;

    if let Some(path) = &args.schema_output {
        let schema = dataset
            .feature_schema(&params.layout)
            .context("Failed to describe dataset")?;
        let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write schema to {}", path.display()))?;
        info!(
            numeric = schema.numeric_features().count(),
            categorical = schema.categorical_features().count(),
            "Schema: {}",
            path.display()
        );
    }

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    info!("Training completed");
    info!("  Tag: {}", artifact.tag);
    info!("  Estimator: {}", report.estimator);
    info!("  Train accuracy: {:.4}", report.train_accuracy);
    if let Some(acc) = report.test_accuracy {
        info!("  Held-out accuracy: {:.4} ({} rows)", acc, report.test_rows);
    }
    if let Some(loss) = report.test_log_loss {
        info!("  Held-out log loss: {:.4}", loss);
    }
    info!("  Model: {}", args.output.display());
    info!("  Hash: {}", hash);

    Ok(())
}
