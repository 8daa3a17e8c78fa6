//! Churn model trainer
//!
//! Fits the shared preprocessing pipeline and one of the supported
//! classifiers on a labeled CSV, evaluates it on a held-out split, and
//! writes a versioned artifact the service can load.

pub mod cart;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod trainer;

use churn_core::ModelArtifact;
use std::path::Path;

pub use dataset::{Dataset, DEFAULT_TARGET_COLUMN};
pub use deterministic::SplitTieBreaker;
pub use errors::TrainerError;
pub use trainer::{train_artifact, TrainingParams, TrainingReport};

/// Train directly from a CSV file and write the artifact to `output`.
///
/// Returns the artifact, its report and the recorded model hash.
pub fn train_from_csv(
    input: &Path,
    target_column: &str,
    output: &Path,
    params: &TrainingParams,
    tag: &str,
) -> Result<(ModelArtifact, TrainingReport, String), TrainerError> {
    let dataset = Dataset::from_csv(input, target_column)?;
    let (artifact, report) = train_artifact(&dataset, params, tag)?;
    let hash = churn_core::save(&artifact, output)?;
    Ok((artifact, report, hash))
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
