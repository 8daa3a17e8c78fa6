use churn_core::{ArtifactWriteError, SchemaError, ValidationError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("failed to read dataset {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {reason}")]
    Csv { line: usize, reason: String },

    #[error("malformed CSV: {0}")]
    CsvFormat(#[from] csv::Error),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("invalid training parameters: {0}")]
    InvalidParams(String),

    #[error("preprocessing failed: {0}")]
    Preprocessing(#[from] ValidationError),

    #[error("training error: {0}")]
    Training(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Write(#[from] ArtifactWriteError),
}
