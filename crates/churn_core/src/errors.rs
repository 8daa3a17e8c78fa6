//! Error types for the churn pipeline
//!
//! The taxonomy mirrors who can fix the problem: [`ValidationError`] is
//! caused by the caller's input, [`ArtifactLoadError`] is fatal at startup,
//! and [`InferenceError`] is a server-side failure during prediction.

use crate::schema::SchemaError;
use std::path::PathBuf;
use thiserror::Error;

/// Client-caused problems with a batch or one of its records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The batch contained no records
    #[error("batch must contain at least one record")]
    EmptyBatch,

    /// The batch exceeds the configured size limit
    #[error("batch of {size} records exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    /// A required feature was absent (or null)
    #[error("record {index}: missing required feature '{feature}'")]
    MissingFeature { index: usize, feature: String },

    /// A feature had the wrong coarse type
    #[error("record {index}: feature '{feature}' expected {expected}, got {found}")]
    WrongType {
        index: usize,
        feature: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A numeric feature was NaN or infinite
    #[error("record {index}: feature '{feature}' is not a finite number")]
    NonFinite { index: usize, feature: String },
}

impl ValidationError {
    /// Whether the error concerns a single record rather than the batch shape
    pub fn is_record_level(&self) -> bool {
        !matches!(
            self,
            ValidationError::EmptyBatch | ValidationError::BatchTooLarge { .. }
        )
    }
}

/// Failures while loading a persisted model artifact
#[derive(Error, Debug)]
pub enum ArtifactLoadError {
    #[error("artifact not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {} is {size} bytes, above the {limit} byte limit", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("artifact {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("incompatible artifact: {0}")]
    IncompatibleVersion(String),

    #[error("artifact hash mismatch: recorded {recorded}, computed {computed}")]
    HashMismatch { recorded: String, computed: String },

    #[error("invalid artifact: {0}")]
    Invalid(String),

    #[error("feature schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Server-side failures inside the classifier call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("feature matrix has {found} columns, classifier expects {expected}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("classifier produced a non-finite score for row {row}")]
    NonFiniteOutput { row: usize },

    #[error("classifier returned {found} scores for {expected} rows")]
    OutputLength { expected: usize, found: usize },
}

/// Umbrella error for operations that can fail in more than one way
#[derive(Error, Debug)]
pub enum ChurnError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    ArtifactLoad(#[from] ArtifactLoadError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ChurnError {
    /// True when the caller can fix the problem by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChurnError::Validation(_))
    }

    /// Short machine-readable label used in responses and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ChurnError::Validation(_) => "validation_error",
            ChurnError::ArtifactLoad(_) => "artifact_load_error",
            ChurnError::Inference(_) => "inference_error",
        }
    }
}

/// Result type for churn pipeline operations
pub type Result<T> = std::result::Result<T, ChurnError>;
