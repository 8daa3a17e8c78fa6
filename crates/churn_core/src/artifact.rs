//! The versioned model artifact
//!
//! A [`ModelArtifact`] bundles the fitted [`Preprocessor`] with the fitted
//! [`Classifier`]. It is written once by the trainer and read once by the
//! service; nothing mutates it in between. On disk it is wrapped in an
//! envelope carrying the format version, the preprocessing pipeline version
//! and a Blake3 hash of the canonical JSON of the model body.

use crate::errors::{ChurnError, ValidationError};
use crate::estimator::{Classifier, EstimatorKind, Prediction};
use crate::preprocessing::{InputColumn, Preprocessor};
use crate::record::CustomerRecord;
use crate::serde_canon::{hash_canonical_hex, CanonicalError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::error;

/// Layout version of the on-disk envelope
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Version tag of the shared preprocessing code. Bump whenever a change to
/// [`crate::preprocessing`] would alter how an existing artifact transforms
/// its input.
pub const PIPELINE_VERSION: &str = "churn-pipeline/1";

/// Upper bound on artifact file size accepted by the loader
pub const MAX_ARTIFACT_BYTES: u64 = 64 * 1024 * 1024;

/// Trained pipeline: preprocessing parameters plus classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Human-readable version tag, e.g. `churn-gbdt-2024-05-01`
    pub tag: String,
    pub created_at: DateTime<Utc>,
    pub estimator: EstimatorKind,
    /// Raw columns the artifact requires, in pipeline order
    pub input_columns: Vec<InputColumn>,
    pub preprocessor: Preprocessor,
    pub classifier: Classifier,
    /// Evaluation numbers recorded at training time
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl ModelArtifact {
    pub fn new(tag: impl Into<String>, preprocessor: Preprocessor, classifier: Classifier) -> Self {
        Self {
            tag: tag.into(),
            created_at: Utc::now(),
            estimator: classifier.kind(),
            input_columns: preprocessor.input_columns(),
            preprocessor,
            classifier,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: BTreeMap<String, f64>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Blake3 hex digest of the canonical JSON of the artifact body
    pub fn hash(&self) -> Result<String, CanonicalError> {
        hash_canonical_hex(self)
    }

    /// Width of the transformed matrix
    pub fn n_features(&self) -> usize {
        self.preprocessor.n_outputs()
    }

    pub fn supports_proba(&self) -> bool {
        self.classifier.supports_proba()
    }

    /// Structural consistency between preprocessor and classifier
    pub fn validate(&self) -> Result<(), String> {
        if self.tag.trim().is_empty() {
            return Err("artifact tag is empty".to_string());
        }
        if self.classifier.kind() != self.estimator {
            return Err(format!(
                "declared estimator '{}' does not match classifier '{}'",
                self.estimator,
                self.classifier.kind()
            ));
        }

        self.preprocessor.validate()?;
        self.classifier.validate()?;

        if self.input_columns != self.preprocessor.input_columns() {
            return Err("declared input columns differ from the preprocessor inputs".to_string());
        }
        if self.classifier.n_features() != self.preprocessor.n_outputs() {
            return Err(format!(
                "classifier expects {} features, preprocessor produces {}",
                self.classifier.n_features(),
                self.preprocessor.n_outputs()
            ));
        }
        if self.metrics.values().any(|v| !v.is_finite()) {
            return Err("artifact metrics contain non-finite values".to_string());
        }
        Ok(())
    }

    /// Transform the whole batch once, then score it once.
    ///
    /// Predictions come back in input order. Any invalid record fails the
    /// whole batch.
    pub fn predict(&self, records: &[CustomerRecord]) -> Result<Vec<Prediction>, ChurnError> {
        if records.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }

        let matrix = self.preprocessor.transform(records)?;
        self.classifier.predict(&matrix).map_err(|e| {
            error!(
                rows = matrix.rows(),
                cols = matrix.cols(),
                model = %self.tag,
                "inference failed: {}",
                e
            );
            ChurnError::from(e)
        })
    }
}

/// On-disk wrapper around a [`ModelArtifact`]
///
/// The model body stays a raw JSON value until the versions and hash have
/// been checked, so an incompatible artifact is reported as such rather than
/// as a decoding failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub format_version: u32,
    pub pipeline_version: String,
    pub model_hash: String,
    pub model: Value,
}

/// Summary of a loaded artifact, served on the model endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub tag: String,
    pub model_hash: String,
    pub format_version: u32,
    pub pipeline_version: String,
    pub estimator: EstimatorKind,
    pub input_columns: Vec<InputColumn>,
    pub n_features: usize,
    /// Transformed feature names, one per classifier input
    pub feature_names: Vec<String>,
    pub supports_proba: bool,
    pub created_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
    /// File the artifact was loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ArtifactInfo {
    pub fn new(artifact: &ModelArtifact, model_hash: impl Into<String>) -> Self {
        Self {
            tag: artifact.tag.clone(),
            model_hash: model_hash.into(),
            format_version: ARTIFACT_FORMAT_VERSION,
            pipeline_version: PIPELINE_VERSION.to_string(),
            estimator: artifact.estimator,
            input_columns: artifact.input_columns.clone(),
            n_features: artifact.n_features(),
            feature_names: artifact.preprocessor.output_names(),
            supports_proba: artifact.supports_proba(),
            created_at: artifact.created_at,
            metrics: artifact.metrics.clone(),
            path: None,
        }
    }
}
