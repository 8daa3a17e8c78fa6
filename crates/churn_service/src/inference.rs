//! Batch inference over the loaded model

use crate::metrics;
use crate::state::ModelHandle;
use crate::validation::{validate_batch, RawRecord};
use churn_core::{ChurnError, Prediction, ValidationError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Error, Debug)]
pub enum PredictError {
    /// No model is serving yet, or loading failed
    #[error("model is not ready (state: {state})")]
    Unavailable { state: String },

    #[error(transparent)]
    Churn(#[from] ChurnError),
}

impl From<ValidationError> for PredictError {
    fn from(err: ValidationError) -> Self {
        PredictError::Churn(err.into())
    }
}

impl PredictError {
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::Unavailable { .. } => "service_unavailable",
            PredictError::Churn(err) => err.kind(),
        }
    }
}

/// Identifies the model that produced a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    pub tag: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// One entry per input record, in input order
    pub predictions: Vec<Prediction>,
    pub model: ModelRef,
}

/// Scalar-label form of [`PredictResponse`] for clients that compare the
/// prediction against `0`/`1` directly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelResponse {
    pub predictions: Vec<u8>,
    /// Present only when every prediction carries a probability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f64>>,
    pub model: ModelRef,
}

impl From<PredictResponse> for LabelResponse {
    fn from(response: PredictResponse) -> Self {
        let probabilities = response
            .predictions
            .iter()
            .map(|p| p.probability)
            .collect::<Option<Vec<f64>>>();
        Self {
            predictions: response.predictions.iter().map(|p| p.label).collect(),
            probabilities,
            model: response.model,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceService {
    handle: Arc<ModelHandle>,
    max_batch_size: usize,
}

impl InferenceService {
    pub fn new(handle: Arc<ModelHandle>, max_batch_size: usize) -> Self {
        Self {
            handle,
            max_batch_size,
        }
    }

    pub fn handle(&self) -> &Arc<ModelHandle> {
        &self.handle
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Validate, transform and score a batch.
    ///
    /// The batch is all-or-nothing: any invalid record fails the request and
    /// no predictions are returned.
    #[instrument(skip_all, fields(records = batch.len()))]
    pub fn predict(&self, batch: &[RawRecord]) -> Result<PredictResponse, PredictError> {
        let started = Instant::now();
        let result = self.predict_inner(batch);

        match &result {
            Ok(response) => {
                metrics::record_success(response.predictions.len(), started.elapsed());
                debug!(
                    records = response.predictions.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "batch scored"
                );
            }
            Err(err) => {
                metrics::record_failure(err.kind(), started.elapsed());
                if matches!(err, PredictError::Churn(e) if e.is_client_error()) {
                    debug!(error = %err, "rejected batch");
                } else {
                    warn!(error = %err, kind = err.kind(), "prediction failed");
                }
            }
        }

        result
    }

    fn predict_inner(&self, batch: &[RawRecord]) -> Result<PredictResponse, PredictError> {
        let model = self.handle.model().ok_or_else(|| PredictError::Unavailable {
            state: self.handle.state().to_string(),
        })?;

        if batch.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        if batch.len() > self.max_batch_size {
            return Err(ValidationError::BatchTooLarge {
                size: batch.len(),
                limit: self.max_batch_size,
            }
            .into());
        }

        let artifact = &model.artifact.artifact;
        let records = validate_batch(batch, &artifact.input_columns)?;
        let predictions = artifact.predict(&records)?;

        Ok(PredictResponse {
            predictions,
            model: ModelRef {
                tag: model.tag().to_string(),
                hash: model.model_hash().to_string(),
            },
        })
    }
}
