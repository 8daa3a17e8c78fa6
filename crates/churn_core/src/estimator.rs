//! Classifier families and fitted classifiers
//!
//! The set of estimators is closed: [`EstimatorKind`] names every family the
//! trainer can fit and the loader can decode. Adding one means adding a
//! variant here, not registering a constructor at runtime.

use crate::errors::InferenceError;
use crate::gbdt::BoostedTrees;
use crate::matrix::FeatureMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown estimator '{0}' (expected one of: ridge, logistic, gradient_boosting)")]
pub struct UnknownEstimator(pub String);

/// Supported classifier families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// Least-squares classifier on {-1, +1} targets; no probabilities
    Ridge,
    /// L2-regularized logistic regression
    Logistic,
    /// Boosted regression trees on the logistic loss
    GradientBoosting,
}

impl EstimatorKind {
    pub const ALL: [EstimatorKind; 3] = [
        EstimatorKind::Ridge,
        EstimatorKind::Logistic,
        EstimatorKind::GradientBoosting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EstimatorKind::Ridge => "ridge",
            EstimatorKind::Logistic => "logistic",
            EstimatorKind::GradientBoosting => "gradient_boosting",
        }
    }

    /// Whether the family yields calibrated probabilities
    pub fn supports_proba(&self) -> bool {
        !matches!(self, EstimatorKind::Ridge)
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EstimatorKind {
    type Err = UnknownEstimator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        EstimatorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownEstimator(s.to_string()))
    }
}

/// Output for one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// 1 = churn, 0 = stays
    pub label: u8,
    /// Churn probability in [0, 1] when the classifier is calibrated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

/// Linear decision function `w·x + b`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearModel {
    pub kind: EstimatorKind,
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    pub fn score_row(&self, features: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept
    }
}

/// A fitted classifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Classifier {
    Linear(LinearModel),
    GradientBoosting(BoostedTrees),
}

impl Classifier {
    pub fn kind(&self) -> EstimatorKind {
        match self {
            Classifier::Linear(model) => model.kind,
            Classifier::GradientBoosting(_) => EstimatorKind::GradientBoosting,
        }
    }

    /// Width of the transformed matrix this classifier consumes
    pub fn n_features(&self) -> usize {
        match self {
            Classifier::Linear(model) => model.weights.len(),
            Classifier::GradientBoosting(model) => model.n_features,
        }
    }

    pub fn supports_proba(&self) -> bool {
        self.kind().supports_proba()
    }

    /// Raw scores for every row, computed in one pass over the batch
    pub fn decision_function(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, InferenceError> {
        if matrix.cols() != self.n_features() {
            return Err(InferenceError::ShapeMismatch {
                expected: self.n_features(),
                found: matrix.cols(),
            });
        }

        let scores: Vec<f64> = match self {
            Classifier::Linear(model) => matrix.iter_rows().map(|row| model.score_row(row)).collect(),
            Classifier::GradientBoosting(model) => {
                matrix.iter_rows().map(|row| model.score_row(row)).collect()
            }
        };

        if scores.len() != matrix.rows() {
            return Err(InferenceError::OutputLength {
                expected: matrix.rows(),
                found: scores.len(),
            });
        }
        if let Some(row) = scores.iter().position(|s| !s.is_finite()) {
            return Err(InferenceError::NonFiniteOutput { row });
        }
        Ok(scores)
    }

    /// Churn probabilities, or `None` for uncalibrated classifiers
    pub fn predict_proba(&self, matrix: &FeatureMatrix) -> Result<Option<Vec<f64>>, InferenceError> {
        if !self.supports_proba() {
            return Ok(None);
        }
        let scores = self.decision_function(matrix)?;
        Ok(Some(scores.into_iter().map(sigmoid).collect()))
    }

    /// Labels (and probabilities when available) for every row
    pub fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<Prediction>, InferenceError> {
        let scores = self.decision_function(matrix)?;
        let calibrated = self.supports_proba();

        Ok(scores
            .into_iter()
            .map(|score| Prediction {
                label: u8::from(score > 0.0),
                probability: calibrated.then(|| sigmoid(score)),
            })
            .collect())
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Classifier::Linear(model) => {
                if model.kind == EstimatorKind::GradientBoosting {
                    return Err("linear classifier tagged as gradient_boosting".to_string());
                }
                if model.weights.is_empty() {
                    return Err("linear classifier has no weights".to_string());
                }
                if !model.intercept.is_finite() || model.weights.iter().any(|w| !w.is_finite()) {
                    return Err("linear classifier has non-finite parameters".to_string());
                }
                Ok(())
            }
            Classifier::GradientBoosting(model) => model.validate(),
        }
    }
}

/// Numerically stable logistic function
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
