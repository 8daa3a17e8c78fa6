//! Fitting the preprocessing pipeline and the classifier
//!
//! Training is fully deterministic: the same dataset and parameters give a
//! bit-identical artifact body (apart from `created_at`).

use churn_core::estimator::sigmoid;
use churn_core::gbdt::BoostedTrees;
use churn_core::{
    Classifier, EstimatorKind, FeatureLayout, FeatureMatrix, LinearModel, ModelArtifact,
    Preprocessor,
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::cart::{CartBuilder, TreeConfig};
use crate::dataset::Dataset;
use crate::errors::TrainerError;

/// Training configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingParams {
    pub estimator: EstimatorKind,
    pub layout: FeatureLayout,
    /// L2 strength for ridge and logistic
    pub alpha: f64,
    /// Step size for logistic descent, shrinkage for boosting
    pub learning_rate: f64,
    /// Full-batch passes for logistic regression
    pub epochs: usize,
    /// Boosting rounds
    pub trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub max_bins: usize,
    pub seed: i64,
    pub shuffle: bool,
    /// Share of rows held out for evaluation
    pub test_fraction: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            estimator: EstimatorKind::GradientBoosting,
            layout: FeatureLayout::default(),
            alpha: 1.0,
            learning_rate: 0.1,
            epochs: 500,
            trees: 100,
            max_depth: 3,
            min_samples_leaf: 20,
            max_bins: 32,
            seed: 42,
            shuffle: true,
            test_fraction: 0.2,
        }
    }
}

impl TrainingParams {
    pub fn validate(&self) -> Result<(), TrainerError> {
        self.layout.validate().map_err(TrainerError::InvalidParams)?;

        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(TrainerError::InvalidParams(format!("alpha {} must be >= 0", self.alpha)));
        }
        if self.estimator == EstimatorKind::Ridge && self.alpha == 0.0 {
            return Err(TrainerError::InvalidParams(
                "ridge needs alpha > 0".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainerError::InvalidParams(format!(
                "learning_rate {} must be > 0",
                self.learning_rate
            )));
        }
        if self.estimator == EstimatorKind::GradientBoosting && self.trees == 0 {
            return Err(TrainerError::InvalidParams("trees must be > 0".to_string()));
        }
        if self.estimator == EstimatorKind::Logistic && self.epochs == 0 {
            return Err(TrainerError::InvalidParams("epochs must be > 0".to_string()));
        }
        if !(0.0..1.0).contains(&self.test_fraction) {
            return Err(TrainerError::InvalidParams(format!(
                "test_fraction {} must be in [0, 1)",
                self.test_fraction
            )));
        }
        Ok(())
    }
}

/// Summary of a training run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub estimator: EstimatorKind,
    pub train_rows: usize,
    pub test_rows: usize,
    pub n_features: usize,
    pub positive_rate: f64,
    pub train_accuracy: f64,
    /// `None` when nothing was held out
    pub test_accuracy: Option<f64>,
    /// Held-out mean log loss; `None` for uncalibrated estimators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_log_loss: Option<f64>,
}

impl TrainingReport {
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("train_rows".to_string(), self.train_rows as f64);
        metrics.insert("test_rows".to_string(), self.test_rows as f64);
        metrics.insert("positive_rate".to_string(), self.positive_rate);
        metrics.insert("train_accuracy".to_string(), self.train_accuracy);
        if let Some(acc) = self.test_accuracy {
            metrics.insert("test_accuracy".to_string(), acc);
        }
        if let Some(loss) = self.test_log_loss {
            metrics.insert("test_log_loss".to_string(), loss);
        }
        metrics
    }
}

/// Fit preprocessing and classifier, evaluate, and package an artifact
#[instrument(skip(dataset, params), fields(rows = dataset.len(), estimator = %params.estimator))]
pub fn train_artifact(
    dataset: &Dataset,
    params: &TrainingParams,
    tag: &str,
) -> Result<(ModelArtifact, TrainingReport), TrainerError> {
    params.validate()?;

    let mut data = dataset.clone();
    if params.shuffle {
        data.shuffle(params.seed);
    }
    let (train, test) = data.split(params.test_fraction)?;

    let preprocessor = Preprocessor::fit(&params.layout, &train.records)?;
    let x_train = preprocessor.transform(&train.records)?;
    info!(
        rows = x_train.rows(),
        cols = x_train.cols(),
        held_out = test.len(),
        "fitted preprocessing"
    );

    let classifier = match params.estimator {
        EstimatorKind::Ridge => fit_ridge(&x_train, &train.targets, params.alpha)?,
        EstimatorKind::Logistic => fit_logistic(&x_train, &train.targets, params),
        EstimatorKind::GradientBoosting => fit_boosted_trees(&x_train, &train.targets, params),
    };
    classifier.validate().map_err(TrainerError::Training)?;

    let train_accuracy = accuracy(&classifier, &x_train, &train.targets)?;
    let (test_accuracy, test_log_loss) = if test.is_empty() {
        (None, None)
    } else {
        let x_test = preprocessor.transform(&test.records)?;
        (
            Some(accuracy(&classifier, &x_test, &test.targets)?),
            log_loss(&classifier, &x_test, &test.targets)?,
        )
    };

    let report = TrainingReport {
        estimator: params.estimator,
        train_rows: train.len(),
        test_rows: test.len(),
        n_features: preprocessor.n_outputs(),
        positive_rate: data.positive_rate(),
        train_accuracy,
        test_accuracy,
        test_log_loss,
    };
    info!(
        train_accuracy = report.train_accuracy,
        test_accuracy = ?report.test_accuracy,
        test_log_loss = ?report.test_log_loss,
        "training complete"
    );

    let artifact = ModelArtifact::new(tag, preprocessor, classifier).with_metrics(report.metrics());
    Ok((artifact, report))
}

fn accuracy(classifier: &Classifier, x: &FeatureMatrix, y: &[u8]) -> Result<f64, TrainerError> {
    let predictions = classifier
        .predict(x)
        .map_err(|e| TrainerError::Training(e.to_string()))?;
    let correct = predictions
        .iter()
        .zip(y)
        .filter(|(p, t)| p.label == **t)
        .count();
    Ok(correct as f64 / y.len().max(1) as f64)
}

fn log_loss(classifier: &Classifier, x: &FeatureMatrix, y: &[u8]) -> Result<Option<f64>, TrainerError> {
    let Some(probabilities) = classifier
        .predict_proba(x)
        .map_err(|e| TrainerError::Training(e.to_string()))?
    else {
        return Ok(None);
    };
    let total: f64 = probabilities
        .iter()
        .zip(y)
        .map(|(&p, &t)| {
            let p = p.clamp(1e-15, 1.0 - 1e-15);
            if t == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    Ok(Some(total / y.len().max(1) as f64))
}

/// Least squares on {-1, +1} targets with an L2 penalty, solved in closed
/// form on centered data so the intercept is not penalised.
fn fit_ridge(x: &FeatureMatrix, y: &[u8], alpha: f64) -> Result<Classifier, TrainerError> {
    let n = x.rows() as f64;
    let d = x.cols();
    let targets: Vec<f64> = y.iter().map(|&t| if t == 1 { 1.0 } else { -1.0 }).collect();

    let mut x_mean = vec![0.0; d];
    for row in x.iter_rows() {
        for (m, v) in x_mean.iter_mut().zip(row) {
            *m += v / n;
        }
    }
    let y_mean = targets.iter().sum::<f64>() / n;

    // Normal equations: (XcᵀXc + αI) w = Xcᵀyc
    let mut gram = DMatrix::<f64>::zeros(d, d);
    let mut rhs = DVector::<f64>::zeros(d);
    for (row, t) in x.iter_rows().zip(&targets) {
        let centered = DVector::from_iterator(d, row.iter().zip(&x_mean).map(|(v, m)| v - m));
        rhs.axpy(t - y_mean, &centered, 1.0);
        gram.ger(1.0, &centered, &centered, 1.0);
    }
    for i in 0..d {
        gram[(i, i)] += alpha;
    }

    let weights = solve(gram, rhs)
        .ok_or_else(|| TrainerError::Training("ridge system is singular".to_string()))?;
    let intercept = y_mean - weights.iter().zip(&x_mean).map(|(w, m)| w * m).sum::<f64>();

    Ok(Classifier::Linear(LinearModel {
        kind: EstimatorKind::Ridge,
        weights,
        intercept,
    }))
}

/// Solve `a·w = b` for a symmetric `a`, falling back to LU when it is not
/// positive definite
fn solve(a: DMatrix<f64>, b: DVector<f64>) -> Option<Vec<f64>> {
    let w = match a.clone().cholesky() {
        Some(chol) => chol.solve(&b),
        None => a.lu().solve(&b)?,
    };
    w.iter().all(|v| v.is_finite()).then(|| w.iter().copied().collect())
}

/// Full-batch gradient descent on the mean log loss plus `alpha/2n ||w||²`
fn fit_logistic(x: &FeatureMatrix, y: &[u8], params: &TrainingParams) -> Classifier {
    let n = x.rows() as f64;
    let mut weights = vec![0.0; x.cols()];
    let mut intercept = 0.0;

    for epoch in 0..params.epochs {
        let mut grad_w = vec![0.0; x.cols()];
        let mut grad_b = 0.0;
        let mut loss = 0.0;

        for (row, &t) in x.iter_rows().zip(y) {
            let z = row.iter().zip(&weights).map(|(v, w)| v * w).sum::<f64>() + intercept;
            let p = sigmoid(z);
            let residual = p - f64::from(t);
            for (g, v) in grad_w.iter_mut().zip(row) {
                *g += residual * v;
            }
            grad_b += residual;
            loss -= if t == 1 { p.max(1e-15).ln() } else { (1.0 - p).max(1e-15).ln() };
        }

        for (w, g) in weights.iter_mut().zip(&grad_w) {
            *w -= params.learning_rate * (g + params.alpha * *w) / n;
        }
        intercept -= params.learning_rate * grad_b / n;

        if epoch % 100 == 0 {
            debug!(epoch, loss = loss / n, "logistic descent");
        }
    }

    Classifier::Linear(LinearModel {
        kind: EstimatorKind::Logistic,
        weights,
        intercept,
    })
}

/// Boosting on the logistic loss, starting from the prior log-odds
fn fit_boosted_trees(x: &FeatureMatrix, y: &[u8], params: &TrainingParams) -> Classifier {
    let positive = y.iter().filter(|&&t| t == 1).count() as f64 / y.len().max(1) as f64;
    let prior = positive.clamp(1e-6, 1.0 - 1e-6);
    let base_score = (prior / (1.0 - prior)).ln();

    let tree_config = TreeConfig {
        max_depth: params.max_depth,
        min_samples_leaf: params.min_samples_leaf,
        max_bins: params.max_bins,
        lambda: params.alpha,
    };

    let mut scores = vec![base_score; x.rows()];
    let mut trees = Vec::with_capacity(params.trees);

    for tree_idx in 0..params.trees {
        let mut gradients = Vec::with_capacity(x.rows());
        let mut hessians = Vec::with_capacity(x.rows());
        for (&score, &t) in scores.iter().zip(y) {
            let p = sigmoid(score);
            gradients.push(p - f64::from(t));
            hessians.push((p * (1.0 - p)).max(1e-12));
        }

        let tree = CartBuilder::new(x, &gradients, &hessians, tree_config.clone()).build();
        for (score, row) in scores.iter_mut().zip(x.iter_rows()) {
            *score += params.learning_rate * tree.evaluate(row);
        }
        debug!(tree = tree_idx + 1, nodes = tree.nodes.len(), "grew tree");
        trees.push(tree);
    }

    Classifier::GradientBoosting(BoostedTrees::new(
        base_score,
        params.learning_rate,
        x.cols(),
        trees,
    ))
}
