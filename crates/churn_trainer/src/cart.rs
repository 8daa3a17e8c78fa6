//! CART (Classification and Regression Tree) builder
//!
//! Greedy second-order regression trees over the transformed feature
//! matrix. Candidate thresholds are per-feature quantiles computed once
//! per tree; split search accumulates gradient/hessian histograms over
//! those bins.

use churn_core::gbdt::{Node, Tree};
use churn_core::FeatureMatrix;

use crate::deterministic::SplitTieBreaker;

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Upper bound on candidate thresholds per feature
    pub max_bins: usize,
    /// L2 regularisation on leaf values
    pub lambda: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_samples_leaf: 20,
            max_bins: 32,
            lambda: 1.0,
        }
    }
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

#[derive(Debug, Clone, Copy, Default)]
struct BinStats {
    gradient: f64,
    hessian: f64,
    count: usize,
}

/// Build a regression tree on precomputed gradients and hessians
pub struct CartBuilder<'a> {
    config: TreeConfig,
    matrix: &'a FeatureMatrix,
    gradients: &'a [f64],
    hessians: &'a [f64],
    /// Sorted candidate thresholds per feature
    thresholds: Vec<Vec<f64>>,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        matrix: &'a FeatureMatrix,
        gradients: &'a [f64],
        hessians: &'a [f64],
        config: TreeConfig,
    ) -> Self {
        let thresholds = (0..matrix.cols())
            .map(|feature_idx| candidate_thresholds(matrix, feature_idx, config.max_bins))
            .collect();

        Self {
            config,
            matrix,
            gradients,
            hessians,
            thresholds,
        }
    }

    /// Build tree and return it
    pub fn build(&self) -> Tree {
        let n = self.matrix.rows().min(self.gradients.len()).min(self.hessians.len());
        let indices: Vec<usize> = (0..n).collect();
        let mut nodes = Vec::new();

        self.build_node(&indices, 0, &mut nodes, 0);

        Tree::new(nodes)
    }

    /// Recursively build tree nodes; parents are pushed before children
    fn build_node(&self, indices: &[usize], depth: usize, nodes: &mut Vec<Node>, node_id: usize) -> i32 {
        let current_idx = nodes.len() as i32;
        let leaf_value = self.leaf_value(indices);

        if depth >= self.config.max_depth || indices.len() < 2 * self.config.min_samples_leaf {
            nodes.push(Node::leaf(leaf_value));
            return current_idx;
        }

        let Some(split) = self.find_best_split(indices, node_id) else {
            nodes.push(Node::leaf(leaf_value));
            return current_idx;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.matrix.row(i)[split.feature_idx] <= split.threshold);

        // Reserve the slot; children are linked after they are built
        nodes.push(Node::internal(split.feature_idx as i32, split.threshold, -1, -1));

        let left_idx = self.build_node(&left, depth + 1, nodes, node_id * 2 + 1);
        let right_idx = self.build_node(&right, depth + 1, nodes, node_id * 2 + 2);

        let node = &mut nodes[current_idx as usize];
        node.left = left_idx;
        node.right = right_idx;

        current_idx
    }

    fn find_best_split(&self, indices: &[usize], node_id: usize) -> Option<SplitCandidate> {
        let parent = self.sum(indices);
        let parent_score = self.score(parent.gradient, parent.hessian);
        let mut best: Option<SplitCandidate> = None;

        for (feature_idx, thresholds) in self.thresholds.iter().enumerate() {
            if thresholds.is_empty() {
                continue;
            }

            // bins[k] holds rows with thresholds[k-1] < x <= thresholds[k];
            // the extra last bin holds everything above the top threshold
            let mut bins = vec![BinStats::default(); thresholds.len() + 1];
            for &i in indices {
                let x = self.matrix.row(i)[feature_idx];
                let bin = thresholds.partition_point(|t| *t < x);
                bins[bin].gradient += self.gradients[i];
                bins[bin].hessian += self.hessians[i];
                bins[bin].count += 1;
            }

            let mut left = BinStats::default();
            for (bin, threshold) in thresholds.iter().enumerate() {
                left.gradient += bins[bin].gradient;
                left.hessian += bins[bin].hessian;
                left.count += bins[bin].count;

                let right_count = parent.count - left.count;
                if left.count < self.config.min_samples_leaf
                    || right_count < self.config.min_samples_leaf
                {
                    continue;
                }

                let gain = self.score(left.gradient, left.hessian)
                    + self.score(parent.gradient - left.gradient, parent.hessian - left.hessian)
                    - parent_score;
                if !gain.is_finite() || gain <= 1e-12 {
                    continue;
                }

                let candidate = SplitCandidate {
                    feature_idx,
                    threshold: *threshold,
                    gain,
                    tie_breaker: SplitTieBreaker::new(feature_idx, bin, node_id),
                };

                let better = match &best {
                    None => true,
                    Some(current) => {
                        gain > current.gain
                            || (gain == current.gain && candidate.tie_breaker < current.tie_breaker)
                    }
                };
                if better {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    fn sum(&self, indices: &[usize]) -> BinStats {
        indices.iter().fold(BinStats::default(), |mut acc, &i| {
            acc.gradient += self.gradients[i];
            acc.hessian += self.hessians[i];
            acc.count += 1;
            acc
        })
    }

    /// Structure score G²/(H+λ)
    fn score(&self, gradient: f64, hessian: f64) -> f64 {
        gradient * gradient / (hessian + self.config.lambda)
    }

    /// Optimal leaf value: -G/(H+λ)
    fn leaf_value(&self, indices: &[usize]) -> f64 {
        let stats = self.sum(indices);
        let denom = stats.hessian + self.config.lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -stats.gradient / denom
    }
}

/// Sorted distinct values of a feature, thinned to at most `max_bins`
/// quantiles. The largest value is dropped since splitting on it sends
/// every row left.
fn candidate_thresholds(matrix: &FeatureMatrix, feature_idx: usize, max_bins: usize) -> Vec<f64> {
    let mut values: Vec<f64> = matrix.iter_rows().map(|row| row[feature_idx]).collect();
    values.sort_by(f64::total_cmp);
    values.dedup();
    values.pop();

    if values.len() <= max_bins || max_bins == 0 {
        return values;
    }

    let mut picked: Vec<f64> = (1..=max_bins)
        .map(|k| values[(k * values.len()) / (max_bins + 1)])
        .collect();
    picked.dedup();
    picked
}
