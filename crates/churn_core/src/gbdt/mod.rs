//! Gradient boosted trees for binary classification
//!
//! The ensemble outputs a log-odds score:
//!
//! ```text
//! score(x) = base_score + learning_rate * Σ tree_k(x)
//! ```
//!
//! and the churn probability is `sigmoid(score)`. Trees are evaluated on the
//! transformed feature matrix, so thresholds live in standardized units.
//!
//! ```rust
//! use churn_core::gbdt::{BoostedTrees, Node, Tree};
//!
//! let tree = Tree::new(vec![
//!     Node::internal(0, 0.0, 1, 2),
//!     Node::leaf(-1.0),
//!     Node::leaf(1.0),
//! ]);
//! let model = BoostedTrees::new(0.0, 0.5, 1, vec![tree]);
//! assert_eq!(model.score_row(&[2.0]), 0.5);
//! ```

pub mod tree;

pub use tree::{Node, Tree};

use serde::{Deserialize, Serialize};

/// A fitted boosted-tree ensemble
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoostedTrees {
    /// Initial log-odds (prior churn rate)
    pub base_score: f64,
    /// Shrinkage applied to every tree output
    pub learning_rate: f64,
    /// Width of the transformed feature matrix the trees were grown on
    pub n_features: usize,
    pub trees: Vec<Tree>,
}

impl BoostedTrees {
    pub fn new(base_score: f64, learning_rate: f64, n_features: usize, trees: Vec<Tree>) -> Self {
        Self {
            base_score,
            learning_rate,
            n_features,
            trees,
        }
    }

    /// Raw log-odds for one transformed row
    pub fn score_row(&self, features: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|tree| tree.evaluate(features)).sum();
        self.base_score + self.learning_rate * sum
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.base_score.is_finite() {
            return Err(format!("Invalid base_score: {}", self.base_score));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(format!("Invalid learning_rate: {}", self.learning_rate));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| format!("Tree {i} validation failed: {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tree_model() -> BoostedTrees {
        let tree1 = Tree::new(vec![
            Node::internal(0, 0.0, 1, 2),
            Node::leaf(-1.0),
            Node::leaf(1.0),
        ]);
        let tree2 = Tree::new(vec![
            Node::internal(1, 0.5, 1, 2),
            Node::leaf(0.5),
            Node::leaf(-0.5),
        ]);
        BoostedTrees::new(-0.25, 0.1, 2, vec![tree1, tree2])
    }

    #[test]
    fn test_two_tree_model_inference() {
        let model = two_tree_model();

        // Tree1: 1.0 > 0 -> 1.0; Tree2: 0.0 <= 0.5 -> 0.5
        let score = model.score_row(&[1.0, 0.0]);
        assert!((score - (-0.25 + 0.1 * 1.5)).abs() < 1e-12);

        // Tree1: -1.0; Tree2: -0.5
        let score = model.score_row(&[-1.0, 1.0]);
        assert!((score - (-0.25 - 0.15)).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic_inference_repeated() {
        let model = two_tree_model();
        let first = model.score_row(&[0.3, 0.7]);
        assert!((0..100).all(|_| model.score_row(&[0.3, 0.7]).to_bits() == first.to_bits()));
    }

    #[test]
    fn test_validate() {
        assert!(two_tree_model().validate().is_ok());

        let mut narrow = two_tree_model();
        narrow.n_features = 1;
        assert!(narrow.validate().is_err());

        let mut bad_rate = two_tree_model();
        bad_rate.learning_rate = 0.0;
        assert!(bad_rate.validate().is_err());
    }
}
