//! Decision tree structures for boosted-tree inference
//!
//! Trees are stored as flat node arrays with the root at index 0. Children
//! always sit at a higher index than their parent, which keeps traversal
//! bounded by the node count.

use serde::{Deserialize, Serialize};

/// A decision tree node (internal or leaf)
///
/// For internal nodes `feature_idx >= 0` and `left`/`right` point to child
/// indices; for leaves `feature_idx == -1` and `leaf` holds the output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    pub feature_idx: i32,

    /// Samples with `feature <= threshold` go left
    pub threshold: f64,

    /// Leaf value (Some for leaf nodes, None for internal nodes)
    pub leaf: Option<f64>,
}

impl Node {
    pub fn internal(feature_idx: i32, threshold: f64, left: i32, right: i32) -> Self {
        Self {
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
        }
    }

    pub fn leaf(value: f64) -> Self {
        Self {
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }
}

/// A single regression tree
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Evaluate the tree on one feature row.
    ///
    /// Assumes the tree passed [`Tree::validate`]; malformed links yield 0.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;

        for _ in 0..self.nodes.len() {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };

            if node.is_leaf() {
                return node.leaf.unwrap_or(0.0);
            }

            let Some(&value) = features.get(node.feature_idx as usize) else {
                return 0.0;
            };

            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
            if next <= idx as i32 {
                return 0.0;
            }
            idx = next as usize;
        }

        0.0
    }

    /// Validate structure against the number of input features
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                match node.leaf {
                    Some(v) if v.is_finite() => {}
                    Some(_) => return Err(format!("Leaf node {i} has a non-finite value")),
                    None => return Err(format!("Leaf node {i} has no leaf value")),
                }
                continue;
            }

            if node.feature_idx < 0 || node.feature_idx as usize >= n_features {
                return Err(format!(
                    "Internal node {} has invalid feature index: {}",
                    i, node.feature_idx
                ));
            }
            if !node.threshold.is_finite() {
                return Err(format!("Internal node {i} has a non-finite threshold"));
            }
            for child in [node.left, node.right] {
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(format!("Node {i} has invalid child: {child}"));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree::new(vec![
            Node::internal(0, 0.5, 1, 2),
            Node::leaf(-1.0),
            Node::leaf(2.0),
        ])
    }

    #[test]
    fn test_node_creation() {
        let internal = Node::internal(3, 1.25, 1, 2);
        assert!(!internal.is_leaf());
        let leaf = Node::leaf(-0.25);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.leaf, Some(-0.25));
    }

    #[test]
    fn test_tree_evaluation() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[0.0]), -1.0);
        assert_eq!(tree.evaluate(&[0.5]), -1.0); // Equal goes left
        assert_eq!(tree.evaluate(&[0.7]), 2.0);
    }

    #[test]
    fn test_tree_validation() {
        assert!(stump().validate(1).is_ok());
        assert!(stump().validate(0).is_err());

        let backwards = Tree::new(vec![
            Node::leaf(1.0),
            Node::internal(0, 0.5, 0, 2),
            Node::leaf(2.0),
        ]);
        assert!(backwards.validate(1).is_err());

        let cycle = Tree::new(vec![Node::internal(0, 0.5, 0, 1), Node::leaf(1.0)]);
        assert!(cycle.validate(1).is_err());
        assert_eq!(cycle.evaluate(&[0.0]), 0.0);
    }
}
