//! The fixed-layout node record.

use serde::{Deserialize, Serialize};

/// Child-slot sentinel: this node is a leaf.
pub const TREE_LEAF: i64 = -1;

/// Link sentinel: no such node (the root's parent, a leaf's feature).
pub const TREE_UNDEFINED: i64 = -2;

/// One node of a tree, stored inline in the arena.
///
/// Field names and widths are part of the serde export contract and must
/// not be changed: indices are 64-bit, per-node losses and weights are
/// `f32`, impurity is `f64`, and the routing threshold is a `u8` bin code.
/// The in-memory layout is left to the compiler.
///
/// Routing rule at an internal node: a sample goes left iff its bin code
/// for `feature` is `<= bin_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// This node's own index in the arena.
    pub node_id: u64,
    /// Parent index, or [`TREE_UNDEFINED`] for the root.
    pub parent: i64,
    /// Left child index, or [`TREE_LEAF`].
    pub left_child: i64,
    /// Right child index, or [`TREE_LEAF`].
    pub right_child: i64,
    /// Whether the node is terminal.
    pub is_leaf: bool,
    /// Whether the node is its parent's left child.
    pub is_left: bool,
    /// Depth of the node (root = 0).
    pub depth: u64,
    /// Split feature index, or [`TREE_UNDEFINED`] for leaves.
    pub feature: i64,
    /// Real-valued split threshold. Informational only; routing uses
    /// `bin_threshold`.
    pub threshold: f32,
    /// Bin-code threshold actually used for routing.
    pub bin_threshold: u8,
    /// Impurity of the node's training samples.
    pub impurity: f64,
    /// Number of training samples in the node.
    pub n_samples_train: u64,
    /// Number of validation (out-of-bag) samples in the node.
    pub n_samples_valid: u64,
    /// Weighted number of training samples.
    pub w_samples_train: f32,
    /// Weighted number of validation samples.
    pub w_samples_valid: f32,
    /// `partition_train[start_train..end_train]` holds the node's training
    /// sample indices.
    pub start_train: u64,
    pub end_train: u64,
    /// `partition_valid[start_valid..end_valid]` holds the node's validation
    /// sample indices.
    pub start_valid: u64,
    pub end_valid: u64,
    /// Held-out loss of this node's own prediction.
    pub loss_valid: f32,
    /// Log of the aggregation weight of the subtree rooted here. Written by
    /// training after the tree is grown; consumed by aggregated prediction.
    pub log_weight_tree: f32,
}

impl Default for Node {
    /// An unlinked placeholder used to zero-fill grown capacity.
    fn default() -> Self {
        Node {
            node_id: 0,
            parent: TREE_UNDEFINED,
            left_child: TREE_LEAF,
            right_child: TREE_LEAF,
            is_leaf: false,
            is_left: false,
            depth: 0,
            feature: TREE_UNDEFINED,
            threshold: f32::NAN,
            bin_threshold: 0,
            impurity: 0.0,
            n_samples_train: 0,
            n_samples_valid: 0,
            w_samples_train: 0.0,
            w_samples_valid: 0.0,
            start_train: 0,
            end_train: 0,
            start_valid: 0,
            end_valid: 0,
            loss_valid: 0.0,
            log_weight_tree: f32::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_node_is_unlinked() {
        let node = Node::default();
        assert_eq!(node.parent, TREE_UNDEFINED);
        assert_eq!(node.left_child, TREE_LEAF);
        assert_eq!(node.right_child, TREE_LEAF);
        assert_eq!(node.feature, TREE_UNDEFINED);
        assert!(node.threshold.is_nan());
        assert!(node.log_weight_tree.is_nan());
    }

    #[test]
    fn node_serde_roundtrip() {
        let node = Node {
            node_id: 4,
            parent: 1,
            left_child: TREE_LEAF,
            right_child: TREE_LEAF,
            is_leaf: true,
            is_left: false,
            depth: 2,
            threshold: 0.75,
            loss_valid: 0.25,
            log_weight_tree: -0.5,
            ..Node::default()
        };
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back.node_id, 4);
        assert_eq!(back.parent, 1);
        assert!(back.is_leaf);
        assert_eq!(back.threshold, 0.75);
        assert_eq!(back.loss_valid, 0.25);
        assert_eq!(back.log_weight_tree, -0.5);
    }
}
