//! The node arena: flat storage for one tree and its per-node predictions.

// Appending a node writes every field of the record at once.
#![allow(clippy::too_many_arguments)]

use ndarray::ArrayView1;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use super::node::{Node, TREE_LEAF, TREE_UNDEFINED};
use super::NodeId;
use crate::utils::Parallelism;

/// Initial capacity of an empty arena.
const INITIAL_CAPACITY: usize = 3;

/// Input validation errors for the batch entry points.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TreeError {
    #[error("input has {got} features but the tree was built over {expected}")]
    FeatureCountMismatch { expected: usize, got: usize },

    #[error("tree has no nodes; append a root before predicting")]
    EmptyTree,

    #[error("tree stores values of width {width}; scalar prediction requires width 1")]
    NotScalar { width: usize },
}

/// A single decision tree stored as a growable, flat array of [`Node`]
/// records plus a parallel prediction array.
///
/// Classification trees store one class-probability vector per node
/// (`value_width == n_classes`); regression trees store one scalar per node
/// (`value_width == 1`). Both live in a single contiguous `f32` block so
/// traversal and aggregation stay cache-friendly.
///
/// Capacity only grows (doubling, minimum [`INITIAL_CAPACITY`]) and never
/// shrinks during a build. Allocation failure is fatal: there is no
/// partial-tree recovery.
///
/// The tree owns an explicit PRNG seeded from `random_state`, for use by
/// the build context driving it; no global generator is touched.
#[derive(Debug, Clone)]
pub struct Tree {
    n_features: usize,
    value_width: usize,
    node_count: usize,
    capacity: usize,
    nodes: Vec<Node>,
    /// Per-node prediction storage, `capacity * value_width` long,
    /// zero-filled on growth.
    values: Vec<f32>,
    random_state: u64,
    rng: Xoshiro256PlusPlus,
}

impl Tree {
    /// Create an empty classification tree predicting `n_classes`
    /// probabilities per node.
    pub fn classifier(n_features: usize, n_classes: usize, random_state: u64) -> Self {
        Self::with_value_width(n_features, n_classes, random_state)
    }

    /// Create an empty regression tree predicting one scalar per node.
    pub fn regressor(n_features: usize, random_state: u64) -> Self {
        Self::with_value_width(n_features, 1, random_state)
    }

    fn with_value_width(n_features: usize, value_width: usize, random_state: u64) -> Self {
        debug_assert!(value_width > 0);
        Tree {
            n_features,
            value_width,
            node_count: 0,
            capacity: 0,
            nodes: Vec::new(),
            values: Vec::new(),
            random_state,
            rng: Xoshiro256PlusPlus::seed_from_u64(random_state),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of input features the tree routes on.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Width of one node's prediction entry (`n_classes`, or 1 for regression).
    #[inline]
    pub fn value_width(&self) -> usize {
        self.value_width
    }

    /// Number of nodes currently in the tree.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Maximum number of nodes storable without growing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Seed this tree was created with.
    #[inline]
    pub fn random_state(&self) -> u64 {
        self.random_state
    }

    /// The tree's own PRNG, for the build context driving this tree.
    #[inline]
    pub fn rng_mut(&mut self) -> &mut Xoshiro256PlusPlus {
        &mut self.rng
    }

    /// A single node record.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        debug_assert!(id < self.node_count);
        &self.nodes[id]
    }

    /// The live node records, in append order (the export surface).
    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes[..self.node_count]
    }

    /// The prediction entry of one node.
    #[inline]
    pub fn value(&self, id: NodeId) -> &[f32] {
        debug_assert!(id < self.node_count);
        &self.values[id * self.value_width..(id + 1) * self.value_width]
    }

    /// Write the prediction entry of one node.
    ///
    /// Called once per node, when the node is finalized as a leaf or when
    /// its children exist.
    ///
    /// # Panics
    /// Panics if `value` does not have length `value_width`.
    pub fn set_value(&mut self, id: NodeId, value: &[f32]) {
        assert_eq!(value.len(), self.value_width, "prediction width mismatch");
        debug_assert!(id < self.node_count);
        self.values[id * self.value_width..(id + 1) * self.value_width].copy_from_slice(value);
    }

    /// Write the aggregation log-weight of a node.
    ///
    /// Training computes these in a bottom-up pass after the tree is grown;
    /// until then every node carries `NaN`.
    pub fn set_log_weight_tree(&mut self, id: NodeId, log_weight: f32) {
        debug_assert!(id < self.node_count);
        self.nodes[id].log_weight_tree = log_weight;
    }

    // =========================================================================
    // Growth
    // =========================================================================

    /// Grow node and prediction storage to hold at least `new_capacity`
    /// nodes. A request at or below the current capacity is a no-op:
    /// capacity never shrinks.
    ///
    /// Prediction storage growth is zero-filled. Allocation failure aborts
    /// the process.
    pub fn grow(&mut self, new_capacity: usize) {
        if new_capacity <= self.capacity && !self.nodes.is_empty() {
            return;
        }
        self.nodes.resize(new_capacity, Node::default());
        self.values.resize(new_capacity * self.value_width, 0.0);
        self.capacity = new_capacity;
    }

    /// Double the capacity (or set it to the initial minimum when empty).
    fn grow_amortized(&mut self) {
        if self.capacity == 0 {
            self.grow(INITIAL_CAPACITY);
        } else {
            self.grow(2 * self.capacity);
        }
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Append one node and link it into its parent's child slot.
    ///
    /// Exactly one node is added per call; capacity growth is transparent.
    /// For leaves the split descriptor is forced to its sentinel values
    /// (`feature = TREE_UNDEFINED`, children = `TREE_LEAF`). For internal
    /// nodes both children start as `TREE_LEAF` and are linked when they
    /// are themselves appended.
    ///
    /// Returns the new node's index.
    pub fn append_node(
        &mut self,
        parent: i64,
        depth: u64,
        is_left: bool,
        is_leaf: bool,
        feature: i64,
        threshold: f32,
        bin_threshold: u8,
        impurity: f64,
        n_samples_train: u64,
        n_samples_valid: u64,
        w_samples_train: f32,
        w_samples_valid: f32,
        start_train: u64,
        end_train: u64,
        start_valid: u64,
        end_valid: u64,
        loss_valid: f32,
    ) -> NodeId {
        let node_idx = self.node_count;
        if node_idx >= self.capacity {
            self.grow_amortized();
        }

        let node = &mut self.nodes[node_idx];
        node.node_id = node_idx as u64;
        node.parent = parent;
        node.depth = depth;
        node.is_left = is_left;
        node.is_leaf = is_leaf;
        node.impurity = impurity;
        node.n_samples_train = n_samples_train;
        node.n_samples_valid = n_samples_valid;
        node.w_samples_train = w_samples_train;
        node.w_samples_valid = w_samples_valid;
        node.start_train = start_train;
        node.end_train = end_train;
        node.start_valid = start_valid;
        node.end_valid = end_valid;
        node.loss_valid = loss_valid;
        node.log_weight_tree = f32::NAN;

        if is_leaf {
            node.left_child = TREE_LEAF;
            node.right_child = TREE_LEAF;
            node.feature = TREE_UNDEFINED;
            node.threshold = f32::NAN;
            node.bin_threshold = 0;
        } else {
            node.left_child = TREE_LEAF;
            node.right_child = TREE_LEAF;
            node.feature = feature;
            node.threshold = threshold;
            node.bin_threshold = bin_threshold;
        }

        if parent != TREE_UNDEFINED {
            let parent_idx = parent as usize;
            debug_assert!(parent_idx < node_idx);
            if is_left {
                self.nodes[parent_idx].left_child = node_idx as i64;
            } else {
                self.nodes[parent_idx].right_child = node_idx as i64;
            }
        }

        self.node_count += 1;
        node_idx
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Route one binned feature vector from the root to a leaf and return
    /// the leaf's index.
    ///
    /// A sample goes left iff its bin code for the node's feature is
    /// `<= bin_threshold`. Terminates because the arena is a finite rooted
    /// tree without cycles (a builder invariant).
    #[inline]
    pub fn find_leaf(&self, xi: ArrayView1<'_, u8>) -> NodeId {
        debug_assert!(self.node_count > 0);
        let mut idx: NodeId = 0;
        let mut node = &self.nodes[idx];
        while !node.is_leaf {
            idx = if xi[node.feature as usize] <= node.bin_threshold {
                node.left_child as NodeId
            } else {
                node.right_child as NodeId
            };
            node = &self.nodes[idx];
        }
        idx
    }

    /// Resolve [`Tree::find_leaf`] for every row of a binned feature matrix.
    ///
    /// Rows are independent, so this parallelizes trivially when allowed.
    pub fn apply(
        &self,
        x: ndarray::ArrayView2<'_, u8>,
        parallelism: Parallelism,
    ) -> Result<Vec<NodeId>, TreeError> {
        self.check_batch(x.ncols())?;
        Ok(parallelism.maybe_par_map(0..x.nrows(), |i| self.find_leaf(x.row(i))))
    }

    /// Validate a batch input before touching the hot traversal loop.
    pub(super) fn check_batch(&self, n_cols: usize) -> Result<(), TreeError> {
        if self.node_count == 0 {
            return Err(TreeError::EmptyTree);
        }
        if n_cols != self.n_features {
            return Err(TreeError::FeatureCountMismatch {
                expected: self.n_features,
                got: n_cols,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;

    /// Append a root splitting feature 0 at bin 5 with leaf predictions
    /// 0.2 (left) and 0.8 (right).
    pub(crate) fn three_node_tree() -> Tree {
        let mut tree = Tree::regressor(1, 42);
        let root = tree.append_node(
            TREE_UNDEFINED,
            0,
            false,
            false,
            0,
            5.5,
            5,
            0.5,
            4,
            2,
            4.0,
            2.0,
            0,
            4,
            0,
            2,
            0.3,
        );
        let left = tree.append_node(
            root as i64,
            1,
            true,
            true,
            0,
            0.0,
            0,
            0.0,
            2,
            1,
            2.0,
            1.0,
            0,
            2,
            0,
            1,
            0.1,
        );
        let right = tree.append_node(
            root as i64,
            1,
            false,
            true,
            0,
            0.0,
            0,
            0.0,
            2,
            1,
            2.0,
            1.0,
            2,
            4,
            1,
            2,
            0.2,
        );
        tree.set_value(root, &[0.5]);
        tree.set_value(left, &[0.2]);
        tree.set_value(right, &[0.8]);
        tree
    }

    #[test]
    fn capacity_doubles_from_three() {
        let mut tree = Tree::regressor(2, 0);
        assert_eq!(tree.capacity(), 0);
        for n in 1..=13u64 {
            tree.append_node(
                TREE_UNDEFINED,
                0,
                false,
                true,
                0,
                0.0,
                0,
                0.0,
                0,
                0,
                0.0,
                0.0,
                0,
                0,
                0,
                0,
                0.0,
            );
            assert_eq!(tree.node_count(), n as usize);
            assert!(tree.capacity() >= n as usize);
        }
        // Growth schedule from empty: 3, 6, 12, 24.
        assert_eq!(tree.capacity(), 24);
    }

    #[test]
    fn grow_never_shrinks() {
        let mut tree = Tree::regressor(2, 0);
        tree.grow(10);
        assert_eq!(tree.capacity(), 10);
        tree.grow(4);
        assert_eq!(tree.capacity(), 10);
        tree.grow(11);
        assert_eq!(tree.capacity(), 11);
    }

    #[test]
    fn append_links_parent_child() {
        let tree = three_node_tree();
        let root = tree.node(0);
        assert_eq!(root.parent, TREE_UNDEFINED);
        assert_eq!(root.left_child, 1);
        assert_eq!(root.right_child, 2);
        assert!(!root.is_leaf);

        let left = tree.node(1);
        assert_eq!(left.parent, 0);
        assert!(left.is_left);
        assert!(left.is_leaf);
        assert_eq!(left.left_child, TREE_LEAF);
        assert_eq!(left.right_child, TREE_LEAF);
        assert_eq!(left.feature, TREE_UNDEFINED);

        let right = tree.node(2);
        assert_eq!(right.parent, 0);
        assert!(!right.is_left);
        assert!(right.node_id == 2);
    }

    #[test]
    fn log_weight_starts_nan() {
        let tree = three_node_tree();
        for node in tree.nodes() {
            assert!(node.log_weight_tree.is_nan());
        }
    }

    #[test]
    fn find_leaf_routes_on_bin_threshold() {
        let tree = three_node_tree();
        // bin code 3 <= 5 -> left leaf
        assert_eq!(tree.find_leaf(array![3u8].view()), 1);
        // boundary: 5 <= 5 -> left leaf
        assert_eq!(tree.find_leaf(array![5u8].view()), 1);
        // bin code 6 > 5 -> right leaf
        assert_eq!(tree.find_leaf(array![6u8].view()), 2);
        assert!(tree.node(tree.find_leaf(array![200u8].view())).is_leaf);
    }

    #[test]
    fn apply_resolves_all_rows() {
        let tree = three_node_tree();
        let x = array![[0u8], [5], [6], [255]];
        let leaves = tree.apply(x.view(), Parallelism::Sequential).unwrap();
        assert_eq!(leaves, vec![1, 1, 2, 2]);

        let leaves_par = tree.apply(x.view(), Parallelism::Parallel).unwrap();
        assert_eq!(leaves_par, leaves);
    }

    #[test]
    fn apply_rejects_bad_width() {
        let tree = three_node_tree();
        let x = array![[0u8, 1], [5, 2]];
        let err = tree.apply(x.view(), Parallelism::Sequential).unwrap_err();
        assert!(matches!(
            err,
            TreeError::FeatureCountMismatch {
                expected: 1,
                got: 2
            }
        ));
    }

    #[test]
    fn apply_rejects_empty_tree() {
        let tree = Tree::regressor(1, 0);
        let x = array![[0u8]];
        assert!(matches!(
            tree.apply(x.view(), Parallelism::Sequential),
            Err(TreeError::EmptyTree)
        ));
    }

    #[test]
    fn seeded_rng_is_deterministic() {
        use rand::RngCore;
        let mut a = Tree::regressor(1, 7);
        let mut b = Tree::regressor(1, 7);
        assert_eq!(a.rng_mut().next_u64(), b.rng_mut().next_u64());
    }
}
