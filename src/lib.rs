//! aggtree: the decision-tree engine of an aggregated random forest.
//!
//! A single tree is stored as a flat, growable arena of fixed-layout node
//! records plus a parallel prediction array ([`tree::Tree`]). Split quality
//! is scored by incremental running statistics over a movable split cursor
//! ([`criterion`]), with six interchangeable impurity measures. Prediction
//! either reads the leaf value directly or blends it bottom-up with every
//! ancestor's prediction using context-tree-weighting (CTW) weights computed
//! on held-out samples.
//!
//! # Key Types
//!
//! - [`Tree`] / [`Node`] - Node arena and its fixed node record
//! - [`Criterion`] - Shared contract of all split criteria
//! - [`ClassificationCriterion`] (Gini, entropy),
//!   [`RegressionCriterion`] (MSE, Friedman-MSE, Poisson) and
//!   [`MaeCriterion`] (weighted-median based MAE)
//!
//! # Collaborators
//!
//! Feature binning (raw values -> `u8` bin codes), the best-split search
//! loop, and forest-level orchestration live outside this crate. The
//! criterion consumes a read-only target matrix and a sample-order slice
//! maintained by the splitter; the tree consumes binned feature matrices
//! at inference time.

pub mod criterion;
pub mod tree;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use criterion::{
    ClassificationCriterion, ClassificationKind, Criterion, CriterionKind, MaeCriterion,
    RegressionCriterion, RegressionKind, SplitContext, SplitCursor, WeightedMedian,
};
pub use tree::{Node, NodeId, Tree, TreeError, TREE_LEAF, TREE_UNDEFINED};
pub use utils::{run_with_threads, Parallelism};
