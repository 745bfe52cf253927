//! Node arena and prediction engine for a single decision tree.
//!
//! This module provides:
//! - [`Node`]: Fixed-layout node record, addressed by its index in the arena
//! - [`Tree`]: Flat, growable node arena plus a parallel prediction array
//! - [`TreeError`]: Input validation errors for the batch entry points
//!
//! Nodes link to each other through integer indices with sentinel values
//! ([`TREE_LEAF`], [`TREE_UNDEFINED`]); there are no owned child pointers.

pub mod arena;
pub mod node;
pub mod predict;

pub use arena::{Tree, TreeError};
pub use node::{Node, TREE_LEAF, TREE_UNDEFINED};

/// Canonical node identifier: the node's position in the arena.
///
/// Node 0 is always the root.
pub type NodeId = usize;
