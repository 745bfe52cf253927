//! Split-quality criteria.
//!
//! A criterion scores candidate split positions for one node's sample range
//! `[start, end)`. The splitter scans positions left to right; the criterion
//! keeps per-class (classification) or per-output (regression) running sums
//! for the left partition `[start, pos)` and right partition `[pos, end)`
//! and moves the cursor with [`Criterion::update`], always walking from the
//! cheaper end so a full scan of one node costs linear total time.
//!
//! All six impurity variants share the identical cursor state machine and
//! differ only in their impurity formulas:
//!
//! - [`ClassificationCriterion`]: Gini, entropy
//! - [`RegressionCriterion`]: MSE, Friedman-MSE, Poisson
//! - [`MaeCriterion`]: mean absolute error around incremental weighted medians
//!
//! Degenerate candidates (a Poisson child with a non-positive target sum)
//! are signaled with `±INFINITY` sentinels, never with errors: the splitter
//! treats them as "reject this candidate" and the hot path stays branch-light.

use ndarray::{ArrayView2, ArrayViewMut2};

pub mod classification;
pub mod mae;
pub mod regression;

pub use classification::{ClassificationCriterion, ClassificationKind};
pub use mae::{MaeCriterion, WeightedMedian};
pub use regression::{RegressionCriterion, RegressionKind};

/// Threshold under which a per-output target sum counts as zero.
///
/// A Poisson child whose sum falls at or below this is rejected, since a
/// non-positive mean has no finite log-deviance.
pub const EPSILON: f64 = 10.0 * f64::EPSILON;

// =============================================================================
// SplitContext
// =============================================================================

/// Read-only training data a criterion scans: the target matrix, optional
/// per-sample weights, and the sample-order slice maintained by the
/// splitter (`samples[start..end]` are the node's samples, partitioned
/// around the cursor).
#[derive(Clone, Copy)]
pub struct SplitContext<'a> {
    /// Targets, shape `(n_samples, n_outputs)`. Class labels for
    /// classification, continuous values for regression.
    pub y: ArrayView2<'a, f64>,
    /// Per-sample weights; `None` means uniform weight 1.0.
    pub sample_weight: Option<&'a [f64]>,
    /// Sample indices in scan order.
    pub samples: &'a [usize],
}

impl<'a> SplitContext<'a> {
    pub fn new(
        y: ArrayView2<'a, f64>,
        sample_weight: Option<&'a [f64]>,
        samples: &'a [usize],
    ) -> Self {
        if let Some(w) = sample_weight {
            debug_assert_eq!(w.len(), y.nrows());
        }
        SplitContext {
            y,
            sample_weight,
            samples,
        }
    }

    /// Weight of sample `i`.
    #[inline]
    pub fn weight(&self, i: usize) -> f64 {
        self.sample_weight.map_or(1.0, |w| w[i])
    }
}

// =============================================================================
// Shared cursor state
// =============================================================================

/// Cursor and weighted-count state shared by every criterion variant.
///
/// Exposed read-only through [`Criterion::cursor`]; only the owning
/// criterion mutates it.
#[derive(Debug, Clone, Default)]
pub struct SplitCursor {
    pub start: usize,
    pub pos: usize,
    pub end: usize,
    pub n_node_samples: usize,
    pub weighted_n_samples: f64,
    pub weighted_n_node_samples: f64,
    pub weighted_n_left: f64,
    pub weighted_n_right: f64,
}

impl SplitCursor {
    /// Prepare for a node over `[start, end)`; sums are handled by the
    /// owning criterion.
    pub(crate) fn begin_node(&mut self, weighted_n_samples: f64, start: usize, end: usize) {
        self.start = start;
        self.pos = start;
        self.end = end;
        self.n_node_samples = end - start;
        self.weighted_n_samples = weighted_n_samples;
        self.weighted_n_node_samples = 0.0;
        self.weighted_n_left = 0.0;
        self.weighted_n_right = 0.0;
    }

    /// Cursor at `start`: everything on the right.
    pub(crate) fn reset(&mut self) {
        self.pos = self.start;
        self.weighted_n_left = 0.0;
        self.weighted_n_right = self.weighted_n_node_samples;
    }

    /// Cursor at `end`: everything on the left.
    pub(crate) fn reverse_reset(&mut self) {
        self.pos = self.end;
        self.weighted_n_left = self.weighted_n_node_samples;
        self.weighted_n_right = 0.0;
    }
}

/// The split-independent form of the impurity improvement, weighted by the
/// node's share of all training samples.
#[inline]
pub(crate) fn weighted_improvement(
    cursor: &SplitCursor,
    impurity_parent: f64,
    impurity_left: f64,
    impurity_right: f64,
) -> f64 {
    (cursor.weighted_n_node_samples / cursor.weighted_n_samples)
        * (impurity_parent
            - (cursor.weighted_n_right / cursor.weighted_n_node_samples) * impurity_right
            - (cursor.weighted_n_left / cursor.weighted_n_node_samples) * impurity_left)
}

/// `x * ln(y)` with the `0 * ln(0) = 0` convention.
#[inline]
pub(crate) fn xlogy(x: f64, y: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x * y.ln()
    }
}

// =============================================================================
// Criterion trait
// =============================================================================

/// Shared contract of all split criteria.
///
/// Lifecycle: one instance per tree-build worker; [`Criterion::init`] once
/// per node visited; [`Criterion::update`] repeatedly while the splitter
/// scans candidate positions; [`Criterion::impurity_improvement`] once, for
/// the chosen split only.
///
/// The caller must never move the cursor so that a partition has zero
/// weight before querying impurities; doing so yields `NaN`/`inf` sentinel
/// values which must be treated as "reject this split".
pub trait Criterion {
    /// Re-initialize for the node whose samples are
    /// `ctx.samples[start..end]`: zero the totals, accumulate one pass over
    /// the range, then [`Criterion::reset`].
    fn init(&mut self, ctx: &SplitContext<'_>, weighted_n_samples: f64, start: usize, end: usize);

    /// Cursor to `start`: left sums zero, right sums equal the totals.
    fn reset(&mut self);

    /// Cursor to `end`: left sums equal the totals, right sums zero.
    fn reverse_reset(&mut self);

    /// Move the cursor to `new_pos`, updating the left sums incrementally
    /// from whichever end is closer. Work is bounded by
    /// `min(new_pos - pos, end - new_pos)`.
    fn update(&mut self, ctx: &SplitContext<'_>, new_pos: usize);

    /// Impurity of the node's full sample range.
    fn node_impurity(&self, ctx: &SplitContext<'_>) -> f64;

    /// Impurity of the left `[start, pos)` and right `[pos, end)` partitions.
    fn children_impurity(&self, ctx: &SplitContext<'_>) -> (f64, f64);

    /// Split-ranking proxy: orders candidates identically to
    /// [`Criterion::impurity_improvement`] while dropping its additive,
    /// split-independent terms.
    fn proxy_impurity_improvement(&self, ctx: &SplitContext<'_>) -> f64;

    /// Write the node's prediction value into `dest`, shape
    /// `(n_outputs, value_stride)`: weighted class counts for
    /// classification, one scalar column for regression.
    fn node_value(&self, dest: ArrayViewMut2<'_, f64>);

    /// The true improvement for the chosen split.
    fn impurity_improvement(
        &self,
        impurity_parent: f64,
        impurity_left: f64,
        impurity_right: f64,
    ) -> f64 {
        weighted_improvement(
            self.cursor(),
            impurity_parent,
            impurity_left,
            impurity_right,
        )
    }

    // Cursor state, exposed so the splitter can size and register children.

    fn start(&self) -> usize {
        self.cursor().start
    }
    fn pos(&self) -> usize {
        self.cursor().pos
    }
    fn end(&self) -> usize {
        self.cursor().end
    }
    fn n_node_samples(&self) -> usize {
        self.cursor().n_node_samples
    }
    fn weighted_n_samples(&self) -> f64 {
        self.cursor().weighted_n_samples
    }
    fn weighted_n_node_samples(&self) -> f64 {
        self.cursor().weighted_n_node_samples
    }
    fn weighted_n_left(&self) -> f64 {
        self.cursor().weighted_n_left
    }
    fn weighted_n_right(&self) -> f64 {
        self.cursor().weighted_n_right
    }

    #[doc(hidden)]
    fn cursor(&self) -> &SplitCursor;
}

// =============================================================================
// Factory
// =============================================================================

/// Which impurity measure a tree build uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionKind {
    Gini,
    Entropy,
    Mse,
    FriedmanMse,
    Poisson,
    Mae,
}

impl CriterionKind {
    /// Build a fresh criterion for one tree-build worker.
    ///
    /// `n_classes` gives the per-output class cardinalities and is only
    /// consulted by the classification variants.
    pub fn build(self, n_outputs: usize, n_classes: &[usize]) -> Box<dyn Criterion + Send> {
        match self {
            CriterionKind::Gini => Box::new(ClassificationCriterion::new(
                ClassificationKind::Gini,
                n_classes.to_vec(),
            )),
            CriterionKind::Entropy => Box::new(ClassificationCriterion::new(
                ClassificationKind::Entropy,
                n_classes.to_vec(),
            )),
            CriterionKind::Mse => {
                Box::new(RegressionCriterion::new(RegressionKind::Mse, n_outputs))
            }
            CriterionKind::FriedmanMse => Box::new(RegressionCriterion::new(
                RegressionKind::FriedmanMse,
                n_outputs,
            )),
            CriterionKind::Poisson => {
                Box::new(RegressionCriterion::new(RegressionKind::Poisson, n_outputs))
            }
            CriterionKind::Mae => Box::new(MaeCriterion::new(n_outputs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xlogy_zero_convention() {
        assert_eq!(xlogy(0.0, 0.0), 0.0);
        assert_eq!(xlogy(0.0, 5.0), 0.0);
        assert!((xlogy(2.0, std::f64::consts::E) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn factory_builds_every_kind() {
        for kind in [
            CriterionKind::Gini,
            CriterionKind::Entropy,
            CriterionKind::Mse,
            CriterionKind::FriedmanMse,
            CriterionKind::Poisson,
            CriterionKind::Mae,
        ] {
            let criterion = kind.build(1, &[2]);
            assert_eq!(criterion.n_node_samples(), 0);
        }
    }
}
