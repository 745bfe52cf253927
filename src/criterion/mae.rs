//! Mean-absolute-error criterion.
//!
//! MAE has no sufficient statistic like the variance identity, so each side
//! keeps a sorted weighted-value accumulator and answers median queries from
//! it. Cursor moves transfer individual samples between the two
//! accumulators, which keeps a full left-to-right scan at
//! `O(n log n)` per node instead of re-sorting at every position.

use ndarray::ArrayViewMut2;

use super::{Criterion, SplitContext, SplitCursor};

/// Sorted multiset of `(value, weight)` pairs with weighted-median queries.
#[derive(Debug, Clone, Default)]
pub struct WeightedMedian {
    /// Pairs kept sorted by value.
    items: Vec<(f64, f64)>,
    total_weight: f64,
}

impl WeightedMedian {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        WeightedMedian {
            items: Vec::with_capacity(capacity),
            total_weight: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.total_weight = 0.0;
    }

    /// Insert a weighted value, keeping the items sorted.
    pub fn push(&mut self, value: f64, weight: f64) {
        let at = self.items.partition_point(|&(v, _)| v < value);
        self.items.insert(at, (value, weight));
        self.total_weight += weight;
    }

    /// Remove one previously pushed `(value, weight)` pair.
    ///
    /// # Panics
    ///
    /// Panics if the pair is not present.
    pub fn remove(&mut self, value: f64, weight: f64) {
        let mut at = self.items.partition_point(|&(v, _)| v < value);
        // Ties on value may carry different weights; scan the run.
        while self.items[at] != (value, weight) {
            at += 1;
        }
        self.items.remove(at);
        self.total_weight -= weight;
    }

    /// The weighted median: the smallest value whose cumulative weight
    /// reaches half the total, or the midpoint of two adjacent values when
    /// the half falls exactly on a boundary.
    ///
    /// # Panics
    ///
    /// Panics if the set is empty.
    pub fn median(&self) -> f64 {
        assert!(!self.items.is_empty(), "median of an empty set");
        let half = self.total_weight / 2.0;
        let mut cumulative = 0.0;
        for (at, &(value, weight)) in self.items.iter().enumerate() {
            cumulative += weight;
            if cumulative >= half {
                if cumulative == half && at + 1 < self.items.len() {
                    return (value + self.items[at + 1].0) / 2.0;
                }
                return value;
            }
        }
        self.items[self.items.len() - 1].0
    }
}

/// MAE criterion: impurity is the weighted mean absolute deviation of each
/// side's targets around that side's own weighted median.
pub struct MaeCriterion {
    n_outputs: usize,
    cursor: SplitCursor,
    left: Vec<WeightedMedian>,
    right: Vec<WeightedMedian>,
    node_medians: Vec<f64>,
}

impl MaeCriterion {
    pub fn new(n_outputs: usize) -> Self {
        assert!(n_outputs > 0, "at least one output is required");
        MaeCriterion {
            n_outputs,
            cursor: SplitCursor::default(),
            left: (0..n_outputs).map(|_| WeightedMedian::new()).collect(),
            right: (0..n_outputs).map(|_| WeightedMedian::new()).collect(),
            node_medians: vec![0.0; n_outputs],
        }
    }

    /// Weighted mean absolute deviation of `samples[lo..hi]` around
    /// per-output medians, averaged over outputs.
    fn deviation(
        &self,
        ctx: &SplitContext<'_>,
        lo: usize,
        hi: usize,
        medians: &[f64],
        weight_sum: f64,
    ) -> f64 {
        let mut dev = 0.0;
        for k in 0..self.n_outputs {
            for p in lo..hi {
                let i = ctx.samples[p];
                dev += ctx.weight(i) * (ctx.y[[i, k]] - medians[k]).abs();
            }
        }
        dev / (weight_sum * self.n_outputs as f64)
    }
}

impl Criterion for MaeCriterion {
    fn init(&mut self, ctx: &SplitContext<'_>, weighted_n_samples: f64, start: usize, end: usize) {
        self.cursor.begin_node(weighted_n_samples, start, end);

        for k in 0..self.n_outputs {
            self.left[k].clear();
            self.right[k].clear();
        }
        for p in start..end {
            let i = ctx.samples[p];
            let w = ctx.weight(i);
            for k in 0..self.n_outputs {
                self.right[k].push(ctx.y[[i, k]], w);
            }
            self.cursor.weighted_n_node_samples += w;
        }
        for k in 0..self.n_outputs {
            self.node_medians[k] = self.right[k].median();
        }

        self.reset();
    }

    fn reset(&mut self) {
        self.cursor.reset();
        for k in 0..self.n_outputs {
            while let Some(&(value, weight)) = self.left[k].items.first() {
                self.left[k].remove(value, weight);
                self.right[k].push(value, weight);
            }
        }
    }

    fn reverse_reset(&mut self) {
        self.cursor.reverse_reset();
        for k in 0..self.n_outputs {
            while let Some(&(value, weight)) = self.right[k].items.first() {
                self.right[k].remove(value, weight);
                self.left[k].push(value, weight);
            }
        }
    }

    fn update(&mut self, ctx: &SplitContext<'_>, new_pos: usize) {
        let pos = self.cursor.pos;
        let end = self.cursor.end;

        // Walk from whichever end is closer; a backward move always takes
        // the reverse path.
        if new_pos >= pos && new_pos - pos <= end - new_pos {
            for p in pos..new_pos {
                let i = ctx.samples[p];
                let w = ctx.weight(i);
                for k in 0..self.n_outputs {
                    let y_ik = ctx.y[[i, k]];
                    self.right[k].remove(y_ik, w);
                    self.left[k].push(y_ik, w);
                }
                self.cursor.weighted_n_left += w;
            }
        } else {
            self.reverse_reset();
            for p in (new_pos..end).rev() {
                let i = ctx.samples[p];
                let w = ctx.weight(i);
                for k in 0..self.n_outputs {
                    let y_ik = ctx.y[[i, k]];
                    self.left[k].remove(y_ik, w);
                    self.right[k].push(y_ik, w);
                }
                self.cursor.weighted_n_left -= w;
            }
        }

        self.cursor.weighted_n_right =
            self.cursor.weighted_n_node_samples - self.cursor.weighted_n_left;
        self.cursor.pos = new_pos;
    }

    fn node_impurity(&self, ctx: &SplitContext<'_>) -> f64 {
        self.deviation(
            ctx,
            self.cursor.start,
            self.cursor.end,
            &self.node_medians,
            self.cursor.weighted_n_node_samples,
        )
    }

    fn children_impurity(&self, ctx: &SplitContext<'_>) -> (f64, f64) {
        let left_medians: Vec<f64> = self.left.iter().map(|m| m.median()).collect();
        let right_medians: Vec<f64> = self.right.iter().map(|m| m.median()).collect();
        (
            self.deviation(
                ctx,
                self.cursor.start,
                self.cursor.pos,
                &left_medians,
                self.cursor.weighted_n_left,
            ),
            self.deviation(
                ctx,
                self.cursor.pos,
                self.cursor.end,
                &right_medians,
                self.cursor.weighted_n_right,
            ),
        )
    }

    fn proxy_impurity_improvement(&self, ctx: &SplitContext<'_>) -> f64 {
        let (impurity_left, impurity_right) = self.children_impurity(ctx);
        -self.cursor.weighted_n_right * impurity_right
            - self.cursor.weighted_n_left * impurity_left
    }

    fn node_value(&self, mut dest: ArrayViewMut2<'_, f64>) {
        for k in 0..self.n_outputs {
            dest[[k, 0]] = self.node_medians[k];
        }
    }

    fn cursor(&self) -> &SplitCursor {
        &self.cursor
    }
}
