//! Regression criteria over per-output running sums: MSE, Friedman-MSE and
//! Poisson half-deviance.
//!
//! Variance-style impurities use the identity
//! `var = E[y^2] - E[y]^2`, so one squared-sum accumulator captured at
//! `init` time plus the per-side linear sums are enough to score any split
//! position without rescanning.

use ndarray::ArrayViewMut2;

use super::{weighted_improvement, xlogy, Criterion, SplitContext, SplitCursor, EPSILON};

/// Which regression impurity formula to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegressionKind {
    /// Variance of each side, `E[y^2] - E[y]^2` averaged over outputs.
    Mse,
    /// MSE impurity with Friedman's closed-form improvement score.
    FriedmanMse,
    /// Poisson half-deviance; children with non-positive target sums are
    /// rejected through infinite sentinels.
    Poisson,
}

/// Per-output weighted target sums over a node's sample range.
#[derive(Debug, Clone)]
pub struct RegressionCriterion {
    kind: RegressionKind,
    n_outputs: usize,
    cursor: SplitCursor,
    /// Weighted sum of squared targets over the whole node, all outputs.
    sq_sum_total: f64,
    sum_total: Vec<f64>,
    sum_left: Vec<f64>,
    sum_right: Vec<f64>,
}

impl RegressionCriterion {
    pub fn new(kind: RegressionKind, n_outputs: usize) -> Self {
        assert!(n_outputs > 0, "at least one output is required");
        RegressionCriterion {
            kind,
            n_outputs,
            cursor: SplitCursor::default(),
            sq_sum_total: 0.0,
            sum_total: vec![0.0; n_outputs],
            sum_left: vec![0.0; n_outputs],
            sum_right: vec![0.0; n_outputs],
        }
    }

    pub fn mse(n_outputs: usize) -> Self {
        Self::new(RegressionKind::Mse, n_outputs)
    }

    pub fn friedman_mse(n_outputs: usize) -> Self {
        Self::new(RegressionKind::FriedmanMse, n_outputs)
    }

    pub fn poisson(n_outputs: usize) -> Self {
        Self::new(RegressionKind::Poisson, n_outputs)
    }

    pub fn sum_left(&self) -> &[f64] {
        &self.sum_left
    }

    pub fn sum_right(&self) -> &[f64] {
        &self.sum_right
    }

    pub fn sum_total(&self) -> &[f64] {
        &self.sum_total
    }

    /// Variance impurity of a side given its linear sums, squared sum and
    /// weighted count.
    fn variance_impurity(&self, sums: &[f64], sq_sum: f64, weighted_n: f64) -> f64 {
        let mut impurity = sq_sum / weighted_n;
        for k in 0..self.n_outputs {
            let mean = sums[k] / weighted_n;
            impurity -= mean * mean;
        }
        impurity / self.n_outputs as f64
    }

    /// Weighted sum of squared targets over `samples[lo..hi]`.
    fn sq_sum_over(&self, ctx: &SplitContext<'_>, lo: usize, hi: usize) -> f64 {
        let mut sq_sum = 0.0;
        for p in lo..hi {
            let i = ctx.samples[p];
            let w = ctx.weight(i);
            for k in 0..self.n_outputs {
                let y_ik = ctx.y[[i, k]];
                sq_sum += w * y_ik * y_ik;
            }
        }
        sq_sum
    }

    /// Normalized Poisson half-deviance of `samples[lo..hi]` against the
    /// side's own weighted means. The `y_mean - y` terms of the deviance
    /// cancel when the prediction is the weighted mean, leaving only the
    /// `y log(y / y_mean)` part.
    fn poisson_loss(
        &self,
        ctx: &SplitContext<'_>,
        lo: usize,
        hi: usize,
        sums: &[f64],
        weight_sum: f64,
    ) -> f64 {
        let mut loss = 0.0;
        for k in 0..self.n_outputs {
            let y_mean = sums[k] / weight_sum;
            for p in lo..hi {
                let i = ctx.samples[p];
                let w = ctx.weight(i);
                let y_ik = ctx.y[[i, k]];
                loss += w * xlogy(y_ik, y_ik / y_mean);
            }
        }
        loss / (weight_sum * self.n_outputs as f64)
    }

    /// True iff some output's sum on this side is non-positive.
    fn poisson_degenerate(sums: &[f64]) -> bool {
        sums.iter().any(|&s| s <= EPSILON)
    }
}

impl Criterion for RegressionCriterion {
    fn init(&mut self, ctx: &SplitContext<'_>, weighted_n_samples: f64, start: usize, end: usize) {
        self.cursor.begin_node(weighted_n_samples, start, end);
        self.sq_sum_total = 0.0;
        self.sum_total.fill(0.0);

        for p in start..end {
            let i = ctx.samples[p];
            let w = ctx.weight(i);
            for k in 0..self.n_outputs {
                let y_ik = ctx.y[[i, k]];
                let w_y_ik = w * y_ik;
                self.sum_total[k] += w_y_ik;
                self.sq_sum_total += w_y_ik * y_ik;
            }
            self.cursor.weighted_n_node_samples += w;
        }

        self.reset();
    }

    fn reset(&mut self) {
        self.cursor.reset();
        self.sum_left.fill(0.0);
        self.sum_right.copy_from_slice(&self.sum_total);
    }

    fn reverse_reset(&mut self) {
        self.cursor.reverse_reset();
        self.sum_left.copy_from_slice(&self.sum_total);
        self.sum_right.fill(0.0);
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
                    self.sum_left[k] += w * ctx.y[[i, k]];
                }
                self.cursor.weighted_n_left += w;
            }
        } else {
            self.reverse_reset();
            for p in (new_pos..end).rev() {
                let i = ctx.samples[p];
                let w = ctx.weight(i);
                for k in 0..self.n_outputs {
                    self.sum_left[k] -= w * ctx.y[[i, k]];
                }
                self.cursor.weighted_n_left -= w;
            }
        }

        self.cursor.weighted_n_right =
            self.cursor.weighted_n_node_samples - self.cursor.weighted_n_left;
        for k in 0..self.n_outputs {
            self.sum_right[k] = self.sum_total[k] - self.sum_left[k];
        }
        self.cursor.pos = new_pos;
    }

    fn node_impurity(&self, ctx: &SplitContext<'_>) -> f64 {
        match self.kind {
            RegressionKind::Mse | RegressionKind::FriedmanMse => self.variance_impurity(
                &self.sum_total,
                self.sq_sum_total,
                self.cursor.weighted_n_node_samples,
            ),
            RegressionKind::Poisson => self.poisson_loss(
                ctx,
                self.cursor.start,
                self.cursor.end,
                &self.sum_total,
                self.cursor.weighted_n_node_samples,
            ),
        }
    }

    fn children_impurity(&self, ctx: &SplitContext<'_>) -> (f64, f64) {
        match self.kind {
            RegressionKind::Mse | RegressionKind::FriedmanMse => {
                let sq_sum_left = self.sq_sum_over(ctx, self.cursor.start, self.cursor.pos);
                let sq_sum_right = self.sq_sum_total - sq_sum_left;
                (
                    self.variance_impurity(&self.sum_left, sq_sum_left, self.cursor.weighted_n_left),
                    self.variance_impurity(
                        &self.sum_right,
                        sq_sum_right,
                        self.cursor.weighted_n_right,
                    ),
                )
            }
            RegressionKind::Poisson => {
                let left = if Self::poisson_degenerate(&self.sum_left) {
                    f64::INFINITY
                } else {
                    self.poisson_loss(
                        ctx,
                        self.cursor.start,
                        self.cursor.pos,
                        &self.sum_left,
                        self.cursor.weighted_n_left,
                    )
                };
                let right = if Self::poisson_degenerate(&self.sum_right) {
                    f64::INFINITY
                } else {
                    self.poisson_loss(
                        ctx,
                        self.cursor.pos,
                        self.cursor.end,
                        &self.sum_right,
                        self.cursor.weighted_n_right,
                    )
                };
                (left, right)
            }
        }
    }

    fn proxy_impurity_improvement(&self, _ctx: &SplitContext<'_>) -> f64 {
        match self.kind {
            RegressionKind::Mse => {
                let mut proxy_left = 0.0;
                let mut proxy_right = 0.0;
                for k in 0..self.n_outputs {
                    proxy_left += self.sum_left[k] * self.sum_left[k];
                    proxy_right += self.sum_right[k] * self.sum_right[k];
                }
                proxy_left / self.cursor.weighted_n_left
                    + proxy_right / self.cursor.weighted_n_right
            }
            RegressionKind::FriedmanMse => {
                let total_sum_left: f64 = self.sum_left.iter().sum();
                let total_sum_right: f64 = self.sum_right.iter().sum();
                let diff = self.cursor.weighted_n_right * total_sum_left
                    - self.cursor.weighted_n_left * total_sum_right;
                diff * diff / (self.cursor.weighted_n_left * self.cursor.weighted_n_right)
            }
            RegressionKind::Poisson => {
                if Self::poisson_degenerate(&self.sum_left)
                    || Self::poisson_degenerate(&self.sum_right)
                {
                    return f64::NEG_INFINITY;
                }
                // The deviance's linear terms cancel against the weighted
                // means, so minimizing the child deviances is maximizing
                // sum * ln(mean) over both sides.
                let mut proxy = 0.0;
                for k in 0..self.n_outputs {
                    let y_mean_left = self.sum_left[k] / self.cursor.weighted_n_left;
                    let y_mean_right = self.sum_right[k] / self.cursor.weighted_n_right;
                    proxy += self.sum_left[k] * y_mean_left.ln();
                    proxy += self.sum_right[k] * y_mean_right.ln();
                }
                proxy
            }
        }
    }

    fn node_value(&self, mut dest: ArrayViewMut2<'_, f64>) {
        for k in 0..self.n_outputs {
            dest[[k, 0]] = self.sum_total[k] / self.cursor.weighted_n_node_samples;
        }
    }

    fn impurity_improvement(
        &self,
        impurity_parent: f64,
        impurity_left: f64,
        impurity_right: f64,
    ) -> f64 {
        match self.kind {
            RegressionKind::FriedmanMse => {
                let total_sum_left: f64 = self.sum_left.iter().sum();
                let total_sum_right: f64 = self.sum_right.iter().sum();
                let diff = self.cursor.weighted_n_right * total_sum_left
                    - self.cursor.weighted_n_left * total_sum_right;
                diff * diff
                    / (self.cursor.weighted_n_left
                        * self.cursor.weighted_n_right
                        * self.cursor.weighted_n_node_samples)
            }
            _ => weighted_improvement(
                &self.cursor,
                impurity_parent,
                impurity_left,
                impurity_right,
            ),
        }
    }

    fn cursor(&self) -> &SplitCursor {
        &self.cursor
    }
}
