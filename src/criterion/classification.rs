//! Classification criteria: Gini index and cross-entropy.
//!
//! Targets are class labels stored as `f64` in the target matrix; the
//! running statistics are weighted class counts, one row per output with a
//! common stride of `max(n_classes)` columns.

use ndarray::{Array2, ArrayViewMut2, Zip};

use super::{Criterion, SplitContext, SplitCursor};

/// Which classification impurity formula to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationKind {
    /// `mean_k(1 - sum_c p_{k,c}^2)`
    Gini,
    /// `mean_k(-sum_c p_{k,c} ln p_{k,c})`, with `0 ln 0 = 0`
    Entropy,
}

/// Weighted class-count statistics over a node's sample range, scored by
/// Gini or entropy.
#[derive(Debug, Clone)]
pub struct ClassificationCriterion {
    kind: ClassificationKind,
    n_outputs: usize,
    /// Class cardinality per output.
    n_classes: Vec<usize>,
    cursor: SplitCursor,
    /// Weighted class counts, shape `(n_outputs, max n_classes)`.
    sum_total: Array2<f64>,
    sum_left: Array2<f64>,
    sum_right: Array2<f64>,
}

impl ClassificationCriterion {
    pub fn new(kind: ClassificationKind, n_classes: Vec<usize>) -> Self {
        assert!(!n_classes.is_empty(), "at least one output is required");
        let n_outputs = n_classes.len();
        let sum_stride = n_classes.iter().copied().max().unwrap_or(0);
        ClassificationCriterion {
            kind,
            n_outputs,
            n_classes,
            cursor: SplitCursor::default(),
            sum_total: Array2::zeros((n_outputs, sum_stride)),
            sum_left: Array2::zeros((n_outputs, sum_stride)),
            sum_right: Array2::zeros((n_outputs, sum_stride)),
        }
    }

    pub fn gini(n_classes: Vec<usize>) -> Self {
        Self::new(ClassificationKind::Gini, n_classes)
    }

    pub fn entropy(n_classes: Vec<usize>) -> Self {
        Self::new(ClassificationKind::Entropy, n_classes)
    }

    /// Left class counts, for inspection in tests and diagnostics.
    pub fn sum_left(&self) -> &Array2<f64> {
        &self.sum_left
    }

    pub fn sum_right(&self) -> &Array2<f64> {
        &self.sum_right
    }

    pub fn sum_total(&self) -> &Array2<f64> {
        &self.sum_total
    }

    /// Score one side's counts against one side's weighted total.
    fn impurity_of(&self, sums: &Array2<f64>, weighted_n: f64) -> f64 {
        let mut impurity = 0.0;
        match self.kind {
            ClassificationKind::Gini => {
                for k in 0..self.n_outputs {
                    let mut sq_count = 0.0;
                    for c in 0..self.n_classes[k] {
                        let count = sums[[k, c]];
                        sq_count += count * count;
                    }
                    impurity += 1.0 - sq_count / (weighted_n * weighted_n);
                }
            }
            ClassificationKind::Entropy => {
                for k in 0..self.n_outputs {
                    for c in 0..self.n_classes[k] {
                        let count = sums[[k, c]];
                        if count > 0.0 {
                            let p = count / weighted_n;
                            impurity -= p * p.ln();
                        }
                    }
                }
            }
        }
        impurity / self.n_outputs as f64
    }
}

impl Criterion for ClassificationCriterion {
    fn init(&mut self, ctx: &SplitContext<'_>, weighted_n_samples: f64, start: usize, end: usize) {
        self.cursor.begin_node(weighted_n_samples, start, end);
        self.sum_total.fill(0.0);

        for p in start..end {
            let i = ctx.samples[p];
            let w = ctx.weight(i);
            for k in 0..self.n_outputs {
                let c = ctx.y[[i, k]] as usize;
                debug_assert!(c < self.n_classes[k]);
                self.sum_total[[k, c]] += w;
            }
            self.cursor.weighted_n_node_samples += w;
        }

        self.reset();
    }

    fn reset(&mut self) {
        self.cursor.reset();
        self.sum_left.fill(0.0);
        self.sum_right.assign(&self.sum_total);
    }

    fn reverse_reset(&mut self) {
        self.cursor.reverse_reset();
        self.sum_left.assign(&self.sum_total);
        self.sum_right.fill(0.0);
    }

    fn update(&mut self, ctx: &SplitContext<'_>, new_pos: usize) {
        let pos = self.cursor.pos;
        let end = self.cursor.end;

        // sum_left + sum_right == sum_total always holds, so walk whichever
        // direction touches fewer samples and recover sum_right at the end.
        // A backward move always takes the reverse path.
        if new_pos >= pos && new_pos - pos <= end - new_pos {
            for p in pos..new_pos {
                let i = ctx.samples[p];
                let w = ctx.weight(i);
                for k in 0..self.n_outputs {
                    let c = ctx.y[[i, k]] as usize;
                    self.sum_left[[k, c]] += w;
                }
                self.cursor.weighted_n_left += w;
            }
        } else {
            self.reverse_reset();
            for p in (new_pos..end).rev() {
                let i = ctx.samples[p];
                let w = ctx.weight(i);
                for k in 0..self.n_outputs {
                    let c = ctx.y[[i, k]] as usize;
                    self.sum_left[[k, c]] -= w;
                }
                self.cursor.weighted_n_left -= w;
            }
        }

        self.cursor.weighted_n_right =
            self.cursor.weighted_n_node_samples - self.cursor.weighted_n_left;
        Zip::from(&mut self.sum_right)
            .and(&self.sum_total)
            .and(&self.sum_left)
            .for_each(|r, &t, &l| *r = t - l);
        self.cursor.pos = new_pos;
    }

    fn node_impurity(&self, _ctx: &SplitContext<'_>) -> f64 {
        self.impurity_of(&self.sum_total, self.cursor.weighted_n_node_samples)
    }

    fn children_impurity(&self, _ctx: &SplitContext<'_>) -> (f64, f64) {
        (
            self.impurity_of(&self.sum_left, self.cursor.weighted_n_left),
            self.impurity_of(&self.sum_right, self.cursor.weighted_n_right),
        )
    }

    fn proxy_impurity_improvement(&self, ctx: &SplitContext<'_>) -> f64 {
        let (impurity_left, impurity_right) = self.children_impurity(ctx);
        -self.cursor.weighted_n_right * impurity_right
            - self.cursor.weighted_n_left * impurity_left
    }

    fn node_value(&self, mut dest: ArrayViewMut2<'_, f64>) {
        dest.assign(&self.sum_total);
    }

    fn cursor(&self) -> &SplitCursor {
        &self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn ctx_labels<'a>(
        y: &'a Array2<f64>,
        samples: &'a [usize],
        weights: Option<&'a [f64]>,
    ) -> SplitContext<'a> {
        SplitContext::new(y.view(), weights, samples)
    }

    #[test]
    fn gini_pure_split_scenario() {
        // One output, two classes, four uniform samples [0, 0, 1, 1].
        let y = array![[0.0], [0.0], [1.0], [1.0]];
        let samples = [0usize, 1, 2, 3];
        let ctx = ctx_labels(&y, &samples, None);

        let mut criterion = ClassificationCriterion::gini(vec![2]);
        criterion.init(&ctx, 4.0, 0, 4);

        assert_eq!(criterion.sum_total()[[0, 0]], 2.0);
        assert_eq!(criterion.sum_total()[[0, 1]], 2.0);
        assert_eq!(criterion.weighted_n_node_samples(), 4.0);
        // 1 - (4 + 4) / 16 = 0.5
        assert_abs_diff_eq!(criterion.node_impurity(&ctx), 0.5);

        criterion.update(&ctx, 2);
        assert_eq!(criterion.sum_left()[[0, 0]], 2.0);
        assert_eq!(criterion.sum_left()[[0, 1]], 0.0);
        assert_eq!(criterion.sum_right()[[0, 0]], 0.0);
        assert_eq!(criterion.sum_right()[[0, 1]], 2.0);

        let (left, right) = criterion.children_impurity(&ctx);
        assert_abs_diff_eq!(left, 0.0);
        assert_abs_diff_eq!(right, 0.0);
        assert_abs_diff_eq!(criterion.proxy_impurity_improvement(&ctx), 0.0);
        // The pure split recovers the full node impurity.
        assert_abs_diff_eq!(criterion.impurity_improvement(0.5, left, right), 0.5);
    }

    #[test]
    fn entropy_of_uniform_two_classes() {
        let y = array![[0.0], [1.0]];
        let samples = [0usize, 1];
        let ctx = ctx_labels(&y, &samples, None);

        let mut criterion = ClassificationCriterion::entropy(vec![2]);
        criterion.init(&ctx, 2.0, 0, 2);
        assert_abs_diff_eq!(
            criterion.node_impurity(&ctx),
            std::f64::consts::LN_2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn conservation_after_updates() {
        let y = array![[0.0], [1.0], [1.0], [2.0], [0.0], [2.0], [1.0]];
        let samples = [0usize, 1, 2, 3, 4, 5, 6];
        let weights = [0.5, 1.0, 2.0, 1.5, 1.0, 0.25, 3.0];
        let ctx = ctx_labels(&y, &samples, Some(&weights));
        let total_weight: f64 = weights.iter().sum();

        let mut criterion = ClassificationCriterion::gini(vec![3]);
        criterion.init(&ctx, total_weight, 0, 7);

        for new_pos in [2, 5, 6, 3, 1, 7] {
            criterion.update(&ctx, new_pos);
            assert_eq!(criterion.pos(), new_pos);
            for c in 0..3 {
                assert_abs_diff_eq!(
                    criterion.sum_left()[[0, c]] + criterion.sum_right()[[0, c]],
                    criterion.sum_total()[[0, c]],
                    epsilon = 1e-12
                );
            }
            assert_abs_diff_eq!(
                criterion.weighted_n_left() + criterion.weighted_n_right(),
                criterion.weighted_n_node_samples(),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn reset_symmetry() {
        let y = array![[0.0], [1.0], [0.0], [1.0]];
        let samples = [0usize, 1, 2, 3];
        let ctx = ctx_labels(&y, &samples, None);

        let mut criterion = ClassificationCriterion::gini(vec![2]);
        criterion.init(&ctx, 4.0, 0, 4);

        criterion.reset();
        assert_eq!(criterion.pos(), 0);
        assert_eq!(criterion.weighted_n_left(), 0.0);
        assert_eq!(criterion.weighted_n_right(), 4.0);

        criterion.reverse_reset();
        assert_eq!(criterion.pos(), 4);
        assert_eq!(criterion.weighted_n_left(), 4.0);
        assert_eq!(criterion.weighted_n_right(), 0.0);
    }

    #[test]
    fn update_is_invertible() {
        let y = array![[0.0], [1.0], [1.0], [0.0], [1.0], [0.0]];
        let samples = [3usize, 0, 4, 1, 5, 2];
        let ctx = ctx_labels(&y, &samples, None);

        let mut criterion = ClassificationCriterion::gini(vec![2]);
        criterion.init(&ctx, 6.0, 0, 6);

        criterion.update(&ctx, 2);
        let left_at_2 = criterion.sum_left().clone();
        // Move far right (takes the reverse path), then back.
        criterion.update(&ctx, 5);
        criterion.update(&ctx, 2);
        assert_abs_diff_eq!(
            criterion.sum_left()[[0, 0]],
            left_at_2[[0, 0]],
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            criterion.sum_left()[[0, 1]],
            left_at_2[[0, 1]],
            epsilon = 1e-12
        );
    }

    #[test]
    fn subrange_ignores_outside_samples() {
        // Only samples[2..5] belong to the node.
        let y = array![[1.0], [1.0], [0.0], [0.0], [1.0], [1.0]];
        let samples = [0usize, 1, 2, 3, 4, 5];
        let ctx = ctx_labels(&y, &samples, None);

        let mut criterion = ClassificationCriterion::gini(vec![2]);
        criterion.init(&ctx, 6.0, 2, 5);
        assert_eq!(criterion.weighted_n_node_samples(), 3.0);
        assert_eq!(criterion.sum_total()[[0, 0]], 2.0);
        assert_eq!(criterion.sum_total()[[0, 1]], 1.0);
    }

    #[test]
    fn node_value_copies_class_counts() {
        let y = array![[0.0], [0.0], [1.0]];
        let samples = [0usize, 1, 2];
        let ctx = ctx_labels(&y, &samples, None);

        let mut criterion = ClassificationCriterion::gini(vec![2]);
        criterion.init(&ctx, 3.0, 0, 3);

        let mut dest = Array2::zeros((1, 2));
        criterion.node_value(dest.view_mut());
        assert_eq!(dest, array![[2.0, 1.0]]);
    }
}
