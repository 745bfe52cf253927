//! Prediction and context-tree-weighting aggregation.
//!
//! All entry points here are read-only over a finished arena and resolve
//! each row independently, so batches parallelize over the row dimension.
//!
//! Aggregated prediction first finds the leaf for a sample, then walks the
//! ancestor chain back to the root. At each ancestor `a` the running
//! prediction `P` is blended with the ancestor's own stored prediction:
//!
//! ```text
//! alpha = 0.5 * exp(-step * loss_valid(a) - log_weight_tree(a))
//! P <- alpha * value(a) + (1 - alpha) * P
//! ```
//!
//! so shallow, well-validated nodes can override deep overfit leaves.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};

use super::arena::{Tree, TreeError};
use super::NodeId;
use crate::utils::Parallelism;

impl Tree {
    /// Per-node mixture coefficient of the aggregation walk.
    #[inline]
    fn aggregation_alpha(&self, id: NodeId, step: f32) -> f32 {
        let node = self.node(id);
        0.5 * (-step * node.loss_valid - node.log_weight_tree).exp()
    }

    /// Compute one row's prediction into `out` (length `value_width`).
    fn predict_row_into(
        &self,
        xi: ArrayView1<'_, u8>,
        aggregation: bool,
        step: f32,
        mut out: ArrayViewMut1<'_, f32>,
    ) {
        let leaf = self.find_leaf(xi);
        for (o, &v) in out.iter_mut().zip(self.value(leaf)) {
            *o = v;
        }
        if !aggregation {
            return;
        }

        let mut idx = leaf;
        while idx != 0 {
            idx = self.node(idx).parent as NodeId;
            let alpha = self.aggregation_alpha(idx, step);
            for (o, &v) in out.iter_mut().zip(self.value(idx)) {
                *o = alpha * v + (1.0 - alpha) * *o;
            }
        }
    }

    /// Predict one value row per sample.
    ///
    /// With `aggregation == false` this returns each sample's leaf value
    /// unchanged. With `aggregation == true` leaf values are blended with
    /// every ancestor's stored prediction using the CTW weights; `step` is
    /// the temperature of the exponential weights.
    ///
    /// For classification trees rows are class-probability vectors; for
    /// regression trees they have width 1 (see [`Tree::predict`]).
    pub fn predict_proba(
        &self,
        x: ArrayView2<'_, u8>,
        aggregation: bool,
        step: f32,
        parallelism: Parallelism,
    ) -> Result<Array2<f32>, TreeError> {
        self.check_batch(x.ncols())?;
        let mut out = Array2::<f32>::zeros((x.nrows(), self.value_width()));

        let rows: Vec<(usize, ArrayViewMut1<'_, f32>)> =
            out.axis_iter_mut(Axis(0)).enumerate().collect();
        parallelism.maybe_par_for_each(rows, |(i, row)| {
            self.predict_row_into(x.row(i), aggregation, step, row);
        });

        Ok(out)
    }

    /// Predict one scalar per sample (regression trees only).
    pub fn predict(
        &self,
        x: ArrayView2<'_, u8>,
        aggregation: bool,
        step: f32,
        parallelism: Parallelism,
    ) -> Result<Array1<f32>, TreeError> {
        if self.value_width() != 1 {
            return Err(TreeError::NotScalar {
                width: self.value_width(),
            });
        }
        let out = self.predict_proba(x, aggregation, step, parallelism)?;
        Ok(out.index_axis_move(Axis(1), 0))
    }

    /// Soft depth of each sample under the aggregation weights.
    ///
    /// Runs the same ancestor walk as aggregated prediction but mixes node
    /// depths instead of predictions, yielding a fractional "effective
    /// depth" per sample. Diagnostic/calibration signal only.
    pub fn weighted_depth(
        &self,
        x: ArrayView2<'_, u8>,
        step: f32,
        parallelism: Parallelism,
    ) -> Result<Array1<f32>, TreeError> {
        self.check_batch(x.ncols())?;
        let depths = parallelism.maybe_par_map(0..x.nrows(), |i| {
            let mut idx = self.find_leaf(x.row(i));
            let mut depth = self.node(idx).depth as f32;
            while idx != 0 {
                idx = self.node(idx).parent as NodeId;
                let alpha = self.aggregation_alpha(idx, step);
                depth = alpha * self.node(idx).depth as f32 + (1.0 - alpha) * depth;
            }
            depth
        });
        Ok(Array1::from_vec(depths))
    }
}
