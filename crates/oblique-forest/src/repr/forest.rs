//! Ordered collection of survival trees.

use ndarray::{Array2, ArrayView2, s};

use crate::utils::Parallelism;

use super::leaf::PredType;
use super::tree::SurvivalTree;

/// Rows per prediction block.
const PREDICT_BLOCK: usize = 256;

/// Forest of oblique survival trees.
///
/// Predictions average the trees in insertion order, so results do not
/// depend on how rows are split across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Forest {
    trees: Vec<SurvivalTree>,
    unique_event_times: Vec<f64>,
    n_features: usize,
    n_rows_train: usize,
}

impl Forest {
    /// Create an empty forest.
    pub fn new(unique_event_times: Vec<f64>, n_features: usize, n_rows_train: usize) -> Self {
        Self {
            trees: Vec::new(),
            unique_event_times,
            n_features,
            n_rows_train,
        }
    }

    pub fn push_tree(&mut self, tree: SurvivalTree) {
        self.trees.push(tree);
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn trees(&self) -> &[SurvivalTree] {
        &self.trees
    }

    #[inline]
    pub fn tree(&self, idx: usize) -> &SurvivalTree {
        &self.trees[idx]
    }

    /// Distinct training event times, ascending.
    #[inline]
    pub fn unique_event_times(&self) -> &[f64] {
        &self.unique_event_times
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[inline]
    pub fn n_rows_train(&self) -> usize {
        self.n_rows_train
    }

    /// Largest predictor column index referenced by any tree.
    pub fn max_feature_index(&self) -> Option<u32> {
        self.trees
            .iter()
            .flat_map(|t| t.features_used().last().copied())
            .max()
    }

    /// Average prediction over all trees, shape `[n_rows, n_outputs]`.
    ///
    /// `n_outputs` is the number of horizons, or 1 for mortality.
    pub fn predict(
        &self,
        x: ArrayView2<'_, f64>,
        horizons: &[f64],
        pred_type: PredType,
        parallelism: Parallelism,
    ) -> Array2<f64> {
        let n_rows = x.nrows();
        let width = super::n_outputs(pred_type, horizons.len());
        let mut out = Array2::zeros((n_rows, width));
        if n_rows == 0 || self.trees.is_empty() {
            return out;
        }

        let n_blocks = n_rows.div_ceil(PREDICT_BLOCK);
        let blocks = parallelism.maybe_par_map(0..n_blocks, |b| {
            let start = b * PREDICT_BLOCK;
            let end = (start + PREDICT_BLOCK).min(n_rows);
            let rows: Vec<usize> = (start..end).collect();
            let mut block = Array2::<f64>::zeros((rows.len(), width));
            for tree in &self.trees {
                tree.predict_rows(x, &rows, horizons, pred_type, None, |pos, values| {
                    for (o, v) in block.row_mut(pos).iter_mut().zip(values) {
                        *o += v;
                    }
                });
            }
            block
        });

        let scale = 1.0 / self.trees.len() as f64;
        for (b, block) in blocks.into_iter().enumerate() {
            let start = b * PREDICT_BLOCK;
            let end = start + block.nrows();
            out.slice_mut(s![start..end, ..]).assign(&(block * scale));
        }
        out
    }

    /// Out-of-bag prediction for the training rows.
    ///
    /// Each row averages only the trees that held it out. Rows no tree held
    /// out are NaN.
    pub fn predict_oob(
        &self,
        x_train: ArrayView2<'_, f64>,
        horizons: &[f64],
        pred_type: PredType,
    ) -> Array2<f64> {
        let width = super::n_outputs(pred_type, horizons.len());
        let mut sum = Array2::<f64>::zeros((x_train.nrows(), width));
        let mut count = vec![0.0; x_train.nrows()];
        for tree in &self.trees {
            accumulate_oob(tree, x_train, horizons, pred_type, &mut sum, &mut count);
        }
        finish_oob(sum, &count)
    }
}

/// Add one tree's out-of-bag predictions into row-indexed accumulators.
pub(crate) fn accumulate_oob(
    tree: &SurvivalTree,
    x_train: ArrayView2<'_, f64>,
    horizons: &[f64],
    pred_type: PredType,
    sum: &mut Array2<f64>,
    count: &mut [f64],
) {
    let rows: Vec<usize> = tree.rows_oobag().iter().map(|&r| r as usize).collect();
    tree.predict_rows(x_train, &rows, horizons, pred_type, None, |pos, values| {
        let r = rows[pos];
        for (o, v) in sum.row_mut(r).iter_mut().zip(values) {
            *o += v;
        }
        count[r] += 1.0;
    });
}

/// Divide accumulated sums by counts, NaN where the count is zero.
pub(crate) fn finish_oob(mut sum: Array2<f64>, count: &[f64]) -> Array2<f64> {
    for (mut row, &c) in sum.rows_mut().into_iter().zip(count) {
        if c > 0.0 {
            row.mapv_inplace(|v| v / c);
        } else {
            row.fill(f64::NAN);
        }
    }
    sum
}
