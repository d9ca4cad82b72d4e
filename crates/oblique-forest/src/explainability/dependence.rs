//! Partial dependence.
//!
//! For every grid point the listed predictor columns are overwritten with the
//! point's values for all rows, the forest predicts, and the per-row
//! predictions are either summarized (mean and quantiles) or returned as
//! individual conditional expectation curves. The caller's data is never
//! modified; a working copy is overwritten instead.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::repr::{Forest, PredType};
use crate::utils::Parallelism;

use super::ExplainError;

// =============================================================================
// Configuration
// =============================================================================

/// Output form of a partial-dependence run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdKind {
    /// Mean and quantiles across rows.
    #[default]
    Summary,
    /// One prediction per row (ICE curves).
    Individual,
}

/// A set of columns and the values they take jointly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdGrid {
    /// Predictor columns overwritten together.
    pub cols: Vec<usize>,
    /// `[n_points, cols.len()]`.
    pub values: Array2<f64>,
}

impl PdGrid {
    /// Single-column grid.
    pub fn single(col: usize, values: &[f64]) -> Self {
        Self {
            cols: vec![col],
            values: Array2::from_shape_fn((values.len(), 1), |(i, _)| values[i]),
        }
    }

    #[inline]
    pub fn n_points(&self) -> usize {
        self.values.nrows()
    }
}

/// Partial-dependence request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialDependenceConfig {
    pub kind: PdKind,
    pub grids: Vec<PdGrid>,
    /// Quantile probabilities reported in summary mode.
    pub probs: Vec<f64>,
    /// Use out-of-bag predictions; the data must then be the training rows.
    pub oobag: bool,
}

impl Default for PartialDependenceConfig {
    fn default() -> Self {
        Self {
            kind: PdKind::Summary,
            grids: Vec::new(),
            probs: vec![0.025, 0.5, 0.975],
            oobag: false,
        }
    }
}

impl PartialDependenceConfig {
    /// Check grid shapes against the predictor count.
    pub fn validate(&self, n_features: usize) -> Result<(), ExplainError> {
        for (g, grid) in self.grids.iter().enumerate() {
            if grid.cols.is_empty() || grid.n_points() == 0 {
                return Err(ExplainError::EmptyGrid { grid: g });
            }
            if grid.values.ncols() != grid.cols.len() {
                return Err(ExplainError::GridShape {
                    grid: g,
                    expected: grid.cols.len(),
                    got: grid.values.ncols(),
                });
            }
            if let Some(&col) = grid.cols.iter().find(|&&c| c >= n_features) {
                return Err(ExplainError::ColumnOutOfRange { col, n_features });
            }
            if grid.values.iter().any(|v| !v.is_finite()) {
                return Err(ExplainError::NonFiniteGridValue { grid: g });
            }
        }
        if let Some(&p) = self.probs.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(ExplainError::InvalidProbability(p));
        }
        Ok(())
    }
}

// =============================================================================
// Output
// =============================================================================

/// Predictions at one grid point.
#[derive(Debug, Clone, PartialEq)]
pub enum PdOutput {
    Summary {
        /// Mean per prediction column.
        mean: Vec<f64>,
        /// `[n_probs, n_outputs]`.
        quantiles: Array2<f64>,
    },
    /// `[n_rows, n_outputs]`.
    Individual(Array2<f64>),
}

/// One evaluated grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct PdPoint {
    /// Index into [`PartialDependenceConfig::grids`].
    pub grid: usize,
    /// Values assigned to the grid's columns.
    pub values: Vec<f64>,
    pub output: PdOutput,
}

// =============================================================================
// Computation
// =============================================================================

/// Evaluate every grid point of `config` against `x`.
///
/// # Errors
///
/// Returns [`ExplainError`] when a grid does not fit `x`, or when
/// out-of-bag mode is requested for data that is not the training set.
pub fn partial_dependence(
    forest: &Forest,
    x: ArrayView2<'_, f64>,
    horizons: &[f64],
    pred_type: PredType,
    config: &PartialDependenceConfig,
    parallelism: Parallelism,
) -> Result<Vec<PdPoint>, ExplainError> {
    if x.ncols() != forest.n_features() {
        return Err(ExplainError::FeatureCountMismatch {
            expected: forest.n_features(),
            got: x.ncols(),
        });
    }
    config.validate(x.ncols())?;
    if config.oobag && x.nrows() != forest.n_rows_train() {
        return Err(ExplainError::OobRowMismatch {
            expected: forest.n_rows_train(),
            got: x.nrows(),
        });
    }

    let mut work = x.to_owned();
    let mut points = Vec::new();
    for (g, grid) in config.grids.iter().enumerate() {
        for point in grid.values.rows() {
            for (&col, &v) in grid.cols.iter().zip(point) {
                work.column_mut(col).fill(v);
            }
            let preds = if config.oobag {
                forest.predict_oob(work.view(), horizons, pred_type)
            } else {
                forest.predict(work.view(), horizons, pred_type, parallelism)
            };
            for &col in &grid.cols {
                work.column_mut(col).assign(&x.column(col));
            }

            let output = match config.kind {
                PdKind::Individual => PdOutput::Individual(preds),
                PdKind::Summary => summarize(&preds, &config.probs),
            };
            points.push(PdPoint {
                grid: g,
                values: point.to_vec(),
                output,
            });
        }
    }
    Ok(points)
}

/// Column-wise mean and quantiles, ignoring NaN rows.
fn summarize(preds: &Array2<f64>, probs: &[f64]) -> PdOutput {
    let width = preds.ncols();
    let mut mean = vec![f64::NAN; width];
    let mut quantiles = Array2::from_elem((probs.len(), width), f64::NAN);
    for (k, col) in preds.columns().into_iter().enumerate() {
        let mut finite: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
        if finite.is_empty() {
            continue;
        }
        finite.sort_by(f64::total_cmp);
        mean[k] = finite.iter().sum::<f64>() / finite.len() as f64;
        for (q, &p) in probs.iter().enumerate() {
            quantiles[[q, k]] = quantile_sorted(&finite, p);
        }
    }
    PdOutput::Summary { mean, quantiles }
}

/// Linear-interpolation quantile of sorted data (Hyndman-Fan type 7).
pub(crate) fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::{SurvivalTree, TreeArrays};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rstest::rstest;

    /// Stump on column 0 at 0.5; left survival 0.9, right 0.3, from t = 1.
    fn forest() -> Forest {
        let tree = SurvivalTree::from_arrays(
            TreeArrays {
                cutpoint: vec![0.5, 0.0, 0.0],
                child_left: vec![1, 0, 0],
                coef_values: vec![vec![1.0], vec![], vec![]],
                coef_indices: vec![vec![0], vec![], vec![]],
                leaf_summary: vec![0.0, 0.1, 1.2],
                leaf_times: vec![vec![], vec![1.0], vec![1.0]],
                leaf_survival: vec![vec![], vec![0.9], vec![0.3]],
                leaf_hazard: vec![vec![], vec![0.1], vec![1.2]],
                rows_oobag: vec![0, 1],
            },
            3,
        )
        .unwrap();
        let mut forest = Forest::new(vec![1.0], 2, 3);
        forest.push_tree(tree);
        forest
    }

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(0.5, 2.0)]
    #[case(1.0, 3.0)]
    #[case(0.25, 1.5)]
    fn test_quantile_type7(#[case] p: f64, #[case] expected: f64) {
        assert_abs_diff_eq!(quantile_sorted(&[1.0, 2.0, 3.0], p), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_summary_sweeps_grid_without_touching_input() {
        let x = array![[0.0, 1.0], [1.0, 2.0], [0.0, 3.0]];
        let before = x.clone();
        let config = PartialDependenceConfig {
            grids: vec![PdGrid::single(0, &[0.0, 1.0])],
            probs: vec![0.5],
            ..Default::default()
        };
        let points = partial_dependence(
            &forest(),
            x.view(),
            &[2.0],
            PredType::Survival,
            &config,
            Parallelism::Sequential,
        )
        .unwrap();

        assert_eq!(x, before);
        assert_eq!(points.len(), 2);
        match &points[0].output {
            PdOutput::Summary { mean, quantiles } => {
                assert_abs_diff_eq!(mean[0], 0.9, epsilon = 1e-12);
                assert_abs_diff_eq!(quantiles[[0, 0]], 0.9, epsilon = 1e-12);
            }
            other => panic!("expected summary, got {other:?}"),
        }
        match &points[1].output {
            PdOutput::Summary { mean, .. } => assert_abs_diff_eq!(mean[0], 0.3, epsilon = 1e-12),
            other => panic!("expected summary, got {other:?}"),
        }
        assert_eq!(points[1].values, vec![1.0]);
    }

    #[test]
    fn test_individual_returns_row_predictions() {
        let x = array![[0.0, 1.0], [1.0, 2.0]];
        let config = PartialDependenceConfig {
            kind: PdKind::Individual,
            grids: vec![PdGrid::single(1, &[7.0])],
            ..Default::default()
        };
        let points =
            partial_dependence(&forest(), x.view(), &[2.0], PredType::Risk, &config, Parallelism::Sequential)
                .unwrap();
        match &points[0].output {
            PdOutput::Individual(preds) => {
                assert_eq!(preds.dim(), (2, 1));
                assert_abs_diff_eq!(preds[[0, 0]], 0.1, epsilon = 1e-12);
                assert_abs_diff_eq!(preds[[1, 0]], 0.7, epsilon = 1e-12);
            }
            other => panic!("expected individual, got {other:?}"),
        }
    }

    #[test]
    fn test_oob_summary_skips_rows_never_held_out() {
        // Row 2 is in-bag for the only tree, so its OOB prediction is NaN.
        let x = array![[0.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let config = PartialDependenceConfig {
            grids: vec![PdGrid::single(0, &[1.0])],
            probs: vec![0.0, 1.0],
            oobag: true,
            ..Default::default()
        };
        let points =
            partial_dependence(&forest(), x.view(), &[2.0], PredType::Risk, &config, Parallelism::Sequential)
                .unwrap();
        match &points[0].output {
            PdOutput::Summary { mean, .. } => assert_abs_diff_eq!(mean[0], 0.7, epsilon = 1e-12),
            other => panic!("expected summary, got {other:?}"),
        }

        let short = array![[0.0, 1.0]];
        assert!(matches!(
            partial_dependence(&forest(), short.view(), &[2.0], PredType::Risk, &config, Parallelism::Sequential),
            Err(ExplainError::OobRowMismatch { expected: 3, got: 1 })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_grids() {
        let mut config = PartialDependenceConfig {
            grids: vec![PdGrid::single(5, &[1.0])],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(2),
            Err(ExplainError::ColumnOutOfRange { col: 5, n_features: 2 })
        ));

        config.grids = vec![PdGrid {
            cols: vec![0, 1],
            values: Array2::zeros((2, 1)),
        }];
        assert!(matches!(config.validate(2), Err(ExplainError::GridShape { .. })));

        config.grids = vec![PdGrid::single(0, &[1.0])];
        config.probs = vec![1.5];
        assert!(matches!(config.validate(2), Err(ExplainError::InvalidProbability(_))));
    }
}
