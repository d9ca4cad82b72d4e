//! Variable importance.
//!
//! Three estimators:
//! - [`VariableImportance::Negate`]: flip the sign of a predictor's
//!   coefficients and re-predict each tree's out-of-bag rows
//! - [`VariableImportance::Permute`]: shuffle a predictor among each tree's
//!   out-of-bag rows and re-predict
//! - [`VariableImportance::Anova`]: fraction of node fits in which the
//!   predictor was significant
//!
//! For the two perturbation modes a tree contributes
//! `baseline accuracy - perturbed accuracy` for every predictor it uses, so
//! a predictor whose perturbation improves accuracy scores negative.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::data::OutcomeView;
use crate::repr::{PredType, SurvivalTree, n_outputs};
use crate::training::{AccuracyFn, AccuracyScorer, LinearFit};

// =============================================================================
// VariableImportance
// =============================================================================

/// Which importance estimator to run during training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableImportance {
    #[default]
    None,
    Negate,
    Permute,
    Anova,
}

// =============================================================================
// ImportanceCounts
// =============================================================================

/// Per-predictor numerator / denominator accumulators.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceCounts {
    pub numerator: Vec<f64>,
    pub denominator: Vec<f64>,
}

impl ImportanceCounts {
    pub fn new(n_features: usize) -> Self {
        Self {
            numerator: vec![0.0; n_features],
            denominator: vec![0.0; n_features],
        }
    }

    /// Record one node fit over the sampled `cols`.
    ///
    /// With p-values a column counts when it is significant; without them,
    /// every column counts when the fit produced an accepted cut.
    pub(crate) fn record_fit(&mut self, cols: &[u32], fit: &LinearFit, passed: bool, max_pvalue: f64) {
        for (k, &c) in cols.iter().enumerate() {
            let c = c as usize;
            self.denominator[c] += 1.0;
            let hit = match &fit.p_values {
                Some(p) => p[k] < max_pvalue,
                None => passed,
            };
            if hit {
                self.numerator[c] += 1.0;
            }
        }
    }

    /// Add another accumulator.
    pub fn merge(&mut self, other: &ImportanceCounts) {
        for (a, b) in self.numerator.iter_mut().zip(&other.numerator) {
            *a += b;
        }
        for (a, b) in self.denominator.iter_mut().zip(&other.denominator) {
            *a += b;
        }
    }

    /// `numerator / denominator`, 0 where nothing was recorded.
    pub fn finish(&self) -> FeatureImportance {
        let values = self
            .numerator
            .iter()
            .zip(&self.denominator)
            .map(|(n, d)| if *d > 0.0 { n / d } else { 0.0 })
            .collect();
        FeatureImportance::new(values)
    }
}

// =============================================================================
// FeatureImportance
// =============================================================================

/// Final importance score per predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    values: Vec<f64>,
}

impl FeatureImportance {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Indices of the `k` most important predictors, best first.
    pub fn top_k(&self, k: usize) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.values.len()).collect();
        idx.sort_by(|&a, &b| self.values[b].total_cmp(&self.values[a]).then(a.cmp(&b)));
        idx.truncate(k);
        idx
    }
}

// =============================================================================
// Perturbation importance
// =============================================================================

/// Shared inputs for scoring one tree's out-of-bag rows.
pub(crate) struct OobScoring<'a> {
    pub x: ArrayView2<'a, f64>,
    pub time: ArrayView1<'a, f64>,
    pub status: ArrayView1<'a, f64>,
    pub weights: &'a [f64],
    pub horizons: &'a [f64],
    pub pred_type: PredType,
    pub scorer: &'a AccuracyScorer,
}

impl OobScoring<'_> {
    /// Mean accuracy over prediction columns. Concordance stands in when
    /// the configured scorer is disabled.
    fn accuracy(&self, outcome: OutcomeView<'_>, weights: &[f64], preds: &Array2<f64>) -> f64 {
        let fallback = AccuracyScorer::Concordance;
        let scorer = if self.scorer.is_enabled() {
            self.scorer
        } else {
            &fallback
        };
        let total: f64 = preds
            .columns()
            .into_iter()
            .map(|col| scorer.compute(outcome, weights, &col.to_vec(), self.pred_type))
            .sum();
        total / preds.ncols() as f64
    }

    /// One tree's contribution to perturbation importance.
    pub(crate) fn tree_importance(
        &self,
        tree: &SurvivalTree,
        mode: VariableImportance,
        rng: &mut Xoshiro256PlusPlus,
    ) -> ImportanceCounts {
        let n_features = self.x.ncols();
        let mut counts = ImportanceCounts::new(n_features);
        let oob: Vec<usize> = tree.rows_oobag().iter().map(|&r| r as usize).collect();
        let used = tree.features_used();
        if oob.is_empty() || used.is_empty() {
            return counts;
        }

        let time = Array1::from_iter(oob.iter().map(|&r| self.time[r]));
        let status = Array1::from_iter(oob.iter().map(|&r| self.status[r]));
        let weights: Vec<f64> = oob.iter().map(|&r| self.weights[r]).collect();
        let outcome = OutcomeView {
            time: time.view(),
            status: status.view(),
        };

        let mut x_oob = self.x.select(ndarray::Axis(0), &oob);
        let local: Vec<usize> = (0..oob.len()).collect();
        let width = n_outputs(self.pred_type, self.horizons.len());
        let predict = |x: ArrayView2<'_, f64>, negate: Option<u32>| {
            let mut preds = Array2::<f64>::zeros((local.len(), width));
            tree.predict_rows(x, &local, self.horizons, self.pred_type, negate, |pos, values| {
                preds.row_mut(pos).assign(&ArrayView1::from(values));
            });
            preds
        };

        let baseline = self.accuracy(outcome, &weights, &predict(x_oob.view(), None));

        for &j in &used {
            let perturbed = match mode {
                VariableImportance::Negate => predict(x_oob.view(), Some(j)),
                VariableImportance::Permute => {
                    let original = x_oob.column(j as usize).to_owned();
                    let mut shuffled = original.to_vec();
                    shuffled.shuffle(rng);
                    x_oob.column_mut(j as usize).assign(&Array1::from(shuffled));
                    let preds = predict(x_oob.view(), None);
                    x_oob.column_mut(j as usize).assign(&original);
                    preds
                }
                VariableImportance::None | VariableImportance::Anova => continue,
            };
            let acc = self.accuracy(outcome, &weights, &perturbed);
            counts.numerator[j as usize] += baseline - acc;
            counts.denominator[j as usize] += 1.0;
        }
        counts
    }
}
