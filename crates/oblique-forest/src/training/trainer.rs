//! Forest trainer.
//!
//! Trees are grown in batches of `oobag_eval_every`. Within a batch every
//! tree is independent: it draws its own rows and columns from a stream
//! seeded by `(seed, tree index)`, so the forest does not depend on how trees
//! are spread across threads. After each batch the trees are appended in
//! index order, their out-of-bag predictions are merged into the running
//! sums, and one row of the evaluation matrix is scored.

use ndarray::{Array1, Array2, ArrayView2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::{OutcomeView, SurvivalDataset};
use crate::explainability::{FeatureImportance, ImportanceCounts, OobScoring, VariableImportance};
use crate::repr::{Forest, PredType, accumulate_oob, finish_oob, n_outputs};
use crate::utils::{Parallelism, mix_seed};

use super::grower::{GrowerParams, GrownTree, TreeGrower};
use super::interrupt::Interrupt;
use super::logger::{TrainingLogger, Verbosity};
use super::metrics::{AccuracyFn, AccuracyScorer};
use super::sampling::RowSampler;
use super::TrainError;

/// Stream salt for growing a tree.
const SALT_GROW: u64 = 0;
/// Stream salt for permutation importance.
const SALT_PERMUTE: u64 = 1;

// =============================================================================
// ForestParams
// =============================================================================

/// Parameters for forest training, resolved against a dataset.
#[derive(Clone, Debug)]
pub struct ForestParams {
    /// Number of trees.
    pub n_tree: usize,
    /// Per-tree growth parameters.
    pub grower: GrowerParams,
    /// Row bagging.
    pub row_sampler: RowSampler,
    /// Prediction type used for out-of-bag evaluation and importance.
    pub pred_type: PredType,
    /// Evaluation horizons, ascending.
    pub pred_horizon: Vec<f64>,
    /// Trees per evaluation checkpoint.
    pub oobag_eval_every: usize,
    /// Out-of-bag accuracy scorer.
    pub oobag_scorer: AccuracyScorer,
    pub importance: VariableImportance,
    pub seed: u64,
    pub verbosity: Verbosity,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_tree: 500,
            grower: GrowerParams::default(),
            row_sampler: RowSampler::Bootstrap,
            pred_type: PredType::Risk,
            pred_horizon: Vec::new(),
            oobag_eval_every: 500,
            oobag_scorer: AccuracyScorer::Concordance,
            importance: VariableImportance::None,
            seed: 42,
            verbosity: Verbosity::default(),
        }
    }
}

// =============================================================================
// Output
// =============================================================================

/// A trained forest and its training-time diagnostics.
#[derive(Debug, Clone)]
pub struct TrainedForest {
    pub forest: Forest,
    /// `[n_checkpoints, n_outputs]`; no rows when evaluation is disabled.
    pub oob_eval: Array2<f64>,
    /// Final out-of-bag predictions, `[n_rows, n_outputs]`.
    pub oob_predictions: Option<Array2<f64>>,
    pub importance: Option<FeatureImportance>,
}

// =============================================================================
// ForestTrainer
// =============================================================================

/// Grows an oblique random survival forest.
pub struct ForestTrainer {
    params: ForestParams,
}

impl ForestTrainer {
    pub fn new(params: ForestParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Train on `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::Interrupted`] if `interrupt` fires; no forest is
    /// returned in that case.
    pub fn train(
        &self,
        dataset: &SurvivalDataset,
        interrupt: Option<&Interrupt>,
        parallelism: Parallelism,
    ) -> Result<TrainedForest, TrainError> {
        let p = &self.params;
        let n_rows = dataset.n_rows();
        let n_features = dataset.n_features();
        let x = dataset.features();
        let weights = dataset.weights_or_ones();
        let unique_event_times = dataset.unique_event_times();

        let mut grower_params = p.grower.clone();
        grower_params.track_anova = p.importance == VariableImportance::Anova;
        let grower = TreeGrower::new(
            x,
            dataset.time(),
            dataset.status(),
            &weights,
            &unique_event_times,
            &grower_params,
        );

        let mut logger = TrainingLogger::new(p.verbosity);
        logger.start_training(p.n_tree, n_rows, n_features);

        let evaluate = p.oobag_scorer.is_enabled();
        let every = p.oobag_eval_every.clamp(1, p.n_tree.max(1));
        let width = n_outputs(p.pred_type, p.pred_horizon.len());
        let n_checkpoints = if evaluate { p.n_tree.div_ceil(every) } else { 0 };

        let mut forest = Forest::new(unique_event_times.clone(), n_features, n_rows);
        let mut oob_eval = Array2::from_elem((n_checkpoints, width), f64::NAN);
        let mut oob_sum = Array2::<f64>::zeros((n_rows, width));
        let mut oob_count = vec![0.0; n_rows];
        let mut anova = ImportanceCounts::new(n_features);

        for (checkpoint, start) in (0..p.n_tree).step_by(every).enumerate() {
            let end = (start + every).min(p.n_tree);

            let grown: Vec<Option<GrownTree>> = parallelism.maybe_par_map(start..end, |t| {
                if interrupt.is_some_and(Interrupt::is_triggered) {
                    return None;
                }
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(mix_seed(p.seed, t as u64, SALT_GROW));
                let sample = p.row_sampler.sample(n_rows, &mut rng);
                Some(grower.grow(sample, &mut rng))
            });

            if grown.iter().any(Option::is_none) {
                logger.log_interrupted(forest.n_trees());
                return Err(TrainError::Interrupted);
            }

            for (offset, g) in grown.into_iter().flatten().enumerate() {
                logger.log_tree(start + offset, g.tree.n_leaves(), g.n_failed_fits);
                if let Some(counts) = &g.anova {
                    anova.merge(counts);
                }
                if evaluate {
                    accumulate_oob(&g.tree, x, &p.pred_horizon, p.pred_type, &mut oob_sum, &mut oob_count);
                }
                forest.push_tree(g.tree);
            }

            if evaluate {
                let preds = finish_oob(oob_sum.clone(), &oob_count);
                let scores = self.score_oob(dataset, &weights, &preds);
                oob_eval.row_mut(checkpoint).assign(&Array1::from(scores.clone()));
                logger.log_checkpoint(forest.n_trees(), &scores);
            }
        }

        if evaluate && oob_count.iter().any(|&c| c == 0.0) {
            logger.warn("some rows were never out-of-bag; their predictions are NaN");
        }

        let importance = match p.importance {
            VariableImportance::None => None,
            VariableImportance::Anova => Some(anova.finish()),
            mode => Some(self.perturbation_importance(dataset, &weights, &forest, mode, parallelism)),
        };

        logger.finish_training();

        Ok(TrainedForest {
            forest,
            oob_eval,
            oob_predictions: evaluate.then(|| finish_oob(oob_sum, &oob_count)),
            importance,
        })
    }

    /// Score each prediction column over the rows that have an OOB prediction.
    fn score_oob(&self, dataset: &SurvivalDataset, weights: &[f64], preds: &Array2<f64>) -> Vec<f64> {
        let p = &self.params;
        let rows: Vec<usize> = (0..preds.nrows())
            .filter(|&r| preds.row(r).iter().all(|v| !v.is_nan()))
            .collect();
        if rows.is_empty() {
            return vec![f64::NAN; preds.ncols()];
        }
        let time = Array1::from_iter(rows.iter().map(|&r| dataset.time()[r]));
        let status = Array1::from_iter(rows.iter().map(|&r| dataset.status()[r]));
        let w: Vec<f64> = rows.iter().map(|&r| weights[r]).collect();
        let outcome = OutcomeView {
            time: time.view(),
            status: status.view(),
        };
        preds
            .columns()
            .into_iter()
            .map(|col| {
                let values: Vec<f64> = rows.iter().map(|&r| col[r]).collect();
                p.oobag_scorer.compute(outcome, &w, &values, p.pred_type)
            })
            .collect()
    }

    fn perturbation_importance(
        &self,
        dataset: &SurvivalDataset,
        weights: &[f64],
        forest: &Forest,
        mode: VariableImportance,
        parallelism: Parallelism,
    ) -> FeatureImportance {
        let p = &self.params;
        let x: ArrayView2<'_, f64> = dataset.features();
        let scoring = OobScoring {
            x,
            time: dataset.time(),
            status: dataset.status(),
            weights,
            horizons: &p.pred_horizon,
            pred_type: p.pred_type,
            scorer: &p.oobag_scorer,
        };

        let per_tree = parallelism.maybe_par_map(0..forest.n_trees(), |t| {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(mix_seed(p.seed, t as u64, SALT_PERMUTE));
            scoring.tree_importance(forest.tree(t), mode, &mut rng)
        });

        let mut total = ImportanceCounts::new(dataset.n_features());
        for counts in &per_tree {
            total.merge(counts);
        }
        total.finish()
    }
}
