//! Oblique random survival forest model.
//!
//! High-level wrapper around [`Forest`] with training, prediction and
//! explainability. Access components via [`forest()`](ObliqueForest::forest),
//! [`oob_eval()`](ObliqueForest::oob_eval) and
//! [`importance()`](ObliqueForest::importance).

use ndarray::{Array2, ArrayView2};

use crate::data::SurvivalDataset;
use crate::explainability::{
    ExplainError, FeatureImportance, PartialDependenceConfig, PdPoint, partial_dependence,
};
use crate::repr::{Forest, PredType};
use crate::training::{ForestTrainer, Interrupt, TrainError};
use crate::utils::{Parallelism, run_with_threads};

use super::ForestConfig;

/// Errors from model prediction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    #[error("data has {got} columns, model expects {expected}")]
    FeatureCountMismatch { expected: usize, got: usize },
    #[error("prediction horizons must be non-empty, finite, non-negative and increasing, got {0:?}")]
    InvalidHorizon(Vec<f64>),
    #[error("out-of-bag prediction needs the {expected} training rows, got {got}")]
    OobRowMismatch { expected: usize, got: usize },
}

/// Trained oblique random survival forest.
///
/// Holds the forest together with the prediction defaults it was trained
/// with and the training-time diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ObliqueForest {
    forest: Forest,
    /// Default prediction type.
    pred_type: PredType,
    /// Default horizons, ascending.
    pred_horizon: Vec<f64>,
    partial_dependence: Option<PartialDependenceConfig>,
    /// `[n_checkpoints, n_outputs]`.
    oob_eval: Array2<f64>,
    oob_predictions: Option<Array2<f64>>,
    importance: Option<FeatureImportance>,
}

impl ObliqueForest {
    /// Create a model from a forest and its prediction defaults.
    pub fn from_parts(forest: Forest, pred_type: PredType, pred_horizon: Vec<f64>) -> Self {
        Self {
            forest,
            pred_type,
            pred_horizon,
            partial_dependence: None,
            oob_eval: Array2::zeros((0, 0)),
            oob_predictions: None,
            importance: None,
        }
    }

    /// Attach a partial-dependence request.
    pub fn with_partial_dependence(mut self, config: PartialDependenceConfig) -> Self {
        self.partial_dependence = Some(config);
        self
    }

    /// Attach training diagnostics.
    pub fn with_diagnostics(
        mut self,
        oob_eval: Array2<f64>,
        oob_predictions: Option<Array2<f64>>,
        importance: Option<FeatureImportance>,
    ) -> Self {
        self.oob_eval = oob_eval;
        self.oob_predictions = oob_predictions;
        self.importance = importance;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn n_trees(&self) -> usize {
        self.forest.n_trees()
    }

    pub fn n_features(&self) -> usize {
        self.forest.n_features()
    }

    pub fn pred_type(&self) -> PredType {
        self.pred_type
    }

    pub fn pred_horizon(&self) -> &[f64] {
        &self.pred_horizon
    }

    /// Out-of-bag evaluation, one row per checkpoint. Empty when evaluation
    /// was disabled.
    pub fn oob_eval(&self) -> &Array2<f64> {
        &self.oob_eval
    }

    /// Out-of-bag predictions of the training rows at the default horizons.
    pub fn oob_predictions(&self) -> Option<&Array2<f64>> {
        self.oob_predictions.as_ref()
    }

    pub fn importance(&self) -> Option<&FeatureImportance> {
        self.importance.as_ref()
    }

    pub fn partial_dependence_config(&self) -> Option<&PartialDependenceConfig> {
        self.partial_dependence.as_ref()
    }

    // =========================================================================
    // Training
    // =========================================================================

    /// Train a new model.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError`] if the configuration does not fit the dataset.
    pub fn train(dataset: &SurvivalDataset, config: ForestConfig) -> Result<Self, TrainError> {
        run_with_threads(config.thread_count(), |parallelism| {
            Self::train_inner(dataset, config, None, parallelism)
        })
    }

    /// Train a new model, polling `interrupt` once per tree.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::Interrupted`] if `interrupt` fires before the
    /// last tree is grown.
    pub fn train_with_interrupt(
        dataset: &SurvivalDataset,
        config: ForestConfig,
        interrupt: &Interrupt,
    ) -> Result<Self, TrainError> {
        run_with_threads(config.thread_count(), |parallelism| {
            Self::train_inner(dataset, config, Some(interrupt), parallelism)
        })
    }

    fn train_inner(
        dataset: &SurvivalDataset,
        config: ForestConfig,
        interrupt: Option<&Interrupt>,
        parallelism: Parallelism,
    ) -> Result<Self, TrainError> {
        let params = config.to_trainer_params(dataset)?;
        let pred_horizon = params.pred_horizon.clone();

        let trainer = ForestTrainer::new(params);
        let trained = trainer.train(dataset, interrupt, parallelism)?;

        Ok(Self {
            forest: trained.forest,
            pred_type: config.pred_type,
            pred_horizon,
            partial_dependence: config.partial_dependence,
            oob_eval: trained.oob_eval,
            oob_predictions: trained.oob_predictions,
            importance: trained.importance,
        })
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Predict with the model's default type and horizons.
    ///
    /// # Arguments
    ///
    /// * `x` - Feature matrix `[n_rows, n_features]`
    /// * `n_threads` - Thread count: 0 = auto, 1 = sequential, >1 = exact count
    ///
    /// # Returns
    ///
    /// `[n_rows, n_horizons]`, or `[n_rows, 1]` for mortality.
    pub fn predict(&self, x: ArrayView2<'_, f64>, n_threads: usize) -> Result<Array2<f64>, PredictError> {
        self.predict_with(x, self.pred_type, &self.pred_horizon, n_threads)
    }

    /// Predict a given type at given horizons.
    ///
    /// # Errors
    ///
    /// Returns [`PredictError`] if `x` has the wrong width or the horizons
    /// are not ascending.
    pub fn predict_with(
        &self,
        x: ArrayView2<'_, f64>,
        pred_type: PredType,
        horizons: &[f64],
        n_threads: usize,
    ) -> Result<Array2<f64>, PredictError> {
        self.check_input(x, pred_type, horizons)?;
        Ok(run_with_threads(n_threads, |parallelism| {
            self.forest.predict(x, horizons, pred_type, parallelism)
        }))
    }

    /// Out-of-bag predictions for the training rows.
    ///
    /// Rows that no tree held out are NaN.
    pub fn predict_oob(
        &self,
        x_train: ArrayView2<'_, f64>,
        pred_type: PredType,
        horizons: &[f64],
    ) -> Result<Array2<f64>, PredictError> {
        self.check_input(x_train, pred_type, horizons)?;
        if x_train.nrows() != self.forest.n_rows_train() {
            return Err(PredictError::OobRowMismatch {
                expected: self.forest.n_rows_train(),
                got: x_train.nrows(),
            });
        }
        Ok(self.forest.predict_oob(x_train, horizons, pred_type))
    }

    fn check_input(
        &self,
        x: ArrayView2<'_, f64>,
        pred_type: PredType,
        horizons: &[f64],
    ) -> Result<(), PredictError> {
        if x.ncols() != self.forest.n_features() {
            return Err(PredictError::FeatureCountMismatch {
                expected: self.forest.n_features(),
                got: x.ncols(),
            });
        }
        if pred_type.uses_horizon() {
            let increasing = horizons.windows(2).all(|w| w[0] < w[1]);
            let valid = horizons.iter().all(|h| h.is_finite() && *h >= 0.0);
            if horizons.is_empty() || !increasing || !valid {
                return Err(PredictError::InvalidHorizon(horizons.to_vec()));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Explainability
    // =========================================================================

    /// Partial dependence for the request stored with the model.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::MissingConfig`] when the model carries no
    /// request, otherwise see [`partial_dependence_with`](Self::partial_dependence_with).
    pub fn partial_dependence(
        &self,
        x: ArrayView2<'_, f64>,
        n_threads: usize,
    ) -> Result<Vec<PdPoint>, ExplainError> {
        let config = self.partial_dependence.as_ref().ok_or(ExplainError::MissingConfig)?;
        self.partial_dependence_with(x, config, n_threads)
    }

    /// Partial dependence for `config` at the model's default type and
    /// horizons.
    pub fn partial_dependence_with(
        &self,
        x: ArrayView2<'_, f64>,
        config: &PartialDependenceConfig,
        n_threads: usize,
    ) -> Result<Vec<PdPoint>, ExplainError> {
        run_with_threads(n_threads, |parallelism| {
            partial_dependence(
                &self.forest,
                x,
                &self.pred_horizon,
                self.pred_type,
                config,
                parallelism,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explainability::{PdGrid, VariableImportance};
    use crate::testing::synthetic_survival;

    fn small_config() -> ForestConfig {
        ForestConfig::builder()
            .n_tree(8)
            .oobag_eval_every(4)
            .n_threads(std::num::NonZeroUsize::MIN)
            .build()
            .unwrap()
    }

    #[test]
    fn test_train_sets_defaults_and_diagnostics() {
        let ds = synthetic_survival(120, 3, 5);
        let model = ObliqueForest::train(&ds, small_config()).unwrap();

        assert_eq!(model.n_trees(), 8);
        assert_eq!(model.n_features(), 3);
        assert_eq!(model.pred_type(), PredType::Risk);
        assert_eq!(model.pred_horizon(), &[ds.median_time()]);
        assert_eq!(model.oob_eval().dim(), (2, 1));
        assert_eq!(model.oob_predictions().map(|p| p.dim()), Some((120, 1)));
        assert!(model.importance().is_none());
    }

    #[test]
    fn test_predict_is_idempotent_and_checks_width() {
        let ds = synthetic_survival(100, 3, 6);
        let model = ObliqueForest::train(&ds, small_config()).unwrap();

        let a = model.predict(ds.features(), 1).unwrap();
        let b = model.predict(ds.features(), 1).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|v| (0.0..=1.0).contains(v)));

        let narrow = Array2::<f64>::zeros((2, 2));
        assert_eq!(
            model.predict(narrow.view(), 1),
            Err(PredictError::FeatureCountMismatch { expected: 3, got: 2 })
        );
        assert!(matches!(
            model.predict_with(ds.features(), PredType::Survival, &[3.0, 1.0], 1),
            Err(PredictError::InvalidHorizon(_))
        ));
    }

    #[test]
    fn test_mortality_ignores_horizons() {
        let ds = synthetic_survival(100, 3, 7);
        let model = ObliqueForest::train(&ds, small_config()).unwrap();
        let preds = model.predict_with(ds.features(), PredType::Mortality, &[], 1).unwrap();
        assert_eq!(preds.dim(), (100, 1));
    }

    #[test]
    fn test_predict_oob_matches_training_output() {
        let ds = synthetic_survival(100, 3, 8);
        let model = ObliqueForest::train(&ds, small_config()).unwrap();
        let oob = model
            .predict_oob(ds.features(), PredType::Risk, model.pred_horizon())
            .unwrap();
        let stored = model.oob_predictions().unwrap();
        for (a, b) in oob.iter().zip(stored) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }

        let short = ds.features().slice_move(ndarray::s![..10, ..]);
        assert!(matches!(
            model.predict_oob(short, PredType::Risk, model.pred_horizon()),
            Err(PredictError::OobRowMismatch { expected: 100, got: 10 })
        ));
    }

    #[test]
    fn test_partial_dependence_uses_stored_config() {
        let ds = synthetic_survival(100, 3, 9);
        let model = ObliqueForest::train(&ds, small_config()).unwrap();
        assert_eq!(
            model.partial_dependence(ds.features(), 1),
            Err(ExplainError::MissingConfig)
        );

        let model = model.with_partial_dependence(PartialDependenceConfig {
            grids: vec![PdGrid::single(0, &[-0.5, 0.5])],
            ..Default::default()
        });
        let points = model.partial_dependence(ds.features(), 1).unwrap();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn test_anova_importance_is_reported() {
        let ds = synthetic_survival(150, 3, 10);
        let config = ForestConfig::builder()
            .n_tree(6)
            .importance(VariableImportance::Anova)
            .build()
            .unwrap();
        let model = ObliqueForest::train(&ds, config).unwrap();
        assert_eq!(model.importance().map(FeatureImportance::len), Some(3));
    }

    #[test]
    fn test_interrupted_training_returns_no_model() {
        let ds = synthetic_survival(80, 2, 11);
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let result = ObliqueForest::train_with_interrupt(&ds, small_config(), &interrupt);
        assert_eq!(result, Err(TrainError::Interrupted));
    }
}
