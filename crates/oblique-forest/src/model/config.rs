//! High-level forest configuration with builder pattern.
//!
//! [`ForestConfig`] composes nested parameter groups and uses the `bon`
//! crate for builder generation with validation at build time.
//!
//! # Example
//!
//! ```
//! use oblique_forest::model::{ForestConfig, TreeParams};
//! use oblique_forest::training::SplitRule;
//!
//! // All defaults
//! let config = ForestConfig::builder().build().unwrap();
//! assert_eq!(config.n_tree, 500);
//!
//! // Concordance splits on small trees
//! let config = ForestConfig::builder()
//!     .n_tree(100)
//!     .split_rule(SplitRule::concordance())
//!     .tree(TreeParams { leaf_min_obs: 10.0, ..Default::default() })
//!     .build()
//!     .unwrap();
//! ```

use std::num::NonZeroUsize;

use bon::Builder;

use super::{ParamValidationError, SamplingParams, TreeParams};
use crate::data::SurvivalDataset;
use crate::explainability::{ExplainError, PartialDependenceConfig, VariableImportance};
use crate::repr::PredType;
use crate::training::{
    AccuracyScorer, ForestParams, GrowerParams, LinearComboParams, SplitRule, Verbosity,
};

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Number of trees must be at least 1.
    InvalidNTree,
    /// Columns per split must be in `1..=n_features`.
    InvalidMtry { mtry: usize, n_features: usize },
    /// Sample fraction must be in (0, 1].
    InvalidSampleFraction(f64),
    /// Invalid leaf minimum.
    InvalidLeafParam { field: &'static str, value: f64 },
    /// Invalid split minimum or limit.
    InvalidSplitParam { field: &'static str, value: f64 },
    /// Prediction horizons must be non-empty, finite, non-negative and increasing.
    InvalidHorizon(Vec<f64>),
    /// Evaluation interval must be at least 1.
    InvalidEvalEvery,
    /// Invalid linear-combination solver control.
    InvalidSolverParam { field: &'static str, value: f64 },
    /// P-value threshold must be in (0, 1].
    InvalidPValue(f64),
    /// Partial-dependence grids do not fit the data.
    PartialDependence(ExplainError),
    /// A tree would draw no rows.
    SampleTooSmall { n_rows: usize },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNTree => write!(f, "n_tree must be at least 1"),
            Self::InvalidMtry { mtry, n_features } => {
                write!(f, "mtry must be in 1..={}, got {}", n_features, mtry)
            }
            Self::InvalidSampleFraction(v) => {
                write!(f, "sample_fraction must be in (0, 1], got {}", v)
            }
            Self::InvalidLeafParam { field, value } => {
                write!(f, "{} must be positive, got {}", field, value)
            }
            Self::InvalidSplitParam { field, value } => {
                write!(f, "invalid {}: {}", field, value)
            }
            Self::InvalidHorizon(h) => write!(
                f,
                "pred_horizon must be non-empty, finite, non-negative and increasing, got {:?}",
                h
            ),
            Self::InvalidEvalEvery => write!(f, "oobag_eval_every must be at least 1"),
            Self::InvalidSolverParam { field, value } => {
                write!(f, "invalid linear combination {}: {}", field, value)
            }
            Self::InvalidPValue(v) => write!(f, "vi_max_pvalue must be in (0, 1], got {}", v),
            Self::PartialDependence(e) => write!(f, "partial dependence: {}", e),
            Self::SampleTooSmall { n_rows } => {
                write!(f, "row sampling draws no rows from {} rows", n_rows)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ExplainError> for ConfigError {
    fn from(e: ExplainError) -> Self {
        Self::PartialDependence(e)
    }
}

// =============================================================================
// ForestConfig
// =============================================================================

/// High-level configuration for oblique random survival forest training.
///
/// # Structure
///
/// - **Ensemble**: `n_tree`, `seed`
/// - **Splits**: `split_rule`, `linear_combo`, [`TreeParams`]
/// - **Sampling**: [`SamplingParams`]
/// - **Evaluation**: `pred_type`, `pred_horizon`, `oobag_eval_every`, `oobag_scorer`
/// - **Explainability**: `importance`, `vi_max_pvalue`, `partial_dependence`
/// - **Resources**: `n_threads`, `verbosity`
///
/// Settings that depend on the data (`mtry`, the default horizon, the
/// partial-dependence columns) are checked again in
/// [`check_dataset`](Self::check_dataset) before growth starts.
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct ForestConfig {
    // === Ensemble ===
    /// Number of trees. Default: 500.
    #[builder(default = 500)]
    pub n_tree: usize,

    // === Splits ===
    /// Statistic used to choose cut-points. Default: log-rank.
    #[builder(default)]
    pub split_rule: SplitRule,

    /// Linear-combination solver and its controls.
    #[builder(default)]
    pub linear_combo: LinearComboParams,

    /// Leaf and split limits.
    #[builder(default)]
    pub tree: TreeParams,

    /// Column and row sampling.
    #[builder(default)]
    pub sampling: SamplingParams,

    // === Evaluation ===
    /// Prediction type for out-of-bag evaluation and the model default.
    /// Default: `Risk`.
    #[builder(default)]
    pub pred_type: PredType,

    /// Prediction horizons. `None` uses the median observed time.
    pub pred_horizon: Option<Vec<f64>>,

    /// Trees between out-of-bag evaluations. `None` evaluates once, after
    /// the last tree.
    pub oobag_eval_every: Option<usize>,

    /// Out-of-bag accuracy scorer. Default: concordance.
    #[builder(default)]
    pub oobag_scorer: AccuracyScorer,

    // === Explainability ===
    /// Variable importance estimator. Default: none.
    #[builder(default)]
    pub importance: VariableImportance,

    /// P-value below which an anova fit counts a predictor as significant.
    /// Default: 0.01.
    #[builder(default = 0.01)]
    pub vi_max_pvalue: f64,

    /// Partial-dependence request stored with the model.
    pub partial_dependence: Option<PartialDependenceConfig>,

    // === Resource control ===
    /// Number of threads. `None` uses all available cores.
    pub n_threads: Option<NonZeroUsize>,

    // === Reproducibility ===
    /// Random seed. Default: 42.
    #[builder(default = 42)]
    pub seed: u64,

    // === Logging ===
    /// Verbosity level. Default: `Silent`.
    #[builder(default)]
    pub verbosity: Verbosity,
}

/// Custom finishing function that validates the config.
impl<S: forest_config_builder::IsComplete> ForestConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any data-independent parameter is invalid.
    pub fn build(self) -> Result<ForestConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl ForestConfig {
    /// Validate the data-independent parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_tree == 0 {
            return Err(ConfigError::InvalidNTree);
        }

        self.tree.validate().map_err(Self::convert_param_error)?;
        self.sampling.validate().map_err(Self::convert_param_error)?;
        self.validate_linear_combo()?;

        if let Some(horizon) = &self.pred_horizon {
            let increasing = horizon.windows(2).all(|w| w[0] < w[1]);
            let valid = horizon.iter().all(|h| h.is_finite() && *h >= 0.0);
            if horizon.is_empty() || !increasing || !valid {
                return Err(ConfigError::InvalidHorizon(horizon.clone()));
            }
        }

        if self.oobag_eval_every == Some(0) {
            return Err(ConfigError::InvalidEvalEvery);
        }

        if !(self.vi_max_pvalue > 0.0 && self.vi_max_pvalue <= 1.0) {
            return Err(ConfigError::InvalidPValue(self.vi_max_pvalue));
        }

        if let Some(pd) = &self.partial_dependence {
            // Column ranges need the data; shapes and values do not.
            pd.validate(usize::MAX)?;
        }

        Ok(())
    }

    fn validate_linear_combo(&self) -> Result<(), ConfigError> {
        let lc = &self.linear_combo;
        if !(lc.eps > 0.0 && lc.eps.is_finite()) {
            return Err(ConfigError::InvalidSolverParam {
                field: "eps",
                value: lc.eps,
            });
        }
        if lc.iter_max == 0 {
            return Err(ConfigError::InvalidSolverParam {
                field: "iter_max",
                value: 0.0,
            });
        }
        if !(0.0..=1.0).contains(&lc.alpha) {
            return Err(ConfigError::InvalidSolverParam {
                field: "alpha",
                value: lc.alpha,
            });
        }
        if lc.df_target == Some(0) {
            return Err(ConfigError::InvalidSolverParam {
                field: "df_target",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Check the settings that depend on `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `mtry` exceeds the predictor count, a tree
    /// would draw no rows, or a partial-dependence column is out of range.
    pub fn check_dataset(&self, dataset: &SurvivalDataset) -> Result<(), ConfigError> {
        let n_features = dataset.n_features();
        let mtry = self.sampling.resolve_mtry(n_features);
        if mtry > n_features {
            return Err(ConfigError::InvalidMtry { mtry, n_features });
        }

        let n_rows = dataset.n_rows();
        if self.sampling.row_sampler().sample_size(n_rows) == 0 {
            return Err(ConfigError::SampleTooSmall { n_rows });
        }

        if let Some(pd) = &self.partial_dependence {
            pd.validate(n_features)?;
        }
        Ok(())
    }

    /// Resolve this config against `dataset` into trainer parameters.
    ///
    /// # Errors
    ///
    /// See [`check_dataset`](Self::check_dataset).
    pub fn to_trainer_params(&self, dataset: &SurvivalDataset) -> Result<ForestParams, ConfigError> {
        self.validate()?;
        self.check_dataset(dataset)?;

        let mut grower = GrowerParams {
            mtry: self.sampling.resolve_mtry(dataset.n_features()),
            linear_combo: self.linear_combo.clone(),
            vi_max_pvalue: self.vi_max_pvalue,
            ..Default::default()
        };
        self.tree.apply(self.split_rule, &mut grower);

        Ok(ForestParams {
            n_tree: self.n_tree,
            grower,
            row_sampler: self.sampling.row_sampler(),
            pred_type: self.pred_type,
            pred_horizon: self.resolve_horizon(dataset),
            oobag_eval_every: self.oobag_eval_every.unwrap_or(self.n_tree),
            oobag_scorer: self.oobag_scorer.clone(),
            importance: self.importance,
            seed: self.seed,
            verbosity: self.verbosity,
        })
    }

    /// Configured horizons, or the median observed time of `dataset`.
    pub fn resolve_horizon(&self, dataset: &SurvivalDataset) -> Vec<f64> {
        match &self.pred_horizon {
            Some(h) => h.clone(),
            None => vec![dataset.median_time()],
        }
    }

    /// Thread count for [`run_with_threads`](crate::run_with_threads): 0 = auto.
    pub fn thread_count(&self) -> usize {
        self.n_threads.map_or(0, NonZeroUsize::get)
    }

    /// Convert ParamValidationError to ConfigError.
    fn convert_param_error(e: ParamValidationError) -> ConfigError {
        use ParamValidationError as P;
        match e {
            P::InvalidLeafMinObs(v) => ConfigError::InvalidLeafParam {
                field: "leaf_min_obs",
                value: v,
            },
            P::InvalidLeafMinEvents(v) => ConfigError::InvalidLeafParam {
                field: "leaf_min_events",
                value: v,
            },
            P::InvalidSplitMinObs(v) => ConfigError::InvalidSplitParam {
                field: "split_min_obs",
                value: v,
            },
            P::InvalidSplitMinEvents(v) => ConfigError::InvalidSplitParam {
                field: "split_min_events",
                value: v,
            },
            P::InvalidSplitMinStat(v) => ConfigError::InvalidSplitParam {
                field: "split_min_stat",
                value: v,
            },
            P::InvalidSplitMaxCuts => ConfigError::InvalidSplitParam {
                field: "split_max_cuts",
                value: 0.0,
            },
            P::InvalidMtry(mtry) => ConfigError::InvalidMtry { mtry, n_features: 0 },
            P::InvalidSampleFraction(v) => ConfigError::InvalidSampleFraction(v),
        }
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

// =============================================================================
// Tests
// =============================================================================
