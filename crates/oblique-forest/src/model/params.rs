//! Nested parameter groups for forest configuration.
//!
//! These structs are used by the high-level [`ForestConfig`](super::ForestConfig)
//! and resolved into the trainer's [`GrowerParams`] once the dataset is known.
//!
//! - [`TreeParams`]: leaf and split minimums, cut and retry limits
//! - [`SamplingParams`]: columns per split and row bagging

use crate::training::{GrowerParams, RowSampler, SplitRule};

// =============================================================================
// TreeParams
// =============================================================================

/// Tree structure parameters.
///
/// Event and observation counts are weighted, so they are real-valued.
///
/// # Example
///
/// ```
/// use oblique_forest::model::TreeParams;
///
/// let params = TreeParams {
///     leaf_min_events: 3.0,
///     split_min_events: 10.0,
///     ..Default::default()
/// };
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    /// Minimum observations in a leaf. Default: 5.
    pub leaf_min_obs: f64,
    /// Minimum events in a leaf. Default: 1.
    pub leaf_min_events: f64,
    /// Minimum observations in a node to attempt a split. Default: 10.
    pub split_min_obs: f64,
    /// Minimum events in a node to attempt a split. Default: 5.
    pub split_min_events: f64,
    /// Minimum split statistic for a cut to be accepted.
    ///
    /// `None` uses the split rule's default: 3.841459 for log-rank, 0.55 for
    /// concordance.
    pub split_min_stat: Option<f64>,
    /// Maximum cut-points scored per split attempt. Default: 5.
    pub split_max_cuts: usize,
    /// Extra attempts after a failed split attempt. Default: 3.
    pub split_max_retry: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            leaf_min_obs: 5.0,
            leaf_min_events: 1.0,
            split_min_obs: 10.0,
            split_min_events: 5.0,
            split_min_stat: None,
            split_max_cuts: 5,
            split_max_retry: 3,
        }
    }
}

impl TreeParams {
    /// Validate parameters.
    ///
    /// # Errors
    ///
    /// Returns error if a leaf minimum is not positive, a split minimum is
    /// not above 1, the split statistic is not finite, or no cut may be
    /// scored.
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        if !(self.leaf_min_obs > 0.0) {
            return Err(ParamValidationError::InvalidLeafMinObs(self.leaf_min_obs));
        }
        if !(self.leaf_min_events > 0.0) {
            return Err(ParamValidationError::InvalidLeafMinEvents(self.leaf_min_events));
        }
        if !(self.split_min_obs > 1.0) {
            return Err(ParamValidationError::InvalidSplitMinObs(self.split_min_obs));
        }
        if !(self.split_min_events > 1.0) {
            return Err(ParamValidationError::InvalidSplitMinEvents(self.split_min_events));
        }
        if let Some(stat) = self.split_min_stat.filter(|s| !s.is_finite()) {
            return Err(ParamValidationError::InvalidSplitMinStat(stat));
        }
        if self.split_max_cuts == 0 {
            return Err(ParamValidationError::InvalidSplitMaxCuts);
        }
        Ok(())
    }

    /// Resolved minimum split statistic for `rule`.
    pub fn min_stat(&self, rule: SplitRule) -> f64 {
        self.split_min_stat.unwrap_or_else(|| rule.default_min_stat())
    }

    /// Copy the tree limits into trainer-level grower parameters.
    pub(crate) fn apply(&self, rule: SplitRule, grower: &mut GrowerParams) {
        grower.leaf_min_obs = self.leaf_min_obs;
        grower.leaf_min_events = self.leaf_min_events;
        grower.split_min_obs = self.split_min_obs;
        grower.split_min_events = self.split_min_events;
        grower.split_min_stat = self.min_stat(rule);
        grower.split_max_cuts = self.split_max_cuts;
        grower.split_max_retry = self.split_max_retry;
        grower.split_rule = rule;
    }
}

// =============================================================================
// SamplingParams
// =============================================================================

/// Sampling parameters.
///
/// Controls the columns drawn for each split attempt and the rows drawn for
/// each tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Columns drawn per split attempt. `None` uses `ceil(sqrt(n_features))`.
    pub mtry: Option<usize>,
    /// Bootstrap rows with replacement. Default: `true`.
    ///
    /// With replacement every tree draws `n_rows` rows and
    /// `sample_fraction` is ignored.
    pub sample_with_replacement: bool,
    /// Fraction of rows drawn without replacement. Default: 0.632.
    pub sample_fraction: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            mtry: None,
            sample_with_replacement: true,
            sample_fraction: 0.632,
        }
    }
}

impl SamplingParams {
    /// Validate parameters that do not depend on the data.
    ///
    /// # Errors
    ///
    /// Returns error if `mtry` is zero or the fraction is not in (0, 1].
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        if self.mtry == Some(0) {
            return Err(ParamValidationError::InvalidMtry(0));
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(ParamValidationError::InvalidSampleFraction(self.sample_fraction));
        }
        Ok(())
    }

    /// Columns per split attempt for `n_features` predictors.
    pub fn resolve_mtry(&self, n_features: usize) -> usize {
        self.mtry
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize)
            .max(1)
    }

    /// Row bagging strategy.
    pub fn row_sampler(&self) -> RowSampler {
        if self.sample_with_replacement {
            RowSampler::Bootstrap
        } else {
            RowSampler::Subsample {
                fraction: self.sample_fraction,
            }
        }
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Parameter validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamValidationError {
    #[error("leaf_min_obs must be > 0, got {0}")]
    InvalidLeafMinObs(f64),

    #[error("leaf_min_events must be > 0, got {0}")]
    InvalidLeafMinEvents(f64),

    #[error("split_min_obs must be > 1, got {0}")]
    InvalidSplitMinObs(f64),

    #[error("split_min_events must be > 1, got {0}")]
    InvalidSplitMinEvents(f64),

    #[error("split_min_stat must be finite, got {0}")]
    InvalidSplitMinStat(f64),

    #[error("split_max_cuts must be at least 1")]
    InvalidSplitMaxCuts,

    #[error("mtry must be at least 1, got {0}")]
    InvalidMtry(usize),

    /// sample_fraction must be in (0, 1].
    #[error("sample_fraction must be in (0, 1], got {0}")]
    InvalidSampleFraction(f64),
}
