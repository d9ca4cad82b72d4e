//! Out-of-bag accuracy scorers.
//!
//! An accuracy scorer rates one column of predictions against the observed
//! outcome. The default is Harrell's concordance; a closure can be supplied
//! instead through [`CustomScorer`].

use std::sync::Arc;

use crate::data::OutcomeView;
use crate::repr::PredType;

use super::stats;

/// Signature of a user-supplied accuracy function: `(outcome, weights, predictions)`.
pub type CustomScorerFn = Box<dyn Fn(OutcomeView<'_>, &[f64], &[f64]) -> f64 + Send + Sync + 'static>;

// =============================================================================
// AccuracyFn Trait
// =============================================================================

/// Scores predictions against an observed outcome. Higher is better.
pub trait AccuracyFn: Send + Sync {
    /// Score one prediction column.
    ///
    /// `pred_type` tells direction-sensitive scorers whether a higher value
    /// means higher risk.
    fn compute(
        &self,
        outcome: OutcomeView<'_>,
        weights: &[f64],
        predictions: &[f64],
        pred_type: PredType,
    ) -> f64;

    /// Name of the scorer (for logging).
    fn name(&self) -> &'static str;
}

/// Harrell's concordance statistic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConcordanceIndex;

impl AccuracyFn for ConcordanceIndex {
    fn compute(
        &self,
        outcome: OutcomeView<'_>,
        weights: &[f64],
        predictions: &[f64],
        pred_type: PredType,
    ) -> f64 {
        let time = outcome.time.to_vec();
        let status = outcome.status.to_vec();
        stats::concordance(&time, &status, weights, predictions, pred_type.is_risk_like())
    }

    fn name(&self) -> &'static str {
        "concordance"
    }
}

/// A user-provided accuracy function.
///
/// # Example
///
/// ```
/// use oblique_forest::training::{AccuracyScorer, CustomScorer};
///
/// // Fraction of events among the top-half predictions.
/// let scorer = CustomScorer::new("top_half_events", |outcome, _w, preds| {
///     let mut sorted = preds.to_vec();
///     sorted.sort_by(f64::total_cmp);
///     let cut = sorted[sorted.len() / 2];
///     let hits = preds
///         .iter()
///         .zip(outcome.status.iter())
///         .filter(|(p, s)| **p >= cut && **s == 1.0)
///         .count();
///     hits as f64 / preds.len() as f64
/// });
/// let _accuracy = AccuracyScorer::custom(scorer);
/// ```
pub struct CustomScorer {
    /// Name of the scorer (for logging).
    pub name: &'static str,
    compute_fn: CustomScorerFn,
}

impl CustomScorer {
    pub fn new(
        name: &'static str,
        compute_fn: impl Fn(OutcomeView<'_>, &[f64], &[f64]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            compute_fn: Box::new(compute_fn),
        }
    }

    /// Compute the score.
    pub fn compute(&self, outcome: OutcomeView<'_>, weights: &[f64], predictions: &[f64]) -> f64 {
        (self.compute_fn)(outcome, weights, predictions)
    }
}

impl std::fmt::Debug for CustomScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomScorer").field("name", &self.name).finish()
    }
}

// =============================================================================
// AccuracyScorer Enum
// =============================================================================

/// Closed set of out-of-bag accuracy scorers selected by configuration.
#[derive(Clone, Debug, Default)]
pub enum AccuracyScorer {
    /// Skip out-of-bag evaluation.
    None,
    /// Harrell's concordance.
    #[default]
    Concordance,
    /// User-supplied function.
    Custom(Arc<CustomScorer>),
}

impl AccuracyScorer {
    pub fn none() -> Self {
        Self::None
    }

    pub fn concordance() -> Self {
        Self::Concordance
    }

    pub fn custom(scorer: CustomScorer) -> Self {
        Self::Custom(Arc::new(scorer))
    }

    /// Whether evaluation is enabled.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl AccuracyFn for AccuracyScorer {
    fn compute(
        &self,
        outcome: OutcomeView<'_>,
        weights: &[f64],
        predictions: &[f64],
        pred_type: PredType,
    ) -> f64 {
        match self {
            Self::None => f64::NAN,
            Self::Concordance => ConcordanceIndex.compute(outcome, weights, predictions, pred_type),
            Self::Custom(inner) => inner.compute(outcome, weights, predictions),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Concordance => ConcordanceIndex.name(),
            Self::Custom(inner) => inner.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_concordance_direction_follows_pred_type() {
        let time = array![1.0, 2.0, 3.0];
        let status = array![1.0, 1.0, 1.0];
        let outcome = OutcomeView {
            time: time.view(),
            status: status.view(),
        };
        let w = [1.0; 3];
        let risk = [0.9, 0.5, 0.1];
        let surv = [0.1, 0.5, 0.9];
        let scorer = AccuracyScorer::default();
        assert_abs_diff_eq!(scorer.compute(outcome, &w, &risk, PredType::Risk), 1.0);
        assert_abs_diff_eq!(scorer.compute(outcome, &w, &surv, PredType::Survival), 1.0);
    }

    #[test]
    fn test_custom_scorer_receives_inputs() {
        let time = array![1.0, 2.0];
        let status = array![1.0, 0.0];
        let outcome = OutcomeView {
            time: time.view(),
            status: status.view(),
        };
        let scorer = AccuracyScorer::custom(CustomScorer::new("sum", |o, w, p| {
            o.status.sum() + w.iter().sum::<f64>() + p.iter().sum::<f64>()
        }));
        assert_eq!(scorer.name(), "sum");
        assert_abs_diff_eq!(scorer.compute(outcome, &[1.0, 2.0], &[0.25, 0.5], PredType::Risk), 4.75);
    }

    #[test]
    fn test_none_is_disabled() {
        assert!(!AccuracyScorer::none().is_enabled());
        assert!(AccuracyScorer::concordance().is_enabled());
    }
}
