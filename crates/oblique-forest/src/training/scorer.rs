//! Split-quality statistics.
//!
//! A split scorer rates the two-group partition induced by a candidate cut.
//! Higher is better. Rows are passed sorted by ascending time.

use super::stats;

// =============================================================================
// SplitScorer Trait
// =============================================================================

/// Scores a candidate two-group partition of a node.
pub trait SplitScorer: Send + Sync {
    /// Score the partition. `group[i]` is `true` for rows sent right.
    fn score(&self, time: &[f64], status: &[f64], weights: &[f64], group: &[bool]) -> f64;

    /// Name of the statistic (for logging).
    fn name(&self) -> &'static str;
}

// =============================================================================
// Scorers
// =============================================================================

/// Two-sample log-rank chi-square.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogRank;

impl SplitScorer for LogRank {
    fn score(&self, time: &[f64], status: &[f64], weights: &[f64], group: &[bool]) -> f64 {
        stats::logrank(time, status, weights, group)
    }

    fn name(&self) -> &'static str {
        "logrank"
    }
}

/// Harrell's C of the group label read as a risk score.
///
/// Rows sent right have the larger linear combination, so membership in the
/// right group is treated as the higher-risk prediction. The raw C is
/// reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Concordance;

impl SplitScorer for Concordance {
    fn score(&self, time: &[f64], status: &[f64], weights: &[f64], group: &[bool]) -> f64 {
        let pred: Vec<f64> = group.iter().map(|&g| if g { 1.0 } else { 0.0 }).collect();
        stats::concordance(time, status, weights, &pred, true)
    }

    fn name(&self) -> &'static str {
        "concordance"
    }
}

// =============================================================================
// SplitRule Enum
// =============================================================================

/// Closed set of split scorers selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitRule {
    LogRank(LogRank),
    Concordance(Concordance),
}

impl Default for SplitRule {
    fn default() -> Self {
        Self::LogRank(LogRank)
    }
}

impl SplitRule {
    /// Log-rank statistic.
    pub fn logrank() -> Self {
        Self::LogRank(LogRank)
    }

    /// Concordance statistic.
    pub fn concordance() -> Self {
        Self::Concordance(Concordance)
    }

    /// Minimum statistic accepted for a split when none is configured.
    ///
    /// The log-rank default is the 95% chi-square quantile with one degree
    /// of freedom.
    pub fn default_min_stat(&self) -> f64 {
        match self {
            Self::LogRank(_) => 3.841459,
            Self::Concordance(_) => 0.55,
        }
    }
}

impl SplitScorer for SplitRule {
    fn score(&self, time: &[f64], status: &[f64], weights: &[f64], group: &[bool]) -> f64 {
        match self {
            Self::LogRank(inner) => inner.score(time, status, weights, group),
            Self::Concordance(inner) => inner.score(time, status, weights, group),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::LogRank(inner) => inner.name(),
            Self::Concordance(inner) => inner.name(),
        }
    }
}
