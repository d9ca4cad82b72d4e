//! Leaf survival estimator.
//!
//! A [`LeafCurve`] is the Kaplan–Meier survival curve and Nelson–Aalen
//! cumulative hazard of the rows that reached a leaf, evaluated at the leaf's
//! distinct event times. Curves are step functions; interpolation at a query
//! time holds the value of the last grid time not after it.

use serde::{Deserialize, Serialize};

// =============================================================================
// PredType
// =============================================================================

/// What a prediction reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredType {
    /// `1 - S(t)`.
    #[default]
    Risk,
    /// Kaplan–Meier `S(t)`.
    Survival,
    /// Nelson–Aalen `H(t)`.
    CumulativeHazard,
    /// Leaf mortality score. Horizon independent.
    Mortality,
}

impl PredType {
    /// Value reported before the first event time.
    #[inline]
    pub fn baseline(self) -> f64 {
        match self {
            PredType::Survival => 1.0,
            PredType::Risk | PredType::CumulativeHazard | PredType::Mortality => 0.0,
        }
    }

    /// Whether higher predictions mean earlier events.
    #[inline]
    pub fn is_risk_like(self) -> bool {
        !matches!(self, PredType::Survival)
    }

    /// Whether predictions depend on the requested horizon.
    #[inline]
    pub fn uses_horizon(self) -> bool {
        !matches!(self, PredType::Mortality)
    }
}

// =============================================================================
// LeafCurve
// =============================================================================

/// Step-function survival summary of one leaf.
///
/// `times` is strictly increasing. `survival` is non-increasing within
/// `[0, 1]`, `hazard` is non-decreasing. Internal nodes carry an empty curve.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LeafCurve {
    times: Vec<f64>,
    survival: Vec<f64>,
    hazard: Vec<f64>,
}

impl LeafCurve {
    /// Curve of an internal node.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap previously computed arrays. Consistency is checked by tree validation.
    pub fn from_parts(times: Vec<f64>, survival: Vec<f64>, hazard: Vec<f64>) -> Self {
        Self {
            times,
            survival,
            hazard,
        }
    }

    /// Estimate the curve from rows sorted by ascending time.
    ///
    /// At each distinct time the at-risk weight drops by the total weight of
    /// the rows leaving there, events and censored alike. A grid entry is
    /// only recorded where the event weight is positive. With no events the
    /// curve degenerates to `{first time, 1, 0}`.
    pub fn estimate_sorted(time: &[f64], status: &[f64], weights: &[f64]) -> Self {
        debug_assert!(!time.is_empty());
        debug_assert!(time.windows(2).all(|w| w[0] <= w[1]));

        let mut n_risk: f64 = weights.iter().sum();
        let mut surv = 1.0;
        let mut haz = 0.0;

        let mut times = Vec::new();
        let mut survival = Vec::new();
        let mut hazard = Vec::new();

        let n = time.len();
        let mut i = 0;
        while i < n {
            let t = time[i];
            let mut events = 0.0;
            let mut leaving = 0.0;
            while i < n && time[i] == t {
                events += weights[i] * status[i];
                leaving += weights[i];
                i += 1;
            }
            if events > 0.0 && n_risk > 0.0 {
                surv *= (n_risk - events) / n_risk;
                haz += events / n_risk;
                times.push(t);
                survival.push(surv.clamp(0.0, 1.0));
                hazard.push(haz);
            }
            n_risk -= leaving;
        }

        if times.is_empty() {
            times.push(time.first().copied().unwrap_or(0.0));
            survival.push(1.0);
            hazard.push(0.0);
        }

        Self {
            times,
            survival,
            hazard,
        }
    }

    /// Estimate the curve from unsorted rows.
    pub fn estimate(time: &[f64], status: &[f64], weights: &[f64]) -> Self {
        let mut order: Vec<usize> = (0..time.len()).collect();
        order.sort_by(|&a, &b| time[a].total_cmp(&time[b]));
        let t: Vec<f64> = order.iter().map(|&i| time[i]).collect();
        let s: Vec<f64> = order.iter().map(|&i| status[i]).collect();
        let w: Vec<f64> = order.iter().map(|&i| weights[i]).collect();
        Self::estimate_sorted(&t, &s, &w)
    }

    #[inline]
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    #[inline]
    pub fn survival(&self) -> &[f64] {
        &self.survival
    }

    #[inline]
    pub fn hazard(&self) -> &[f64] {
        &self.hazard
    }

    /// Number of grid points.
    #[inline]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Returns `true` for the curve of an internal node.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Returns `true` if any event reached this leaf.
    #[inline]
    pub fn has_events(&self) -> bool {
        self.hazard.last().is_some_and(|&h| h > 0.0)
    }

    /// Sum of the cumulative hazard over a sorted global event-time grid.
    ///
    /// Each grid time takes the hazard of the first leaf time not before it.
    /// Grid times past the last leaf time take the final hazard. A leaf
    /// without events scores 0.
    pub fn mortality(&self, unique_event_times: &[f64]) -> f64 {
        if self.times.is_empty() {
            return 0.0;
        }
        let mut total = 0.0;
        let mut k = 0;
        for &t in unique_event_times {
            while k + 1 < self.times.len() && t > self.times[k] {
                k += 1;
            }
            total += self.hazard[k];
        }
        total
    }

    /// Step-function value at `t`.
    ///
    /// Before the first grid time the type baseline is returned; otherwise
    /// the value at the last grid time `<= t`.
    ///
    /// Mortality is not a function of time: it is answered by the leaf
    /// summary ([`mortality`](Self::mortality)), and asking the curve for it
    /// is a caller bug.
    #[inline]
    pub fn value_at(&self, t: f64, pred_type: PredType) -> f64 {
        debug_assert!(
            pred_type.uses_horizon(),
            "mortality is read from the leaf summary, not the curve"
        );
        let idx = self.times.partition_point(|&x| x <= t);
        if idx == 0 {
            return pred_type.baseline();
        }
        let k = idx - 1;
        match pred_type {
            PredType::Survival => self.survival[k],
            PredType::Risk => 1.0 - self.survival[k],
            PredType::CumulativeHazard => self.hazard[k],
            PredType::Mortality => pred_type.baseline(),
        }
    }

    /// Evaluate at each horizon, writing into `out`.
    pub fn values_at_into(&self, horizons: &[f64], pred_type: PredType, out: &mut [f64]) {
        debug_assert_eq!(horizons.len(), out.len());
        for (o, &t) in out.iter_mut().zip(horizons) {
            *o = self.value_at(t, pred_type);
        }
    }
}
