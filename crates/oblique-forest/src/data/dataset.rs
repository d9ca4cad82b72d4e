//! Survival dataset container.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::error::DatasetError;

/// Right-censored survival data.
///
/// # Storage Layout
///
/// Features are stored **sample-major**: `[n_rows, n_features]`. Outcomes are
/// a time per row and a binary status (1 = event observed, 0 = censored).
/// Optional non-negative weights scale each row's contribution to every
/// count, risk set and statistic.
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use oblique_forest::data::SurvivalDataset;
///
/// let x = array![[1.0, 0.5], [2.0, 0.1], [3.0, 0.7]];
/// let time = array![5.0, 3.0, 9.0];
/// let status = array![1.0, 0.0, 1.0];
/// let ds = SurvivalDataset::new(x, time, status).unwrap();
///
/// assert_eq!(ds.n_rows(), 3);
/// assert_eq!(ds.unique_event_times(), vec![5.0, 9.0]);
/// ```
#[derive(Debug, Clone)]
pub struct SurvivalDataset {
    features: Array2<f64>,
    time: Array1<f64>,
    status: Array1<f64>,
    weights: Option<Array1<f64>>,
}

impl SurvivalDataset {
    /// Create a dataset from a sample-major feature matrix and outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if shapes disagree, any feature is non-finite,
    /// a time is not strictly positive, a status is not binary, or no event
    /// is observed.
    pub fn new(
        features: Array2<f64>,
        time: Array1<f64>,
        status: Array1<f64>,
    ) -> Result<Self, DatasetError> {
        let (n_rows, n_features) = features.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(DatasetError::Empty { n_rows, n_features });
        }
        if time.len() != n_rows {
            return Err(DatasetError::ShapeMismatch {
                field: "time",
                expected: n_rows,
                got: time.len(),
            });
        }
        if status.len() != n_rows {
            return Err(DatasetError::ShapeMismatch {
                field: "status",
                expected: n_rows,
                got: status.len(),
            });
        }

        for ((row, col), &value) in features.indexed_iter() {
            if !value.is_finite() {
                return Err(DatasetError::NonFiniteFeature { row, col });
            }
        }
        for (row, &value) in time.iter().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(DatasetError::InvalidTime { row, value });
            }
        }
        for (row, &value) in status.iter().enumerate() {
            if value != 0.0 && value != 1.0 {
                return Err(DatasetError::InvalidStatus { row, value });
            }
        }
        if !status.iter().any(|&s| s == 1.0) {
            return Err(DatasetError::NoEvents);
        }

        Ok(Self {
            features,
            time,
            status,
            weights: None,
        })
    }

    /// Attach per-row weights.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the length differs from the row count or a
    /// weight is negative or non-finite.
    pub fn with_weights(mut self, weights: Array1<f64>) -> Result<Self, DatasetError> {
        if weights.len() != self.n_rows() {
            return Err(DatasetError::ShapeMismatch {
                field: "weights",
                expected: self.n_rows(),
                got: weights.len(),
            });
        }
        for (row, &value) in weights.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(DatasetError::InvalidWeight { row, value });
            }
        }
        self.weights = Some(weights);
        Ok(self)
    }

    /// Number of rows.
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    /// Number of predictor columns.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Feature matrix `[n_rows, n_features]`.
    #[inline]
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    /// Observed times.
    #[inline]
    pub fn time(&self) -> ArrayView1<'_, f64> {
        self.time.view()
    }

    /// Event indicators.
    #[inline]
    pub fn status(&self) -> ArrayView1<'_, f64> {
        self.status.view()
    }

    /// Explicit weights, if any were attached.
    #[inline]
    pub fn weights(&self) -> Option<ArrayView1<'_, f64>> {
        self.weights.as_ref().map(|w| w.view())
    }

    /// Weight of a single row (1.0 when unweighted).
    #[inline]
    pub fn weight(&self, row: usize) -> f64 {
        self.weights.as_ref().map_or(1.0, |w| w[row])
    }

    /// Dense weight vector (all ones when unweighted).
    pub fn weights_or_ones(&self) -> Vec<f64> {
        match &self.weights {
            Some(w) => w.to_vec(),
            None => vec![1.0; self.n_rows()],
        }
    }

    /// Number of rows with an observed event.
    pub fn n_events(&self) -> usize {
        self.status.iter().filter(|&&s| s == 1.0).count()
    }

    /// Sorted distinct times at which an event was observed.
    pub fn unique_event_times(&self) -> Vec<f64> {
        let mut times: Vec<f64> = self
            .time
            .iter()
            .zip(self.status.iter())
            .filter(|(_, s)| **s == 1.0)
            .map(|(t, _)| *t)
            .collect();
        times.sort_by(f64::total_cmp);
        times.dedup();
        times
    }

    /// Median of all observed times (events and censored).
    pub fn median_time(&self) -> f64 {
        let mut times = self.time.to_vec();
        times.sort_by(f64::total_cmp);
        let n = times.len();
        if n % 2 == 1 {
            times[n / 2]
        } else {
            0.5 * (times[n / 2 - 1] + times[n / 2])
        }
    }

    /// Borrow the outcome columns.
    pub fn outcome(&self) -> OutcomeView<'_> {
        OutcomeView {
            time: self.time.view(),
            status: self.status.view(),
        }
    }
}

/// Borrowed time/status pair handed to scorers.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeView<'a> {
    pub time: ArrayView1<'a, f64>,
    pub status: ArrayView1<'a, f64>,
}

impl OutcomeView<'_> {
    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Returns `true` if there are no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}
