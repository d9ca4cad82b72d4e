//! Synthetic survival data for tests and benchmarks.

use ndarray::{Array1, Array2};
use rand::prelude::*;

use crate::data::SurvivalDataset;

/// Coefficient of column 0 in the generating hazard.
pub const STRONG_EFFECT: f64 = 2.0;
/// Coefficient of column 1 in the generating hazard.
pub const WEAK_EFFECT: f64 = 0.5;

/// Generate right-censored data from a proportional-hazards model.
///
/// Features are uniform in `[-1, 1]`. The log hazard is
/// `STRONG_EFFECT * x0 + WEAK_EFFECT * x1`; further columns are noise.
/// Event times are exponential, censoring times uniform in `[0, 40)`.
pub fn synthetic_survival(n_rows: usize, n_features: usize, seed: u64) -> SurvivalDataset {
    assert!(n_rows > 0 && n_features > 0);
    let mut rng = StdRng::seed_from_u64(seed);

    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen_range(-1.0..1.0));
    let mut time = Array1::zeros(n_rows);
    let mut status = Array1::zeros(n_rows);
    for i in 0..n_rows {
        let mut lp = STRONG_EFFECT * x[[i, 0]];
        if n_features > 1 {
            lp += WEAK_EFFECT * x[[i, 1]];
        }
        let u: f64 = 1.0 - rng.r#gen::<f64>();
        let event = 0.01 + 10.0 * -u.ln() / lp.exp();
        let censor = 0.01 + rng.gen_range(0.0..40.0);
        if event <= censor {
            time[i] = event;
            status[i] = 1.0;
        } else {
            time[i] = censor;
        }
    }
    // The first row always carries an event.
    status[0] = 1.0;

    match SurvivalDataset::new(x, time, status) {
        Ok(ds) => ds,
        Err(e) => panic!("synthetic data is valid: {e}"),
    }
}

/// Random feature rows for prediction benchmarks and round-trip tests.
pub fn random_features(n_rows: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n_rows, n_features), |_| rng.gen_range(-1.0..1.0))
}
