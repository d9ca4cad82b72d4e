//! Row bagging and column sampling.
//!
//! Each tree draws its in-bag rows once, either by bootstrap (with
//! replacement, one draw per training row) or by subsampling a fraction of
//! rows without replacement. Bootstrap multiplicities become weight
//! multipliers so a row drawn twice counts twice. Column subsets are drawn
//! per node without replacement.

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::repr::complement_rows;

// ============================================================================
// RowSample
// ============================================================================

/// In-bag / out-of-bag partition of the training rows for one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSample {
    /// In-bag rows, ascending.
    pub inbag: Vec<u32>,
    /// Multiplicity of each in-bag row (1 without replacement).
    pub multiplicity: Vec<f64>,
    /// Out-of-bag rows, ascending.
    pub oobag: Vec<u32>,
}

/// Row bagging strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowSampler {
    /// `n_rows` draws with replacement.
    Bootstrap,
    /// `round(fraction * n_rows)` draws without replacement.
    Subsample { fraction: f64 },
}

impl RowSampler {
    /// Number of rows drawn from `n_rows`.
    pub fn sample_size(&self, n_rows: usize) -> usize {
        match *self {
            RowSampler::Bootstrap => n_rows,
            RowSampler::Subsample { fraction } => {
                ((fraction * n_rows as f64).round() as usize).min(n_rows)
            }
        }
    }

    /// Draw the in-bag rows for one tree.
    pub fn sample(&self, n_rows: usize, rng: &mut Xoshiro256PlusPlus) -> RowSample {
        match *self {
            RowSampler::Bootstrap => {
                let mut counts = vec![0u32; n_rows];
                for _ in 0..n_rows {
                    counts[rng.gen_range(0..n_rows)] += 1;
                }
                let mut inbag = Vec::new();
                let mut multiplicity = Vec::new();
                let mut oobag = Vec::new();
                for (row, &c) in counts.iter().enumerate() {
                    if c > 0 {
                        inbag.push(row as u32);
                        multiplicity.push(c as f64);
                    } else {
                        oobag.push(row as u32);
                    }
                }
                RowSample {
                    inbag,
                    multiplicity,
                    oobag,
                }
            }
            RowSampler::Subsample { .. } => {
                let k = self.sample_size(n_rows);
                let mut inbag = sample_without_replacement(n_rows, k, rng);
                inbag.sort_unstable();
                let oobag = complement_rows(&inbag, n_rows);
                RowSample {
                    multiplicity: vec![1.0; inbag.len()],
                    inbag,
                    oobag,
                }
            }
        }
    }
}

// ============================================================================
// Column sampling
// ============================================================================

/// Draw `k` distinct values from `0..n` (partial Fisher-Yates).
///
/// Returned in draw order.
pub fn sample_without_replacement(n: usize, k: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<u32> {
    let k = k.min(n);
    let mut indices: Vec<u32> = (0..n as u32).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}

/// Draw `k` distinct elements of `candidates`, returned ascending.
pub fn sample_columns(candidates: &[u32], k: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<u32> {
    if k >= candidates.len() {
        return candidates.to_vec();
    }
    let mut picked: Vec<u32> = sample_without_replacement(candidates.len(), k, rng)
        .into_iter()
        .map(|i| candidates[i as usize])
        .collect();
    picked.sort_unstable();
    picked
}

/// Largest column count not above `mtry` that keeps at least three
/// unweighted events per predictor. Never below 1.
pub fn safe_mtry(mtry: usize, n_events: usize) -> usize {
    let mut m = mtry.max(1);
    while m > 1 && n_events / m < 3 {
        m -= 1;
    }
    m
}
