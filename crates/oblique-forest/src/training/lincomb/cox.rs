//! Weighted Cox proportional-hazards fit by Newton-Raphson.
//!
//! Rows arrive sorted by ascending time, so risk-set sums are accumulated in
//! one backward sweep per iteration. Ties use Breslow or Efron. Columns are
//! centered (and optionally scaled) before fitting; coefficients are mapped
//! back to the raw column scale on return.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use statrs::function::erf::erfc;

use super::{LinearComboParams, LinearFit, NodeData, SolverError, TiesMethod, column_stats};

/// Maximum step halvings when the likelihood decreases.
const MAX_HALVINGS: usize = 8;

/// Fit a Cox model to one node's rows.
pub fn fit_cox(node: &NodeData<'_>, params: &LinearComboParams) -> Result<LinearFit, SolverError> {
    let n = node.x.nrows();
    let k = node.x.ncols();

    let stats = column_stats(node.x, node.weights);
    let mut z = vec![0.0; n * k];
    for i in 0..n {
        for j in 0..k {
            let (mean, sd) = stats[j];
            let v = node.x[[i, j]] - mean;
            z[i * k + j] = if params.scale { v / sd } else { v };
        }
    }

    let mut beta = vec![0.0; k];
    let mut state = partial_likelihood(&z, k, &beta, node, params.ties)?;
    let iter_max = params.iter_max.max(1);

    for _ in 0..iter_max {
        let chol = factor_information(&state.information, k)?;
        let step = solve_factored(&chol, &state.gradient);

        let mut candidate: Vec<f64> = beta.iter().zip(&step).map(|(b, s)| b + s).collect();
        let mut next = partial_likelihood(&z, k, &candidate, node, params.ties);

        let mut halvings = 0;
        while halvings < MAX_HALVINGS
            && next
                .as_ref()
                .ok()
                .is_none_or(|s| s.loglik < state.loglik || !s.loglik.is_finite())
        {
            for (c, b) in candidate.iter_mut().zip(&beta) {
                *c = 0.5 * (*c + b);
            }
            next = partial_likelihood(&z, k, &candidate, node, params.ties);
            halvings += 1;
        }
        let next = next?;

        let converged = (1.0 - state.loglik / next.loglik).abs() < params.eps;
        beta = candidate;
        state = next;
        if converged {
            break;
        }
    }

    if beta.iter().any(|b| !b.is_finite()) {
        return Err(SolverError::NonFinite);
    }

    let p_values = wald_p_values(&beta, &state.information, k);

    let coefficients = beta
        .iter()
        .zip(&stats)
        .map(|(b, (_, sd))| if params.scale { b / sd } else { *b })
        .collect();

    Ok(LinearFit {
        coefficients,
        p_values,
    })
}

/// Log partial likelihood with its gradient and information matrix.
#[derive(Debug, Clone)]
struct LikelihoodState {
    loglik: f64,
    gradient: Vec<f64>,
    /// Row-major `k x k`.
    information: Vec<f64>,
}

fn partial_likelihood(
    z: &[f64],
    k: usize,
    beta: &[f64],
    node: &NodeData<'_>,
    ties: TiesMethod,
) -> Result<LikelihoodState, SolverError> {
    let n = node.time.len();

    let mut loglik = 0.0;
    let mut gradient = vec![0.0; k];
    let mut information = vec![0.0; k * k];

    // Risk-set sums over rows with time >= current.
    let mut s0 = 0.0;
    let mut s1 = vec![0.0; k];
    let mut s2 = vec![0.0; k * k];

    // Sums over the events tied at the current time.
    let mut e1 = vec![0.0; k];
    let mut e2 = vec![0.0; k * k];
    let mut a = vec![0.0; k];

    let mut end = n;
    while end > 0 {
        let t = node.time[end - 1];
        let mut start = end;
        while start > 0 && node.time[start - 1] == t {
            start -= 1;
        }

        let mut e0 = 0.0;
        e1.fill(0.0);
        e2.fill(0.0);
        let mut n_events = 0usize;
        let mut event_weight = 0.0;

        for i in start..end {
            let zi = &z[i * k..(i + 1) * k];
            let eta: f64 = zi.iter().zip(beta).map(|(x, b)| x * b).sum();
            let risk = node.weights[i] * eta.exp();
            s0 += risk;
            for p in 0..k {
                s1[p] += risk * zi[p];
                for q in 0..=p {
                    s2[p * k + q] += risk * zi[p] * zi[q];
                }
            }
            if node.status[i] == 1.0 && node.weights[i] > 0.0 {
                n_events += 1;
                event_weight += node.weights[i];
                loglik += node.weights[i] * eta;
                for p in 0..k {
                    gradient[p] += node.weights[i] * zi[p];
                }
                e0 += risk;
                for p in 0..k {
                    e1[p] += risk * zi[p];
                    for q in 0..=p {
                        e2[p * k + q] += risk * zi[p] * zi[q];
                    }
                }
            }
        }

        if n_events > 0 {
            let (n_terms, share) = match ties {
                TiesMethod::Breslow => (1, event_weight),
                TiesMethod::Efron => (n_events, event_weight / n_events as f64),
            };
            for l in 0..n_terms {
                let f = match ties {
                    TiesMethod::Breslow => 0.0,
                    TiesMethod::Efron => l as f64 / n_events as f64,
                };
                let d0 = s0 - f * e0;
                if d0 <= 0.0 || !d0.is_finite() {
                    return Err(SolverError::NonFinite);
                }
                loglik -= share * d0.ln();
                for p in 0..k {
                    a[p] = (s1[p] - f * e1[p]) / d0;
                    gradient[p] -= share * a[p];
                }
                for p in 0..k {
                    for q in 0..=p {
                        let d2 = (s2[p * k + q] - f * e2[p * k + q]) / d0;
                        information[p * k + q] += share * (d2 - a[p] * a[q]);
                    }
                }
            }
        }

        end = start;
    }

    for p in 0..k {
        for q in 0..p {
            information[q * k + p] = information[p * k + q];
        }
    }

    if !loglik.is_finite() {
        return Err(SolverError::NonFinite);
    }

    Ok(LikelihoodState {
        loglik,
        gradient,
        information,
    })
}

/// Smallest accepted diagonal of the Cholesky factor.
const MIN_PIVOT: f64 = 1e-6;

/// Cholesky factor of the row-major `k x k` information matrix.
///
/// Non-positive-definite and near-singular matrices are rejected.
pub(crate) fn factor_information(a: &[f64], k: usize) -> Result<Cholesky<f64, Dyn>, SolverError> {
    let chol = DMatrix::from_row_slice(k, k, a)
        .cholesky()
        .ok_or(SolverError::Singular)?;
    let min_pivot = chol.l_dirty().diagonal().iter().fold(f64::INFINITY, |m, &d| m.min(d));
    if min_pivot.is_nan() || min_pivot <= MIN_PIVOT {
        return Err(SolverError::Singular);
    }
    Ok(chol)
}

/// Solve `A x = b` with a factored `A`.
pub(crate) fn solve_factored(chol: &Cholesky<f64, Dyn>, b: &[f64]) -> Vec<f64> {
    chol.solve(&DVector::from_column_slice(b)).iter().copied().collect()
}

/// Two-sided Wald p-values from the inverse information diagonal.
fn wald_p_values(beta: &[f64], information: &[f64], k: usize) -> Option<Vec<f64>> {
    let covariance = factor_information(information, k).ok()?.inverse();
    let mut p_values = Vec::with_capacity(k);
    for (j, &b) in beta.iter().enumerate() {
        let var = covariance[(j, j)];
        if var <= 0.0 || !var.is_finite() {
            return None;
        }
        let z = b / var.sqrt();
        p_values.push(erfc(z.abs() / std::f64::consts::SQRT_2));
    }
    Some(p_values)
}
