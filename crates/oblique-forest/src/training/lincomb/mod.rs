//! Linear-combination solvers.
//!
//! At each node a solver turns the sampled predictor columns into one
//! coefficient per column; the node's rows are then scored by
//! `x · coefficients` and split along that axis.
//!
//! - [`LinearComboSolver::NewtonRaphson`]: weighted Cox partial likelihood
//! - [`LinearComboSolver::Penalized`]: elastic-net Cox along a lambda path
//! - [`LinearComboSolver::Random`]: random directions
//! - [`LinearComboSolver::Custom`]: user-supplied function
//!
//! A failed fit is never fatal: the grower retries with a new column draw
//! and sprouts a leaf once retries run out.

mod cox;
mod penalized;

use std::sync::Arc;

use ndarray::ArrayView2;
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

pub use cox::fit_cox;
pub use penalized::fit_penalized;

// =============================================================================
// Errors
// =============================================================================

/// Reasons a linear-combination fit can fail.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    /// The information matrix is not positive definite.
    #[error("information matrix is singular")]
    Singular,
    /// A coefficient or likelihood became NaN or infinite.
    #[error("fit produced non-finite values")]
    NonFinite,
    /// Every coefficient is zero.
    #[error("all coefficients are zero")]
    ZeroCoefficients,
    /// The solver returned the wrong number of coefficients.
    #[error("expected {expected} coefficients, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Error reported by a custom solver.
    #[error("custom solver failed: {0}")]
    Custom(String),
}

// =============================================================================
// Node data
// =============================================================================

/// The rows of one node restricted to the sampled columns.
///
/// Rows are sorted by ascending time.
#[derive(Debug, Clone, Copy)]
pub struct NodeData<'a> {
    /// `[n_node_rows, n_sampled_columns]`.
    pub x: ArrayView2<'a, f64>,
    pub time: &'a [f64],
    pub status: &'a [f64],
    pub weights: &'a [f64],
}

/// Result of a successful fit.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    /// One coefficient per sampled column, on the raw column scale.
    pub coefficients: Vec<f64>,
    /// Wald p-values, when the solver computes them.
    pub p_values: Option<Vec<f64>>,
}

// =============================================================================
// Configuration
// =============================================================================

/// Tie handling in the Cox partial likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiesMethod {
    Breslow,
    #[default]
    Efron,
}

/// Signature of a user-supplied solver: `(x, time, status, weights) -> coefficients`.
pub type CustomSolverFn = Box<
    dyn Fn(ArrayView2<'_, f64>, &[f64], &[f64], &[f64]) -> Result<Vec<f64>, SolverError>
        + Send
        + Sync
        + 'static,
>;

/// A user-provided linear-combination function.
pub struct CustomSolver {
    /// Name of the solver (for logging).
    pub name: &'static str,
    fit_fn: CustomSolverFn,
}

impl CustomSolver {
    pub fn new(
        name: &'static str,
        fit_fn: impl Fn(ArrayView2<'_, f64>, &[f64], &[f64], &[f64]) -> Result<Vec<f64>, SolverError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name,
            fit_fn: Box::new(fit_fn),
        }
    }

    /// Run the user function.
    pub fn fit(&self, node: &NodeData<'_>) -> Result<Vec<f64>, SolverError> {
        (self.fit_fn)(node.x, node.time, node.status, node.weights)
    }
}

impl std::fmt::Debug for CustomSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomSolver").field("name", &self.name).finish()
    }
}

/// Closed set of linear-combination solvers.
#[derive(Clone, Debug, Default)]
pub enum LinearComboSolver {
    /// Cox proportional hazards by Newton-Raphson.
    #[default]
    NewtonRaphson,
    /// Elastic-net penalized Cox regression.
    Penalized,
    /// Uniform random coefficients.
    Random,
    /// User-supplied function.
    Custom(Arc<CustomSolver>),
}

impl LinearComboSolver {
    pub fn custom(solver: CustomSolver) -> Self {
        Self::Custom(Arc::new(solver))
    }

    /// Whether the column count must respect the events-per-predictor floor.
    #[inline]
    pub fn needs_safe_mtry(&self) -> bool {
        matches!(self, Self::NewtonRaphson)
    }

    /// Name of the solver (for logging).
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewtonRaphson => "newton_raphson",
            Self::Penalized => "penalized",
            Self::Random => "random",
            Self::Custom(inner) => inner.name,
        }
    }
}

/// Solver choice plus its numerical controls.
#[derive(Clone, Debug)]
pub struct LinearComboParams {
    pub solver: LinearComboSolver,
    /// Relative log-likelihood change that counts as converged.
    pub eps: f64,
    /// Maximum Newton (or IRLS) iterations. 1 gives a single step.
    pub iter_max: usize,
    /// Standardize columns before fitting.
    pub scale: bool,
    pub ties: TiesMethod,
    /// Elastic-net mixing: 1 = lasso, 0 = ridge.
    pub alpha: f64,
    /// Target non-zero coefficient count for the penalized path.
    /// `None` targets every sampled column.
    pub df_target: Option<usize>,
}

impl Default for LinearComboParams {
    fn default() -> Self {
        Self {
            solver: LinearComboSolver::NewtonRaphson,
            eps: 1e-9,
            iter_max: 20,
            scale: true,
            ties: TiesMethod::Efron,
            alpha: 0.5,
            df_target: None,
        }
    }
}

impl LinearComboParams {
    /// Fit the configured solver to one node.
    ///
    /// Coefficients that are all zero or non-finite are reported as errors.
    pub fn fit(
        &self,
        node: &NodeData<'_>,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<LinearFit, SolverError> {
        let k = node.x.ncols();
        let fit = match &self.solver {
            LinearComboSolver::NewtonRaphson => fit_cox(node, self)?,
            LinearComboSolver::Penalized => fit_penalized(node, self)?,
            LinearComboSolver::Random => LinearFit {
                coefficients: random_coefficients(node, self.scale, rng),
                p_values: None,
            },
            LinearComboSolver::Custom(inner) => LinearFit {
                coefficients: inner.fit(node)?,
                p_values: None,
            },
        };

        if fit.coefficients.len() != k {
            return Err(SolverError::DimensionMismatch {
                expected: k,
                got: fit.coefficients.len(),
            });
        }
        if fit.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(SolverError::NonFinite);
        }
        if fit.coefficients.iter().all(|&c| c == 0.0) {
            return Err(SolverError::ZeroCoefficients);
        }
        Ok(fit)
    }
}

fn random_coefficients(node: &NodeData<'_>, scale: bool, rng: &mut Xoshiro256PlusPlus) -> Vec<f64> {
    let stats = if scale {
        Some(column_stats(node.x, node.weights))
    } else {
        None
    };
    (0..node.x.ncols())
        .map(|j| {
            let c: f64 = rng.gen_range(-1.0..1.0);
            match &stats {
                Some(s) => c / s[j].1,
                None => c,
            }
        })
        .collect()
}

/// Weighted mean and standard deviation of each column.
///
/// A zero deviation is reported as 1 so callers can divide by it.
pub(crate) fn column_stats(x: ArrayView2<'_, f64>, weights: &[f64]) -> Vec<(f64, f64)> {
    let total: f64 = weights.iter().sum();
    x.columns()
        .into_iter()
        .map(|col| {
            if total <= 0.0 {
                return (0.0, 1.0);
            }
            let mean = col.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total;
            let var = col
                .iter()
                .zip(weights)
                .map(|(v, w)| w * (v - mean) * (v - mean))
                .sum::<f64>()
                / total;
            let sd = var.sqrt();
            (mean, if sd > 0.0 && sd.is_finite() { sd } else { 1.0 })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn node_data<'a>(
        x: &'a ndarray::Array2<f64>,
        time: &'a [f64],
        status: &'a [f64],
        weights: &'a [f64],
    ) -> NodeData<'a> {
        NodeData {
            x: x.view(),
            time,
            status,
            weights,
        }
    }

    #[test]
    fn test_random_solver_is_seeded() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 5.0]];
        let node = node_data(&x, &[1.0, 2.0, 3.0], &[1.0, 1.0, 0.0], &[1.0; 3]);
        let params = LinearComboParams {
            solver: LinearComboSolver::Random,
            ..Default::default()
        };
        let a = params.fit(&node, &mut Xoshiro256PlusPlus::seed_from_u64(5)).unwrap();
        let b = params.fit(&node, &mut Xoshiro256PlusPlus::seed_from_u64(5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.coefficients.len(), 2);
        assert!(a.p_values.is_none());
    }

    #[test]
    fn test_custom_solver_dimension_checked() {
        let x = array![[1.0, 2.0], [2.0, 1.0]];
        let node = node_data(&x, &[1.0, 2.0], &[1.0, 1.0], &[1.0; 2]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);

        let params = LinearComboParams {
            solver: LinearComboSolver::custom(CustomSolver::new("one", |_, _, _, _| Ok(vec![1.0]))),
            ..Default::default()
        };
        assert_eq!(
            params.fit(&node, &mut rng),
            Err(SolverError::DimensionMismatch { expected: 2, got: 1 })
        );

        let params = LinearComboParams {
            solver: LinearComboSolver::custom(CustomSolver::new("zero", |x, _, _, _| {
                Ok(vec![0.0; x.ncols()])
            })),
            ..Default::default()
        };
        assert_eq!(params.fit(&node, &mut rng), Err(SolverError::ZeroCoefficients));
    }

    #[test]
    fn test_column_stats_constant_column() {
        let x = array![[1.0, 3.0], [3.0, 3.0]];
        let stats = column_stats(x.view(), &[1.0, 1.0]);
        assert_eq!(stats[0], (2.0, 1.0));
        assert_eq!(stats[1], (3.0, 1.0));
    }

    #[test]
    fn test_safe_mtry_only_for_newton() {
        assert!(LinearComboSolver::NewtonRaphson.needs_safe_mtry());
        assert!(!LinearComboSolver::Penalized.needs_safe_mtry());
        assert!(!LinearComboSolver::Random.needs_safe_mtry());
    }
}
