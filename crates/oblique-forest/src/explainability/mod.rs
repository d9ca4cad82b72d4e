//! Model explainability: variable importance and partial dependence.

mod dependence;
mod importance;

pub use dependence::{
    PartialDependenceConfig, PdGrid, PdKind, PdOutput, PdPoint, partial_dependence,
};
pub use importance::{FeatureImportance, ImportanceCounts, VariableImportance};

pub(crate) use importance::OobScoring;

/// Errors from explainability computations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExplainError {
    #[error("partial dependence grid {grid} is empty")]
    EmptyGrid { grid: usize },
    #[error("partial dependence grid {grid} has {got} value columns, expected {expected}")]
    GridShape { grid: usize, expected: usize, got: usize },
    #[error("column {col} out of range for {n_features} features")]
    ColumnOutOfRange { col: usize, n_features: usize },
    #[error("partial dependence grid {grid} contains a non-finite value")]
    NonFiniteGridValue { grid: usize },
    #[error("quantile probability must be in [0, 1], got {0}")]
    InvalidProbability(f64),
    #[error("out-of-bag partial dependence needs the {expected} training rows, got {got}")]
    OobRowMismatch { expected: usize, got: usize },
    #[error("data has {got} columns, model expects {expected}")]
    FeatureCountMismatch { expected: usize, got: usize },
    #[error("no partial dependence request is configured")]
    MissingConfig,
}
